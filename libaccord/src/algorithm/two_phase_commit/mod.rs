// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An implementation of the 2PC (Two-Phase Commit) atomic commitment protocol.
//!
//! The algorithm attempts to faithfully implement 2PC as it is described in the following source:
//!
//! - Bernstein, Hadzilacos, and Goodman, Concurrency Control and Recovery in Database Systems,
//!   7.4.  This book may be downloaded for free from
//!   <https://www.microsoft.com/en-us/research/people/philbe/>.
//!
//! Each transaction is decided independently. The coordinator writes its decision to the
//! decision log before delivering it, and keeps delivering it until every participant has
//! acknowledged. Participants which are left in doubt use the termination protocol and ask the
//! coordinator for the recorded decision.

mod coordinator_action;
mod coordinator_algorithm;
mod coordinator_context;
mod coordinator_event;
mod participant_action;
mod participant_algorithm;
mod participant_context;
mod participant_event;

pub use coordinator_action::{CoordinatorAction, CoordinatorActionNotification};
pub use coordinator_algorithm::CoordinatorAlgorithm;
pub use coordinator_context::{Participant, TransactionContext, TransactionState};
pub use coordinator_event::CoordinatorEvent;
pub use participant_action::{ParticipantAction, ParticipantActionNotification, Response};
pub use participant_algorithm::ParticipantAlgorithm;
pub use participant_context::{ParticipantContext, ParticipantState};
pub use participant_event::ParticipantEvent;
