// Copyright 2022 Cargill Incorporated
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

//! Both ends of a call to a participant.
//!
//! [`ParticipantClient`] is what the coordinator uses to talk to one participant: it adds the
//! idempotency key and call timeout to every request and turns answers into [`Vote`]s and
//! [`Acknowledgment`]s. [`LocalParticipant`] is a participant which runs the participant
//! algorithm in process on top of a [`ResourceManager`].
//!
//! [`Vote`]: crate::transaction::Vote
//! [`Acknowledgment`]: crate::transaction::Acknowledgment

mod client;
mod local;

pub use client::ParticipantClient;
pub use local::{LocalParticipant, ResourceManager};
