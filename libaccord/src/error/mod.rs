// Copyright 2021-2022 Cargill Incorporated
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

//! Errors returned by the algorithms, the decision log, participants and the coordinator.

mod algorithm;
mod coordinator;
mod decision_log;
mod participant;

pub use errling::{InvalidArgumentError, InvalidStateError};

pub use algorithm::AlgorithmError;
pub use coordinator::CoordinatorError;
pub use decision_log::DecisionLogError;
pub use participant::ParticipantError;
