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

use crate::transaction::{Acknowledgment, ParticipantId, Vote};

pub enum CoordinatorEvent {
    /// Begin, or restart, phase one.
    Prepare,

    /// A participant answered a prepare request.
    Vote(Vote),

    /// A participant could not produce a vote: it was unreachable once retries were exhausted,
    /// it rejected the request, or phase one timed out before it answered.
    VoteFailed(ParticipantId, String),

    /// Begin phase two.
    Finalize,

    /// The decision record requested by `CoordinatorAction::AppendDecision` is durable.
    DecisionLogged,

    /// A participant acknowledged the decision.
    Ack(Acknowledgment),
}
