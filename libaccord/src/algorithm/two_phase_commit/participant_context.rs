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

use std::time::SystemTime;

use crate::transaction::{TransactionId, TransactionStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum ParticipantState {
    Abort,
    Commit,
    /// Voted yes and waiting for the decision. This is the period of doubt.
    Voted { decision_timeout_start: SystemTime },
    WaitingForVoteRequest,
    WaitingForVote,
}

/// A participant's view of one transaction.
#[derive(Clone, Debug)]
pub struct ParticipantContext {
    transaction_id: TransactionId,
    state: ParticipantState,
}

impl ParticipantContext {
    pub fn new(transaction_id: TransactionId) -> Self {
        ParticipantContext {
            transaction_id,
            state: ParticipantState::WaitingForVoteRequest,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn state(&self) -> &ParticipantState {
        &self.state
    }

    pub(super) fn set_state(&mut self, state: ParticipantState) {
        self.state = state;
    }

    /// The outcome this participant has applied, if any.
    pub fn status(&self) -> TransactionStatus {
        match self.state {
            ParticipantState::Commit => TransactionStatus::Commit,
            ParticipantState::Abort => TransactionStatus::Abort,
            _ => TransactionStatus::Unknown,
        }
    }

    pub fn in_doubt(&self) -> bool {
        matches!(self.state, ParticipantState::Voted { .. })
    }
}
