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

//! Messages sent from the coordinator to a participant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transaction::{Decision, TransactionId};

/// The protocol step a message belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Prepare,
    Commit,
    Abort,
}

impl From<Decision> for Phase {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => Phase::Commit,
            Decision::Abort => Phase::Abort,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Prepare => f.write_str("prepare"),
            Phase::Commit => f.write_str("commit"),
            Phase::Abort => f.write_str("abort"),
        }
    }
}

/// Identifies a message independently of how many times it is delivered.
///
/// A participant which receives the same key twice, as happens whenever the coordinator retries a
/// call, must produce the same effect and the same response as it did the first time.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub transaction_id: TransactionId,
    pub phase: Phase,
}

impl IdempotencyKey {
    pub fn new(transaction_id: TransactionId, phase: Phase) -> Self {
        IdempotencyKey {
            transaction_id,
            phase,
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.transaction_id, self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let key = IdempotencyKey::new("tx-7".into(), Phase::from(Decision::Commit));
        assert_eq!(key.to_string(), "tx-7/commit");
    }
}
