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

//! Identifiers and immutable values exchanged during a transaction.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The longest transaction id accepted, in bytes. Hex-encoded with a file extension, it still
/// fits a 255 byte file name.
pub const MAX_TRANSACTION_ID_LEN: usize = 120;

/// Identifies a transaction across the coordinator, its participants and the decision log.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generates a new random identifier.
    pub fn generate() -> Self {
        TransactionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        TransactionId(id)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        TransactionId(id.to_string())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        ParticipantId(id)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        ParticipantId(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant as known to the coordinator: its identifier and the endpoint used to reach it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: ParticipantId,
    pub endpoint: String,
}

impl ParticipantRef {
    pub fn new<I, E>(id: I, endpoint: E) -> Self
    where
        I: Into<ParticipantId>,
        E: Into<String>,
    {
        ParticipantRef {
            id: id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// The global outcome of a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Commit,
    Abort,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("commit"),
            Decision::Abort => f.write_str("abort"),
        }
    }
}

/// The answer to a `GetStatus` query.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unknown,
    Commit,
    Abort,
}

impl From<Decision> for TransactionStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Commit => TransactionStatus::Commit,
            Decision::Abort => TransactionStatus::Abort,
        }
    }
}

impl From<Option<Decision>> for TransactionStatus {
    fn from(decision: Option<Decision>) -> Self {
        decision
            .map(TransactionStatus::from)
            .unwrap_or(TransactionStatus::Unknown)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum VoteValue {
    Yes,
    No,
}

/// A participant's answer to a prepare request. Produced once and never changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Vote {
    pub participant_id: ParticipantId,
    pub transaction_id: TransactionId,
    pub value: VoteValue,
}

/// Confirmation that a participant applied the decision it was sent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Acknowledgment {
    pub transaction_id: TransactionId,
    pub participant_id: ParticipantId,
    pub phase: Decision,
    pub received_at: SystemTime,
}

/// The durable outcome of a transaction. Written once, before any participant learns it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub transaction_id: TransactionId,
    pub decision: Decision,
    pub participants: Vec<ParticipantRef>,
    pub written_at: SystemTime,
}

impl DecisionRecord {
    /// Two records agree if they carry the same outcome for the same transaction and
    /// participants; the write timestamp is not part of the decision.
    pub fn agrees_with(&self, other: &DecisionRecord) -> bool {
        self.transaction_id == other.transaction_id
            && self.decision == other.decision
            && self.participants == other.participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TransactionId::generate(), TransactionId::generate());
    }

    #[test]
    fn status_from_decision() {
        assert_eq!(
            TransactionStatus::from(Some(Decision::Commit)),
            TransactionStatus::Commit
        );
        assert_eq!(
            TransactionStatus::from(Some(Decision::Abort)),
            TransactionStatus::Abort
        );
        assert_eq!(TransactionStatus::from(None), TransactionStatus::Unknown);
    }

    #[test]
    fn records_agree_regardless_of_write_time() {
        let record = DecisionRecord {
            transaction_id: "tx-1".into(),
            decision: Decision::Commit,
            participants: vec![ParticipantRef::new("p1", "mem://p1")],
            written_at: SystemTime::UNIX_EPOCH,
        };

        let mut later = record.clone();
        later.written_at = SystemTime::now();
        assert!(record.agrees_with(&later));

        let mut aborted = record.clone();
        aborted.decision = Decision::Abort;
        assert!(!record.agrees_with(&aborted));
    }
}
