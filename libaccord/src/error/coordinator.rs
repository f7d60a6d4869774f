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

//! Contains CoordinatorError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::transaction::{ParticipantId, TransactionId};

use super::AlgorithmError;
use super::DecisionLogError;
use super::InvalidArgumentError;
use super::InvalidStateError;

/// An error returned by the coordinator's transaction API.
#[derive(Debug)]
pub enum CoordinatorError {
    /// The participant set given to `begin` was empty or contained duplicates.
    InvalidParticipantSet(InvalidArgumentError),

    /// A caller supplied transaction id was malformed.
    InvalidTransactionId(InvalidArgumentError),

    /// No transaction with this id is known to the coordinator.
    UnknownTransaction(TransactionId),

    /// A caller supplied transaction id is already in use.
    DuplicateTransaction(TransactionId),

    /// The operation is not valid in the transaction's current phase.
    InvalidState(InvalidStateError),

    /// The decision could not be made durable. Participants have not been notified.
    LogWrite(DecisionLogError),

    /// The decision log could not be read.
    LogRead(DecisionLogError),

    /// The log holds a different decision for this transaction than the one being finalized.
    DuplicateDecision(TransactionId),

    /// A participant refused the coordinator's decision.
    ProtocolViolation {
        transaction_id: TransactionId,
        participant_id: ParticipantId,
        message: String,
    },

    /// An unexpected internal fault, such as a panicked delivery task.
    Internal(String),
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorError::InvalidParticipantSet(e) => Some(e),
            CoordinatorError::InvalidTransactionId(e) => Some(e),
            CoordinatorError::InvalidState(e) => Some(e),
            CoordinatorError::LogWrite(e) => Some(e),
            CoordinatorError::LogRead(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            CoordinatorError::InvalidParticipantSet(e) => {
                write!(f, "invalid participant set: {}", e)
            }
            CoordinatorError::InvalidTransactionId(e) => {
                write!(f, "invalid transaction id: {}", e)
            }
            CoordinatorError::UnknownTransaction(id) => write!(f, "unknown transaction {}", id),
            CoordinatorError::DuplicateTransaction(id) => {
                write!(f, "transaction {} already exists", id)
            }
            CoordinatorError::InvalidState(e) => write!(f, "{}", e),
            CoordinatorError::LogWrite(e) => write!(f, "{}", e),
            CoordinatorError::LogRead(e) => write!(f, "{}", e),
            CoordinatorError::DuplicateDecision(id) => {
                write!(f, "conflicting decision recorded for transaction {}", id)
            }
            CoordinatorError::ProtocolViolation {
                transaction_id,
                participant_id,
                message,
            } => write!(
                f,
                "participant {} violated the protocol for transaction {}: {}",
                participant_id, transaction_id, message
            ),
            CoordinatorError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl From<AlgorithmError> for CoordinatorError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::InvalidState(e) => CoordinatorError::InvalidState(e),
        }
    }
}

impl From<InvalidStateError> for CoordinatorError {
    fn from(err: InvalidStateError) -> Self {
        CoordinatorError::InvalidState(err)
    }
}

impl From<DecisionLogError> for CoordinatorError {
    fn from(err: DecisionLogError) -> Self {
        match err {
            DecisionLogError::DuplicateDecision(id) => CoordinatorError::DuplicateDecision(id),
            DecisionLogError::Read(msg) => CoordinatorError::LogRead(DecisionLogError::Read(msg)),
            write => CoordinatorError::LogWrite(write),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_errors_become_invalid_state() {
        let err = AlgorithmError::InvalidState(InvalidStateError::with_message(
            "no decision yet".to_string(),
        ));

        let err = CoordinatorError::from(err);
        assert!(matches!(err, CoordinatorError::InvalidState(_)));
        assert!(err.to_string().contains("no decision yet"));
    }
}
