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

//! Operator-visible conditions raised by the coordinator.

use std::fmt;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::transaction::{Decision, ParticipantId, TransactionId};

/// A condition which needs an operator's attention.
///
/// Every alarm is also written to the log, so nothing is lost when no one subscribes.
#[derive(Clone, Debug, PartialEq)]
pub enum Alarm {
    /// The finalize deadline passed before every participant acknowledged. Delivery continues
    /// in the background.
    PendingTransaction {
        transaction_id: TransactionId,
        decision: Decision,
        elapsed: Duration,
    },
    /// Delivery to one participant has failed for a full reporting interval.
    DeliveryStalled {
        transaction_id: TransactionId,
        participant_id: ParticipantId,
        attempts: u32,
        last_error: String,
    },
    /// A participant refused a request it must accept, such as a commit after voting yes.
    ProtocolViolation {
        transaction_id: TransactionId,
        participant_id: ParticipantId,
        message: String,
    },
    LogWriteFailed {
        transaction_id: TransactionId,
        message: String,
    },
    /// A different decision is already recorded for the transaction.
    DuplicateDecision { transaction_id: TransactionId },
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Alarm::PendingTransaction {
                transaction_id,
                decision,
                elapsed,
            } => write!(
                f,
                "transaction {} still delivering {} after {:?}",
                transaction_id, decision, elapsed
            ),
            Alarm::DeliveryStalled {
                transaction_id,
                participant_id,
                attempts,
                last_error,
            } => write!(
                f,
                "transaction {}: participant {} has not acknowledged after {} attempts: {}",
                transaction_id, participant_id, attempts, last_error
            ),
            Alarm::ProtocolViolation {
                transaction_id,
                participant_id,
                message,
            } => write!(
                f,
                "transaction {}: protocol violation by participant {}: {}",
                transaction_id, participant_id, message
            ),
            Alarm::LogWriteFailed {
                transaction_id,
                message,
            } => write!(
                f,
                "transaction {}: decision log write failed: {}",
                transaction_id, message
            ),
            Alarm::DuplicateDecision { transaction_id } => write!(
                f,
                "transaction {}: a conflicting decision is already recorded",
                transaction_id
            ),
        }
    }
}

pub(crate) struct Alarms {
    sender: broadcast::Sender<Alarm>,
}

impl Alarms {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Alarms { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alarm> {
        self.sender.subscribe()
    }

    pub fn raise(&self, alarm: Alarm) {
        match &alarm {
            Alarm::PendingTransaction { .. } | Alarm::DeliveryStalled { .. } => {
                warn!("{}", alarm)
            }
            _ => error!("{}", alarm),
        }
        // No subscribers is not an error.
        let _ = self.sender.send(alarm);
    }
}
