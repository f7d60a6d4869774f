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

//! Defines the communication abstractions between a coordinator and its participants.
//!
//! A link[^note-1] connects the coordinator to one participant. Unlike the one-way links of the
//! textbook model, a participant link is request/response: every call either returns the
//! participant's answer or fails with a [`ParticipantError`]. A [`Connector`] resolves a
//! [`ParticipantRef`] to a link, so the coordinator never depends on a concrete transport.
//!
//! Participants which are in doubt reach back to the coordinator through a
//! [`CoordinatorLink`] to learn a decision they missed.
//!
//! [^note-1]: For a full explanation of links, see Cachin, Guerraoui, and Rodrigues, **Reliable and
//! Secure Distributed Programming**, 2nd ed., 2.4.

mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CoordinatorError, ParticipantError};
use crate::message::IdempotencyKey;
use crate::transaction::{ParticipantRef, TransactionId, TransactionStatus, VoteValue};

pub use in_memory::InMemoryNetwork;

/// The RPC surface of a single participant.
///
/// Every phase call carries an [`IdempotencyKey`]; a participant must treat a repeated key as a
/// repeat of the same request and answer it the same way without repeating any side effect.
#[async_trait]
pub trait ParticipantLink: Send + Sync {
    /// Asks the participant to vote on a transaction.
    ///
    /// # Errors
    ///
    /// [`ParticipantError::Unreachable`] if the request or its response was lost, or
    /// [`ParticipantError::Rejected`] if the participant refused the request outright.
    async fn prepare(
        &self,
        key: &IdempotencyKey,
        payload: &[u8],
    ) -> Result<VoteValue, ParticipantError>;

    async fn commit(&self, key: &IdempotencyKey) -> Result<(), ParticipantError>;

    async fn abort(&self, key: &IdempotencyKey) -> Result<(), ParticipantError>;

    /// Reports the outcome the participant has applied, if any.
    async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, ParticipantError>;
}

/// Resolves participant references to links.
pub trait Connector: Send + Sync {
    /// # Errors
    ///
    /// [`ParticipantError::Unreachable`] if no link can be established.
    fn connect(
        &self,
        participant: &ParticipantRef,
    ) -> Result<Arc<dyn ParticipantLink>, ParticipantError>;
}

/// The coordinator's side of the termination protocol, as seen by a participant.
#[async_trait]
pub trait CoordinatorLink: Send + Sync {
    /// Returns the durable decision for a transaction, or `Unknown` if none was recorded.
    async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, CoordinatorError>;
}
