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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ParticipantError;
use crate::links::ParticipantLink;
use crate::message::{IdempotencyKey, Phase};
use crate::time::TimeSource;
use crate::transaction::{
    Acknowledgment, Decision, ParticipantRef, TransactionId, TransactionStatus, Vote,
};

/// A handle for calling one participant.
///
/// Each call is bounded by the call timeout; a call which does not complete in time fails as
/// [`ParticipantError::Unreachable`], the same as a lost message.
#[derive(Clone)]
pub struct ParticipantClient {
    participant: ParticipantRef,
    link: Arc<dyn ParticipantLink>,
    call_timeout: Duration,
    time_source: Arc<dyn TimeSource>,
}

impl ParticipantClient {
    pub fn new(
        participant: ParticipantRef,
        link: Arc<dyn ParticipantLink>,
        call_timeout: Duration,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        ParticipantClient {
            participant,
            link,
            call_timeout,
            time_source,
        }
    }

    pub fn participant(&self) -> &ParticipantRef {
        &self.participant
    }

    pub async fn prepare(
        &self,
        id: &TransactionId,
        payload: &[u8],
    ) -> Result<Vote, ParticipantError> {
        let key = IdempotencyKey::new(id.clone(), Phase::Prepare);
        let value = self.timed(&key, self.link.prepare(&key, payload)).await?;

        Ok(Vote {
            participant_id: self.participant.id.clone(),
            transaction_id: id.clone(),
            value,
        })
    }

    pub async fn commit(&self, id: &TransactionId) -> Result<Acknowledgment, ParticipantError> {
        self.deliver(id, Decision::Commit).await
    }

    pub async fn abort(&self, id: &TransactionId) -> Result<Acknowledgment, ParticipantError> {
        self.deliver(id, Decision::Abort).await
    }

    /// Delivers a decision, returning the participant's acknowledgment.
    pub async fn deliver(
        &self,
        id: &TransactionId,
        decision: Decision,
    ) -> Result<Acknowledgment, ParticipantError> {
        let key = IdempotencyKey::new(id.clone(), Phase::from(decision));
        match decision {
            Decision::Commit => self.timed(&key, self.link.commit(&key)).await?,
            Decision::Abort => self.timed(&key, self.link.abort(&key)).await?,
        }

        Ok(Acknowledgment {
            transaction_id: id.clone(),
            participant_id: self.participant.id.clone(),
            phase: decision,
            received_at: self.time_source.now(),
        })
    }

    pub async fn get_status(
        &self,
        id: &TransactionId,
    ) -> Result<TransactionStatus, ParticipantError> {
        match tokio::time::timeout(self.call_timeout, self.link.get_status(id)).await {
            Ok(result) => result,
            Err(_) => Err(ParticipantError::Unreachable(format!(
                "status request to {} for {} timed out after {:?}",
                self.participant.id, id, self.call_timeout
            ))),
        }
    }

    async fn timed<T, F>(&self, key: &IdempotencyKey, call: F) -> Result<T, ParticipantError>
    where
        F: Future<Output = Result<T, ParticipantError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ParticipantError::Unreachable(format!(
                "{} request {} to {} timed out after {:?}",
                key.phase, key, self.participant.id, self.call_timeout
            ))),
        }
    }
}
