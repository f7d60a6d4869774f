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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParticipantError;
use crate::message::{IdempotencyKey, Phase};
use crate::transaction::{ParticipantRef, TransactionId, TransactionStatus, VoteValue};

use super::{Connector, ParticipantLink};

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<String, Arc<dyn ParticipantLink>>,
    partitioned: HashSet<String>,
    lost_requests: HashMap<(String, Phase), u32>,
    lost_replies: HashMap<(String, Phase), u32>,
    delays: HashMap<String, Duration>,
    calls: Vec<(String, IdempotencyKey)>,
}

/// An in-process network of participants with injectable faults.
///
/// Participants are registered under an endpoint string; a [`ParticipantRef`] whose endpoint
/// matches is routed to them. Faults are checked on every call, so a partition or a lost
/// message affects calls made through links obtained before the fault was injected. Handles are
/// cheap to clone and share the same network.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        InMemoryNetwork::default()
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register<E: Into<String>>(&self, endpoint: E, link: Arc<dyn ParticipantLink>) {
        self.state().endpoints.insert(endpoint.into(), link);
    }

    pub fn deregister(&self, endpoint: &str) {
        self.state().endpoints.remove(endpoint);
    }

    /// Makes every call to `endpoint` fail as unreachable until healed.
    pub fn partition(&self, endpoint: &str) {
        self.state().partitioned.insert(endpoint.to_string());
    }

    pub fn heal(&self, endpoint: &str) {
        self.state().partitioned.remove(endpoint);
    }

    /// Drops the next `count` requests for `phase` before they reach the participant.
    pub fn lose_next_requests(&self, endpoint: &str, phase: Phase, count: u32) {
        *self
            .state()
            .lost_requests
            .entry((endpoint.to_string(), phase))
            .or_insert(0) += count;
    }

    /// Drops the next `count` successful replies for `phase` after the participant has acted on
    /// the request.
    pub fn lose_next_replies(&self, endpoint: &str, phase: Phase, count: u32) {
        *self
            .state()
            .lost_replies
            .entry((endpoint.to_string(), phase))
            .or_insert(0) += count;
    }

    /// Delays every request to `endpoint` by `delay` before delivering it.
    pub fn set_delay(&self, endpoint: &str, delay: Duration) {
        self.state().delays.insert(endpoint.to_string(), delay);
    }

    /// Every phase call attempted against `endpoint`, in order, including calls that failed.
    pub fn calls_to(&self, endpoint: &str) -> Vec<IdempotencyKey> {
        self.state()
            .calls
            .iter()
            .filter(|(to, _)| to == endpoint)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl Connector for InMemoryNetwork {
    fn connect(
        &self,
        participant: &ParticipantRef,
    ) -> Result<Arc<dyn ParticipantLink>, ParticipantError> {
        Ok(Arc::new(NetworkLink {
            network: self.clone(),
            endpoint: participant.endpoint.clone(),
        }))
    }
}

fn take(counters: &mut HashMap<(String, Phase), u32>, endpoint: &str, phase: Phase) -> bool {
    match counters.get_mut(&(endpoint.to_string(), phase)) {
        Some(count) if *count > 0 => {
            *count -= 1;
            true
        }
        _ => false,
    }
}

struct NetworkLink {
    network: InMemoryNetwork,
    endpoint: String,
}

impl NetworkLink {
    async fn route(
        &self,
        key: Option<&IdempotencyKey>,
    ) -> Result<Arc<dyn ParticipantLink>, ParticipantError> {
        let (target, delay) = {
            let mut state = self.network.state();
            if let Some(key) = key {
                state.calls.push((self.endpoint.clone(), key.clone()));
            }

            if state.partitioned.contains(&self.endpoint) {
                return Err(ParticipantError::Unreachable(format!(
                    "{} is partitioned",
                    self.endpoint
                )));
            }

            if let Some(key) = key {
                if take(&mut state.lost_requests, &self.endpoint, key.phase) {
                    return Err(ParticipantError::Unreachable(format!(
                        "{} request to {} was lost",
                        key.phase, self.endpoint
                    )));
                }
            }

            let target = state.endpoints.get(&self.endpoint).cloned().ok_or_else(|| {
                ParticipantError::Unreachable(format!("nothing is listening at {}", self.endpoint))
            })?;
            (target, state.delays.get(&self.endpoint).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(target)
    }

    fn reply<T>(
        &self,
        phase: Phase,
        reply: Result<T, ParticipantError>,
    ) -> Result<T, ParticipantError> {
        if reply.is_ok() && take(&mut self.network.state().lost_replies, &self.endpoint, phase) {
            return Err(ParticipantError::Unreachable(format!(
                "{} reply from {} was lost",
                phase, self.endpoint
            )));
        }
        reply
    }
}

#[async_trait]
impl ParticipantLink for NetworkLink {
    async fn prepare(
        &self,
        key: &IdempotencyKey,
        payload: &[u8],
    ) -> Result<VoteValue, ParticipantError> {
        let target = self.route(Some(key)).await?;
        let reply = target.prepare(key, payload).await;
        self.reply(key.phase, reply)
    }

    async fn commit(&self, key: &IdempotencyKey) -> Result<(), ParticipantError> {
        let target = self.route(Some(key)).await?;
        let reply = target.commit(key).await;
        self.reply(key.phase, reply)
    }

    async fn abort(&self, key: &IdempotencyKey) -> Result<(), ParticipantError> {
        let target = self.route(Some(key)).await?;
        let reply = target.abort(key).await;
        self.reply(key.phase, reply)
    }

    async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, ParticipantError> {
        self.route(None).await?.get_status(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingLink {
        commits: AtomicU32,
    }

    #[async_trait]
    impl ParticipantLink for CountingLink {
        async fn prepare(
            &self,
            _key: &IdempotencyKey,
            _payload: &[u8],
        ) -> Result<VoteValue, ParticipantError> {
            Ok(VoteValue::Yes)
        }

        async fn commit(&self, _key: &IdempotencyKey) -> Result<(), ParticipantError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(&self, _key: &IdempotencyKey) -> Result<(), ParticipantError> {
            Ok(())
        }

        async fn get_status(
            &self,
            _id: &TransactionId,
        ) -> Result<TransactionStatus, ParticipantError> {
            Ok(TransactionStatus::Unknown)
        }
    }

    fn key(phase: Phase) -> IdempotencyKey {
        IdempotencyKey::new(TransactionId::from("tx"), phase)
    }

    fn setup() -> (InMemoryNetwork, Arc<CountingLink>, Arc<dyn ParticipantLink>) {
        let network = InMemoryNetwork::new();
        let participant = Arc::new(CountingLink::default());
        network.register("mem://p1", participant.clone());
        let link = network
            .connect(&ParticipantRef::new("p1", "mem://p1"))
            .expect("in-memory connect never fails");
        (network, participant, link)
    }

    #[tokio::test]
    async fn partitions_make_calls_unreachable() {
        let (network, _, link) = setup();

        network.partition("mem://p1");
        assert!(matches!(
            link.prepare(&key(Phase::Prepare), &[]).await,
            Err(ParticipantError::Unreachable(_))
        ));

        network.heal("mem://p1");
        assert_eq!(
            link.prepare(&key(Phase::Prepare), &[]).await,
            Ok(VoteValue::Yes)
        );
        assert_eq!(network.calls_to("mem://p1").len(), 2);
    }

    #[tokio::test]
    async fn lost_requests_never_reach_the_participant() {
        let (network, participant, link) = setup();
        network.lose_next_requests("mem://p1", Phase::Commit, 1);

        assert!(link.commit(&key(Phase::Commit)).await.is_err());
        assert_eq!(participant.commits.load(Ordering::SeqCst), 0);

        assert!(link.commit(&key(Phase::Commit)).await.is_ok());
        assert_eq!(participant.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lost_replies_are_applied_but_unreachable() {
        let (network, participant, link) = setup();
        network.lose_next_replies("mem://p1", Phase::Commit, 1);

        assert!(matches!(
            link.commit(&key(Phase::Commit)).await,
            Err(ParticipantError::Unreachable(_))
        ));
        assert_eq!(participant.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_endpoints_are_unreachable() {
        let network = InMemoryNetwork::new();
        let link = network
            .connect(&ParticipantRef::new("p9", "mem://p9"))
            .expect("in-memory connect never fails");

        assert!(matches!(
            link.get_status(&TransactionId::from("tx")).await,
            Err(ParticipantError::Unreachable(_))
        ));
    }
}
