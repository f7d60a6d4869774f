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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::algorithm::two_phase_commit::{
    ParticipantAction, ParticipantActionNotification, ParticipantAlgorithm, ParticipantContext,
    ParticipantEvent, Response,
};
use crate::algorithm::Algorithm;
use crate::error::ParticipantError;
use crate::keyed::KeyedMutex;
use crate::links::{CoordinatorLink, ParticipantLink};
use crate::message::{IdempotencyKey, Phase};
use crate::time::{SystemTimeSource, TimeSource};
use crate::transaction::{ParticipantId, TransactionId, TransactionStatus, VoteValue};

/// The local resource a participant commits or aborts.
///
/// Each of `prepare`, `commit` and `abort` is called at most once per transaction, and never
/// both `commit` and `abort`.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Makes the transaction's changes ready to commit and votes. A yes vote is a promise to
    /// commit if asked.
    async fn prepare(&self, id: &TransactionId, payload: &[u8]) -> VoteValue;

    async fn commit(&self, id: &TransactionId);

    async fn abort(&self, id: &TransactionId);
}

#[derive(Default)]
struct Outcome {
    response: Option<Response>,
    query_coordinator: bool,
}

struct Shared<R, TS: TimeSource> {
    id: ParticipantId,
    resource: R,
    algorithm: ParticipantAlgorithm<TS>,
    transactions: KeyedMutex<TransactionId, ParticipantContext>,
}

/// A participant which runs in process.
///
/// Requests are driven through the participant algorithm, so repeated requests are answered
/// without repeating side effects and conflicting requests are rejected. Requests for one
/// transaction are handled one at a time; different transactions do not wait on each other.
///
/// A request runs to completion in its own task once received. A caller which stops waiting,
/// for instance after a timeout, does not interrupt the resource manager, and its retry is
/// answered from the stored outcome.
pub struct LocalParticipant<R, TS = SystemTimeSource>
where
    R: ResourceManager,
    TS: TimeSource,
{
    shared: Arc<Shared<R, TS>>,
}

impl<R> LocalParticipant<R, SystemTimeSource>
where
    R: ResourceManager + 'static,
{
    pub fn new<I: Into<ParticipantId>>(id: I, resource: R) -> Self {
        LocalParticipant::with_time_source(id, resource, SystemTimeSource::new())
    }
}

impl<R, TS> LocalParticipant<R, TS>
where
    R: ResourceManager + 'static,
    TS: TimeSource + 'static,
{
    pub fn with_time_source<I: Into<ParticipantId>>(id: I, resource: R, time_source: TS) -> Self {
        LocalParticipant {
            shared: Arc::new(Shared {
                id: id.into(),
                resource,
                algorithm: ParticipantAlgorithm::new(time_source),
                transactions: KeyedMutex::new(),
            }),
        }
    }

    /// Sets how long this participant waits in doubt before asking the coordinator. Only takes
    /// effect before the participant has handled a request.
    pub fn with_decision_timeout(self, decision_timeout: Duration) -> Self {
        match Arc::try_unwrap(self.shared) {
            Ok(shared) => LocalParticipant {
                shared: Arc::new(Shared {
                    algorithm: shared.algorithm.with_decision_timeout(decision_timeout),
                    ..shared
                }),
            },
            Err(shared) => {
                warn!(
                    "Participant {}: decision timeout ignored, requests are in flight",
                    shared.id
                );
                LocalParticipant { shared }
            }
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.shared.id
    }

    pub fn resource(&self) -> &R {
        &self.shared.resource
    }

    /// The outcome applied locally for a transaction.
    pub async fn status(&self, id: &TransactionId) -> TransactionStatus {
        match self.shared.transactions.get(id) {
            Some(slot) => slot.lock().await.status(),
            None => TransactionStatus::Unknown,
        }
    }

    /// Transactions this participant voted yes on and has no decision for.
    pub async fn in_doubt(&self) -> Vec<TransactionId> {
        let transactions = &self.shared.transactions;
        let mut in_doubt = Vec::new();
        for id in transactions.keys() {
            if let Some(slot) = transactions.get(&id) {
                if slot.lock().await.in_doubt() {
                    in_doubt.push(id);
                }
            }
        }
        in_doubt.sort();
        in_doubt
    }

    /// Runs the termination protocol for every transaction in doubt past the decision timeout:
    /// asks the coordinator for the decision and applies it if one was recorded.
    ///
    /// Returns the transactions resolved. A coordinator which cannot be reached leaves the
    /// transaction in doubt for the next call.
    pub async fn resolve_in_doubt(&self, coordinator: &dyn CoordinatorLink) -> Vec<TransactionId> {
        let participant = &self.shared.id;
        let mut resolved = Vec::new();

        for id in self.in_doubt().await {
            match self.detached(id.clone(), ParticipantEvent::Alarm).await {
                Ok(outcome) if outcome.query_coordinator => (),
                Ok(_) => continue,
                Err(err) => {
                    warn!("Participant {}: {}", participant, err);
                    continue;
                }
            }

            let status = match coordinator.get_status(&id).await {
                Ok(status) => status,
                Err(err) => {
                    warn!(
                        "Participant {}: unable to learn the decision for {}: {}",
                        participant, id, err
                    );
                    continue;
                }
            };
            if status == TransactionStatus::Unknown {
                debug!(
                    "Participant {}: no decision recorded yet for {}",
                    participant, id
                );
                continue;
            }

            match self
                .detached(id.clone(), ParticipantEvent::Status(status))
                .await
            {
                Ok(_) => {
                    info!(
                        "Participant {}: resolved {} as {:?} through the coordinator",
                        participant, id, status
                    );
                    resolved.push(id);
                }
                Err(err) => warn!("Participant {}: {}", participant, err),
            }
        }

        resolved
    }

    // Handles an event for one transaction in a task of its own, which finishes even if the
    // returned future is dropped.
    async fn detached(
        &self,
        id: TransactionId,
        event: ParticipantEvent,
    ) -> Result<Outcome, ParticipantError> {
        let shared = self.shared.clone();
        let participant = shared.id.clone();
        let transaction = id.clone();

        tokio::spawn(async move { shared.apply(id, event).await })
            .await
            .map_err(|err| {
                ParticipantError::Unreachable(format!(
                    "participant {} failed while handling {}: {}",
                    participant, transaction, err
                ))
            })?
    }

    async fn handle(
        &self,
        key: &IdempotencyKey,
        expected: Phase,
        event: ParticipantEvent,
    ) -> Result<Response, ParticipantError> {
        if key.phase != expected {
            return Err(ParticipantError::Rejected(format!(
                "{} request sent with key {}",
                expected, key
            )));
        }

        let outcome = self.detached(key.transaction_id.clone(), event).await?;
        outcome.response.ok_or_else(|| {
            ParticipantError::Unreachable(format!(
                "participant {} has no answer yet for {}",
                self.shared.id, key
            ))
        })
    }
}

impl<R, TS> Shared<R, TS>
where
    R: ResourceManager,
    TS: TimeSource,
{
    // Applies an event under the transaction's lock. The context is only stored once the event
    // has been fully handled, so a failed event leaves no partial state.
    async fn apply(
        &self,
        id: TransactionId,
        event: ParticipantEvent,
    ) -> Result<Outcome, ParticipantError> {
        let slot = self
            .transactions
            .get_or_insert_with(id.clone(), || ParticipantContext::new(id.clone()));
        let mut guard = slot.lock().await;

        let mut context = guard.clone();
        let outcome = self.process(event, &mut context).await?;
        *guard = context;
        Ok(outcome)
    }

    // Feeds an event through the algorithm and carries out the resulting actions against
    // `context`. Requests for a vote are answered by the resource manager and fed back in.
    async fn process(
        &self,
        event: ParticipantEvent,
        context: &mut ParticipantContext,
    ) -> Result<Outcome, ParticipantError> {
        let id = context.transaction_id().clone();
        let mut outcome = Outcome::default();
        let mut events = vec![event];

        while let Some(event) = events.pop() {
            let actions = self
                .algorithm
                .event(event, context.clone())
                .map_err(|err| ParticipantError::Rejected(err.to_string()))?;

            for action in actions {
                match action {
                    ParticipantAction::Update(updated) => *context = updated,
                    ParticipantAction::Notify(ParticipantActionNotification::RequestForVote(
                        payload,
                    )) => {
                        let vote = self.resource.prepare(&id, &payload).await;
                        debug!("Participant {} votes {:?} on {}", self.id, vote, id);
                        events.push(ParticipantEvent::Vote(vote));
                    }
                    ParticipantAction::Notify(ParticipantActionNotification::Commit) => {
                        self.resource.commit(&id).await
                    }
                    ParticipantAction::Notify(ParticipantActionNotification::Abort) => {
                        self.resource.abort(&id).await
                    }
                    ParticipantAction::Notify(ParticipantActionNotification::MessageDropped(
                        reason,
                    )) => debug!("Participant {} dropped message for {}: {}", self.id, id, reason),
                    ParticipantAction::QueryCoordinator => outcome.query_coordinator = true,
                    ParticipantAction::Respond(response) => outcome.response = Some(response),
                }
            }
        }

        Ok(outcome)
    }
}

fn acknowledged(response: Response) -> Result<(), ParticipantError> {
    match response {
        Response::Ack => Ok(()),
        Response::Rejected(reason) => Err(ParticipantError::Rejected(reason)),
        Response::Vote(_) => Err(ParticipantError::Rejected(
            "vote given in answer to a decision".into(),
        )),
    }
}

#[async_trait]
impl<R, TS> ParticipantLink for LocalParticipant<R, TS>
where
    R: ResourceManager + 'static,
    TS: TimeSource + 'static,
{
    async fn prepare(
        &self,
        key: &IdempotencyKey,
        payload: &[u8],
    ) -> Result<VoteValue, ParticipantError> {
        let response = self
            .handle(key, Phase::Prepare, ParticipantEvent::Prepare(payload.to_vec()))
            .await?;
        match response {
            Response::Vote(vote) => Ok(vote),
            Response::Rejected(reason) => Err(ParticipantError::Rejected(reason)),
            Response::Ack => Err(ParticipantError::Rejected(
                "acknowledgment given in answer to a vote request".into(),
            )),
        }
    }

    async fn commit(&self, key: &IdempotencyKey) -> Result<(), ParticipantError> {
        let response = self.handle(key, Phase::Commit, ParticipantEvent::Commit).await?;
        acknowledged(response).map_err(|err| {
            warn!("Participant {} refused {}: {}", self.shared.id, key, err);
            err
        })
    }

    async fn abort(&self, key: &IdempotencyKey) -> Result<(), ParticipantError> {
        let response = self.handle(key, Phase::Abort, ParticipantEvent::Abort).await?;
        acknowledged(response).map_err(|err| {
            warn!("Participant {} refused {}: {}", self.shared.id, key, err);
            err
        })
    }

    async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, ParticipantError> {
        Ok(self.status(id).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::error::CoordinatorError;
    use crate::time::ManualTimeSource;

    use super::*;

    #[derive(Default)]
    struct Ledger {
        vote: Option<VoteValue>,
        events: Mutex<Vec<String>>,
    }

    impl Ledger {
        fn voting(vote: VoteValue) -> Self {
            Ledger {
                vote: Some(vote),
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().expect("ledger lock").clone()
        }
    }

    #[async_trait]
    impl ResourceManager for Ledger {
        async fn prepare(&self, id: &TransactionId, _payload: &[u8]) -> VoteValue {
            self.events
                .lock()
                .expect("ledger lock")
                .push(format!("prepare {}", id));
            self.vote.unwrap_or(VoteValue::Yes)
        }

        async fn commit(&self, id: &TransactionId) {
            self.events
                .lock()
                .expect("ledger lock")
                .push(format!("commit {}", id));
        }

        async fn abort(&self, id: &TransactionId) {
            self.events
                .lock()
                .expect("ledger lock")
                .push(format!("abort {}", id));
        }
    }

    struct FixedCoordinator(TransactionStatus);

    #[async_trait]
    impl CoordinatorLink for FixedCoordinator {
        async fn get_status(
            &self,
            _id: &TransactionId,
        ) -> Result<TransactionStatus, CoordinatorError> {
            Ok(self.0)
        }
    }

    fn key(phase: Phase) -> IdempotencyKey {
        IdempotencyKey::new(TransactionId::from("tx"), phase)
    }

    #[tokio::test]
    async fn commit_is_applied_once() -> Result<(), Box<dyn std::error::Error>> {
        let participant = LocalParticipant::new("p1", Ledger::default());

        assert_eq!(participant.prepare(&key(Phase::Prepare), &[]).await?, VoteValue::Yes);
        assert_eq!(participant.prepare(&key(Phase::Prepare), &[]).await?, VoteValue::Yes);
        participant.commit(&key(Phase::Commit)).await?;
        participant.commit(&key(Phase::Commit)).await?;

        assert_eq!(
            participant.resource().events(),
            vec!["prepare tx".to_string(), "commit tx".to_string()]
        );
        assert_eq!(
            participant.get_status(&TransactionId::from("tx")).await?,
            TransactionStatus::Commit
        );

        Ok(())
    }

    #[tokio::test]
    async fn no_voters_refuse_commit() -> Result<(), Box<dyn std::error::Error>> {
        let participant = LocalParticipant::new("p1", Ledger::voting(VoteValue::No));

        assert_eq!(participant.prepare(&key(Phase::Prepare), &[]).await?, VoteValue::No);
        assert!(matches!(
            participant.commit(&key(Phase::Commit)).await,
            Err(ParticipantError::Rejected(_))
        ));
        participant.abort(&key(Phase::Abort)).await?;

        assert_eq!(
            participant.resource().events(),
            vec!["prepare tx".to_string(), "abort tx".to_string()]
        );

        Ok(())
    }

    #[tokio::test]
    async fn abort_without_prepare_is_acknowledged() -> Result<(), Box<dyn std::error::Error>> {
        let participant = LocalParticipant::new("p1", Ledger::default());

        participant.abort(&key(Phase::Abort)).await?;
        assert_eq!(
            participant.prepare(&key(Phase::Prepare), &[]).await?,
            VoteValue::No
        );

        Ok(())
    }

    #[tokio::test]
    async fn mismatched_keys_are_rejected() {
        let participant = LocalParticipant::new("p1", Ledger::default());

        assert!(matches!(
            participant.commit(&key(Phase::Abort)).await,
            Err(ParticipantError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn doubt_is_resolved_through_the_coordinator() -> Result<(), Box<dyn std::error::Error>>
    {
        let clock = ManualTimeSource::default();
        let participant =
            LocalParticipant::with_time_source("p1", Ledger::default(), clock.clone())
                .with_decision_timeout(Duration::from_secs(10));

        participant.prepare(&key(Phase::Prepare), &[]).await?;
        assert_eq!(participant.in_doubt().await, vec![TransactionId::from("tx")]);

        // Not yet past the decision timeout.
        let resolved = participant
            .resolve_in_doubt(&FixedCoordinator(TransactionStatus::Commit))
            .await;
        assert!(resolved.is_empty());

        clock.advance(Duration::from_secs(11));
        let resolved = participant
            .resolve_in_doubt(&FixedCoordinator(TransactionStatus::Unknown))
            .await;
        assert!(resolved.is_empty());
        assert_eq!(participant.in_doubt().await.len(), 1);

        clock.advance(Duration::from_secs(11));
        let resolved = participant
            .resolve_in_doubt(&FixedCoordinator(TransactionStatus::Commit))
            .await;
        assert_eq!(resolved, vec![TransactionId::from("tx")]);
        assert!(participant.in_doubt().await.is_empty());
        assert_eq!(
            participant.resource().events(),
            vec!["prepare tx".to_string(), "commit tx".to_string()]
        );

        // The decision arriving late from the coordinator is still acknowledged.
        participant.commit(&key(Phase::Commit)).await?;

        Ok(())
    }

    /// Counts commits and takes a while to apply each one.
    #[derive(Default)]
    struct SlowCommit {
        commits: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ResourceManager for SlowCommit {
        async fn prepare(&self, _id: &TransactionId, _payload: &[u8]) -> VoteValue {
            VoteValue::Yes
        }

        async fn commit(&self, _id: &TransactionId) {
            self.commits
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        async fn abort(&self, _id: &TransactionId) {}
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_commits_are_not_repeated() -> Result<(), Box<dyn std::error::Error>> {
        let participant = LocalParticipant::new("p1", SlowCommit::default());
        participant.prepare(&key(Phase::Prepare), &[]).await?;

        let first = tokio::time::timeout(
            Duration::from_millis(100),
            participant.commit(&key(Phase::Commit)),
        )
        .await;
        assert!(first.is_err());
        for _ in 0..4 {
            let _ = tokio::time::timeout(
                Duration::from_millis(100),
                participant.commit(&key(Phase::Commit)),
            )
            .await;
        }
        participant.commit(&key(Phase::Commit)).await?;

        assert_eq!(
            participant
                .resource()
                .commits
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert_eq!(
            participant.status(&TransactionId::from("tx")).await,
            TransactionStatus::Commit
        );

        Ok(())
    }
}
