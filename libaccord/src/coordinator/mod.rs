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

//! The transaction coordinator.
//!
//! A [`Coordinator`] drives transactions through the coordinator algorithm and carries out the
//! actions it emits: prepare requests are fanned out to every participant concurrently, the
//! decision is appended to the decision log, and only then is it delivered. Delivery of a
//! durable decision is retried until every participant acknowledges it.
//!
//! Each transaction's context sits behind its own lock. Phase one, phase two and recovery of the
//! same transaction take turns; different transactions never wait on each other.

mod alarm;
mod builder;
mod config;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::algorithm::two_phase_commit::{
    CoordinatorAction, CoordinatorActionNotification, CoordinatorAlgorithm, CoordinatorEvent,
    TransactionContext, TransactionState,
};
use crate::algorithm::Algorithm;
use crate::decision_log::DecisionLog;
use crate::error::{
    CoordinatorError, DecisionLogError, InvalidArgumentError, InvalidStateError, ParticipantError,
};
use crate::keyed::{KeyedMutex, Slot};
use crate::links::{Connector, CoordinatorLink};
use crate::participant::ParticipantClient;
use crate::retry::{CancellationToken, RetryError, RetryPolicy, RetryScheduler, RetryStall};
use crate::time::TimeSource;
use crate::transaction::{
    Acknowledgment, Decision, DecisionRecord, ParticipantId, ParticipantRef, TransactionId,
    TransactionStatus, Vote, MAX_TRANSACTION_ID_LEN,
};

pub use alarm::Alarm;
pub use builder::CoordinatorBuilder;
pub use config::{CoordinatorConfig, RetryConfig};

use alarm::Alarms;

/// A request to start a transaction with a chosen id or per-participant payloads.
#[derive(Clone, Debug, Default)]
pub struct TransactionRequest {
    id: Option<TransactionId>,
    participants: Vec<(ParticipantRef, Vec<u8>)>,
}

impl TransactionRequest {
    pub fn new() -> Self {
        TransactionRequest::default()
    }

    pub fn with_id<I: Into<TransactionId>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a participant. `payload` is passed to it, uninterpreted, with the prepare request.
    pub fn with_participant(mut self, participant: ParticipantRef, payload: Vec<u8>) -> Self {
        self.participants.push((participant, payload));
        self
    }
}

/// How far `finalize` got before returning.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FinalizeStatus {
    /// Every participant acknowledged and the transaction is marked done in the log.
    Done(Decision),
    /// The decision is durable but not yet acknowledged by everyone; delivery continues in the
    /// background.
    Pending(Decision),
}

impl FinalizeStatus {
    pub fn decision(&self) -> Decision {
        match self {
            FinalizeStatus::Done(decision) | FinalizeStatus::Pending(decision) => *decision,
        }
    }
}

struct Inner {
    decision_log: Arc<dyn DecisionLog>,
    connector: Arc<dyn Connector>,
    time_source: Arc<dyn TimeSource>,
    algorithm: CoordinatorAlgorithm<Arc<dyn TimeSource>>,
    transactions: KeyedMutex<TransactionId, TransactionContext>,
    // Last known phase of every transaction, readable while its context is locked.
    phases: Mutex<HashMap<TransactionId, TransactionState>>,
    scheduler: RetryScheduler,
    prepare_retry: RetryPolicy,
    delivery_retry: RetryPolicy,
    log_retry: RetryPolicy,
    call_timeout: Duration,
    prepare_timeout: Duration,
    finalize_deadline: Duration,
    alarms: Alarms,
    shutdown: CancellationToken,
}

/// Coordinates two-phase commit transactions.
///
/// Handles are cheap to clone and share the same state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Registers a new transaction over `participants`, with a generated id and empty payloads.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::InvalidParticipantSet`] if `participants` is empty or names a
    /// participant twice.
    pub async fn begin(
        &self,
        participants: Vec<ParticipantRef>,
    ) -> Result<TransactionId, CoordinatorError> {
        let request = participants
            .into_iter()
            .fold(TransactionRequest::new(), |request, participant| {
                request.with_participant(participant, Vec::new())
            });
        self.begin_with(request).await
    }

    /// Registers a new transaction as described by `request`.
    ///
    /// # Errors
    ///
    /// As [`begin`](Coordinator::begin), plus [`CoordinatorError::InvalidTransactionId`] for an
    /// empty id or one longer than [`MAX_TRANSACTION_ID_LEN`] bytes, and [`CoordinatorError::DuplicateTransaction`] for an id already in use, in
    /// memory or in the decision log.
    pub async fn begin_with(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionId, CoordinatorError> {
        let inner = &self.inner;
        let supplied = request.id.is_some();
        let id = request.id.unwrap_or_else(TransactionId::generate);

        if id.as_str().is_empty() {
            return Err(CoordinatorError::InvalidTransactionId(
                InvalidArgumentError::new(
                    "id".to_string(),
                    "transaction id must not be empty".to_string(),
                ),
            ));
        }
        if id.as_str().len() > MAX_TRANSACTION_ID_LEN {
            return Err(CoordinatorError::InvalidTransactionId(
                InvalidArgumentError::new(
                    "id".to_string(),
                    format!(
                        "transaction id is {} bytes, longer than {}",
                        id.as_str().len(),
                        MAX_TRANSACTION_ID_LEN
                    ),
                ),
            ));
        }

        let context =
            TransactionContext::new(id.clone(), request.participants, inner.time_source.now())
                .map_err(CoordinatorError::InvalidParticipantSet)?;

        if supplied && inner.decision_log.read(&id).await?.is_some() {
            return Err(CoordinatorError::DuplicateTransaction(id));
        }

        let participant_count = context.participants().len();
        inner
            .transactions
            .insert_new(id.clone(), context)
            .map_err(|_| CoordinatorError::DuplicateTransaction(id.clone()))?;
        inner.set_phase(&id, TransactionState::Init)?;

        debug!(
            "Began transaction {} with {} participants",
            id, participant_count
        );
        Ok(id)
    }

    /// Runs phase one and returns the decision.
    ///
    /// Every participant is asked to prepare concurrently. The decision is commit only if all of
    /// them vote yes within the retry budget and the prepare timeout; anything else aborts, and
    /// the first failure ends phase one without waiting for the remaining votes. A transaction
    /// which is already decided returns its decision without contacting anyone.
    ///
    /// Dropping the returned future before it completes leaves the transaction undecided; a
    /// later call starts phase one again.
    pub async fn prepare(&self, id: &TransactionId) -> Result<Decision, CoordinatorError> {
        let inner = &self.inner;
        let slot = match inner.transactions.get(id) {
            Some(slot) => slot,
            None => {
                return match inner.decision_log.read(id).await? {
                    Some(record) => Ok(record.decision),
                    None => Err(CoordinatorError::UnknownTransaction(id.clone())),
                }
            }
        };
        let mut context = slot.lock().await;

        let mut decision = None;
        let mut requests = Vec::new();
        for action in inner
            .algorithm
            .event(CoordinatorEvent::Prepare, context.clone())?
        {
            match action {
                CoordinatorAction::Update(updated) => inner.update(&mut context, updated)?,
                CoordinatorAction::SendPrepare(participant, payload) => {
                    requests.push((participant, payload))
                }
                CoordinatorAction::Notify(CoordinatorActionNotification::Decided(d)) => {
                    decision = Some(d)
                }
                other => return Err(unexpected(id, other)),
            }
        }
        if let Some(decision) = decision {
            return Ok(decision);
        }

        debug!(
            "Transaction {}: requesting votes from {} participants",
            id,
            requests.len()
        );
        let mut waiting: Vec<ParticipantId> =
            requests.iter().map(|(p, _)| p.id.clone()).collect();
        let mut votes: FuturesUnordered<_> = requests
            .into_iter()
            .map(|(participant, payload)| inner.request_vote(id, participant, payload))
            .collect();
        let timeout = tokio::time::sleep(inner.prepare_timeout);
        tokio::pin!(timeout);

        loop {
            let event = tokio::select! {
                next = votes.next() => match next {
                    Some((participant_id, result)) => {
                        waiting.retain(|waiting_on| waiting_on != &participant_id);
                        inner.vote_event(id, participant_id, result)
                    }
                    None => break,
                },
                _ = &mut timeout => match waiting.first() {
                    Some(participant_id) => CoordinatorEvent::VoteFailed(
                        participant_id.clone(),
                        format!("no vote within {:?}", inner.prepare_timeout),
                    ),
                    None => break,
                },
            };

            for action in inner.algorithm.event(event, context.clone())? {
                match action {
                    CoordinatorAction::Update(updated) => inner.update(&mut context, updated)?,
                    CoordinatorAction::Notify(CoordinatorActionNotification::Decided(d)) => {
                        decision = Some(d)
                    }
                    CoordinatorAction::Notify(CoordinatorActionNotification::MessageDropped(
                        reason,
                    )) => debug!("Transaction {}: dropped vote: {}", id, reason),
                    other => return Err(unexpected(id, other)),
                }
            }

            if let Some(decision) = decision {
                info!("Transaction {} decided {}", id, decision);
                return Ok(decision);
            }
        }

        Err(CoordinatorError::Internal(format!(
            "phase one of transaction {} ended without a decision",
            id
        )))
    }

    /// Makes the decision durable and delivers it to every participant.
    ///
    /// The decision record is appended before any participant is contacted; if it is already
    /// in the log, as it is for a recovered transaction, the append is skipped. Delivery is
    /// retried without limit. If not every participant has acknowledged by the finalize
    /// deadline, [`FinalizeStatus::Pending`] is returned, a pending alarm is raised, and
    /// delivery carries on in the background.
    ///
    /// # Errors
    ///
    /// [`CoordinatorError::InvalidState`] if the transaction is not yet decided,
    /// [`CoordinatorError::LogWrite`] if the decision could not be made durable, in which case
    /// no participant was contacted and `finalize` may be called again.
    pub async fn finalize(&self, id: &TransactionId) -> Result<FinalizeStatus, CoordinatorError> {
        match self.inner.transactions.get(id) {
            Some(slot) => self.finalize_slot(id, slot).await,
            None => self.finalize_forgotten(id).await,
        }
    }

    /// Begins, prepares and finalizes a transaction over `participants`.
    pub async fn execute(
        &self,
        participants: Vec<ParticipantRef>,
    ) -> Result<(TransactionId, FinalizeStatus), CoordinatorError> {
        let id = self.begin(participants).await?;
        self.prepare(&id).await?;
        let status = self.finalize(&id).await?;
        Ok((id, status))
    }

    /// Answers the termination protocol from the decision log alone.
    pub async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, CoordinatorError> {
        let record = self.inner.decision_log.read(id).await?;
        Ok(TransactionStatus::from(record.map(|record| record.decision)))
    }

    /// The current phase of a transaction held by this coordinator. Transactions are released
    /// once done; their outcome is then only in the decision log.
    pub fn state(&self, id: &TransactionId) -> Result<TransactionState, CoordinatorError> {
        self.inner
            .phases()?
            .get(id)
            .copied()
            .ok_or_else(|| CoordinatorError::UnknownTransaction(id.clone()))
    }

    /// Subscribes to alarms raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Alarm> {
        self.inner.alarms.subscribe()
    }

    /// Stops all retries in progress. Transactions left without acknowledgment stay incomplete in
    /// the log and are picked up by recovery.
    pub fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.inner.shutdown.cancel();
    }

    pub(crate) fn decision_log(&self) -> &Arc<dyn DecisionLog> {
        &self.inner.decision_log
    }

    /// Takes over a transaction from its durable record and finalizes it. A transaction this
    /// coordinator already holds keeps its in-memory context.
    pub(crate) async fn resume(
        &self,
        record: DecisionRecord,
    ) -> Result<FinalizeStatus, CoordinatorError> {
        let id = record.transaction_id.clone();
        let context = TransactionContext::from_record(&record, self.inner.time_source.now())
            .map_err(CoordinatorError::InvalidParticipantSet)?;
        let state = context.state();

        let slot = self
            .inner
            .transactions
            .get_or_insert_with(id.clone(), || context);
        self.inner.phases()?.entry(id.clone()).or_insert(state);

        self.finalize_slot(&id, slot).await
    }

    async fn finalize_slot(
        &self,
        id: &TransactionId,
        slot: Slot<TransactionContext>,
    ) -> Result<FinalizeStatus, CoordinatorError> {
        let inner = &self.inner;
        let started = Instant::now();
        let deadline = started + inner.finalize_deadline;

        let mut context = match tokio::time::timeout_at(deadline, slot.lock_owned()).await {
            Ok(context) => context,
            // Someone else holds the transaction, usually a delivery still running in the
            // background.
            Err(_) => return self.busy(id, started).await,
        };

        let mut record = None;
        for action in inner
            .algorithm
            .event(CoordinatorEvent::Finalize, context.clone())?
        {
            match action {
                CoordinatorAction::Update(updated) => inner.update(&mut context, updated)?,
                CoordinatorAction::AppendDecision(r) => record = Some(r),
                CoordinatorAction::Notify(CoordinatorActionNotification::Done(decision)) => {
                    return Ok(FinalizeStatus::Done(decision))
                }
                other => return Err(unexpected(id, other)),
            }
        }
        let record = record.ok_or_else(|| {
            CoordinatorError::Internal(format!("no decision record produced for {}", id))
        })?;
        let decision = record.decision;

        inner.append_decision(record).await?;
        debug!("Transaction {}: decision {} is durable", id, decision);

        let actions = inner
            .algorithm
            .event(CoordinatorEvent::DecisionLogged, context.clone())?;

        let task_inner = inner.clone();
        let mut delivery = tokio::spawn(async move {
            let id = context.id().clone();
            let result = task_inner.run_phase_two(&mut context, actions).await;
            drop(context);
            match &result {
                Ok(_) => task_inner.release(&id),
                Err(err) => error!("Transaction {}: delivery stopped: {}", id, err),
            }
            result
        });

        match tokio::time::timeout_at(deadline, &mut delivery).await {
            Ok(Ok(result)) => result.map(FinalizeStatus::Done),
            Ok(Err(err)) => Err(CoordinatorError::Internal(format!(
                "delivery task for {} failed: {}",
                id, err
            ))),
            Err(_) => {
                inner.alarms.raise(Alarm::PendingTransaction {
                    transaction_id: id.clone(),
                    decision,
                    elapsed: started.elapsed(),
                });
                Ok(FinalizeStatus::Pending(decision))
            }
        }
    }

    // A transaction not held in memory was either finished and released or never began here.
    async fn finalize_forgotten(
        &self,
        id: &TransactionId,
    ) -> Result<FinalizeStatus, CoordinatorError> {
        let record = self
            .inner
            .decision_log
            .read(id)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownTransaction(id.clone()))?;

        if self.inner.decision_log.is_done(id).await? {
            return Ok(FinalizeStatus::Done(record.decision));
        }
        self.resume(record).await
    }

    async fn busy(
        &self,
        id: &TransactionId,
        started: Instant,
    ) -> Result<FinalizeStatus, CoordinatorError> {
        match self.inner.decision_log.read(id).await? {
            Some(record) => {
                self.inner.alarms.raise(Alarm::PendingTransaction {
                    transaction_id: id.clone(),
                    decision: record.decision,
                    elapsed: started.elapsed(),
                });
                Ok(FinalizeStatus::Pending(record.decision))
            }
            None => Err(CoordinatorError::InvalidState(
                InvalidStateError::with_message(format!(
                    "transaction {} is still being prepared",
                    id
                )),
            )),
        }
    }
}

impl Inner {
    // Drops a finished transaction from memory. Anyone still holding its slot only sees the
    // done state.
    fn release(&self, id: &TransactionId) {
        self.transactions.remove(id);
        match self.phases() {
            Ok(mut phases) => {
                phases.remove(id);
            }
            Err(err) => warn!("Unable to release transaction {}: {}", id, err),
        }
        debug!("Transaction {} released", id);
    }

    fn phases(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<TransactionId, TransactionState>>, CoordinatorError> {
        self.phases
            .lock()
            .map_err(|_| CoordinatorError::Internal("transaction phase table poisoned".into()))
    }

    fn set_phase(&self, id: &TransactionId, state: TransactionState) -> Result<(), CoordinatorError> {
        self.phases()?.insert(id.clone(), state);
        Ok(())
    }

    fn update(
        &self,
        current: &mut TransactionContext,
        updated: TransactionContext,
    ) -> Result<(), CoordinatorError> {
        if current.state() != updated.state() {
            debug!(
                "Transaction {}: {:?} -> {:?}",
                updated.id(),
                current.state(),
                updated.state()
            );
        }
        self.set_phase(updated.id(), updated.state())?;
        *current = updated;
        Ok(())
    }

    fn client(&self, participant: &ParticipantRef) -> Result<ParticipantClient, ParticipantError> {
        let link = self.connector.connect(participant)?;
        Ok(ParticipantClient::new(
            participant.clone(),
            link,
            self.call_timeout,
            self.time_source.clone(),
        ))
    }

    async fn request_vote(
        &self,
        id: &TransactionId,
        participant: ParticipantRef,
        payload: Vec<u8>,
    ) -> (ParticipantId, Result<Vote, RetryError<ParticipantError>>) {
        let result = {
            let participant = &participant;
            let payload = &payload;
            self.scheduler
                .run(&self.prepare_retry, &self.shutdown, |_| async move {
                    match self.client(participant) {
                        Ok(client) => client.prepare(id, payload).await,
                        Err(err) => Err(err),
                    }
                })
                .await
        };
        (participant.id, result)
    }

    fn vote_event(
        &self,
        id: &TransactionId,
        participant_id: ParticipantId,
        result: Result<Vote, RetryError<ParticipantError>>,
    ) -> CoordinatorEvent {
        match result {
            Ok(vote) => CoordinatorEvent::Vote(vote),
            Err(err) => {
                if let RetryError::Fatal {
                    error: ParticipantError::Rejected(message),
                    ..
                } = &err
                {
                    self.alarms.raise(Alarm::ProtocolViolation {
                        transaction_id: id.clone(),
                        participant_id: participant_id.clone(),
                        message: message.clone(),
                    });
                }
                CoordinatorEvent::VoteFailed(participant_id, err.to_string())
            }
        }
    }

    async fn deliver_until_acknowledged(
        &self,
        id: &TransactionId,
        participant: ParticipantRef,
        decision: Decision,
    ) -> (ParticipantId, Result<Acknowledgment, RetryError<ParticipantError>>) {
        let result = {
            let participant = &participant;
            self.scheduler
                .run_reporting(
                    &self.delivery_retry,
                    &self.shutdown,
                    |_| async move {
                        match self.client(participant) {
                            Ok(client) => client.deliver(id, decision).await,
                            Err(err) => Err(err),
                        }
                    },
                    |stall: &RetryStall| {
                        self.alarms.raise(Alarm::DeliveryStalled {
                            transaction_id: id.clone(),
                            participant_id: participant.id.clone(),
                            attempts: stall.attempts,
                            last_error: stall.last_error.clone(),
                        })
                    },
                )
                .await
        };
        (participant.id, result)
    }

    // Appends the decision record unless an identical one is already durable.
    async fn append_decision(&self, record: DecisionRecord) -> Result<(), CoordinatorError> {
        let id = record.transaction_id.clone();

        if let Some(existing) = self.decision_log.read(&id).await? {
            return self.check_existing(&existing, &record);
        }

        let result = self
            .scheduler
            .run(&self.log_retry, &CancellationToken::new(), |_| {
                self.decision_log.append(record.clone())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            // An earlier attempt may have been written even though it reported failure.
            Err(RetryError::Fatal {
                error: DecisionLogError::DuplicateDecision(_),
                ..
            }) => match self.decision_log.read(&id).await? {
                Some(existing) => self.check_existing(&existing, &record),
                None => Err(CoordinatorError::Internal(format!(
                    "decision log reported a duplicate for {} but holds no record",
                    id
                ))),
            },
            Err(err) => Err(self.log_write_failed(&id, err)),
        }
    }

    fn check_existing(
        &self,
        existing: &DecisionRecord,
        record: &DecisionRecord,
    ) -> Result<(), CoordinatorError> {
        if existing.agrees_with(record) {
            return Ok(());
        }
        self.alarms.raise(Alarm::DuplicateDecision {
            transaction_id: record.transaction_id.clone(),
        });
        Err(CoordinatorError::DuplicateDecision(
            record.transaction_id.clone(),
        ))
    }

    async fn mark_done(&self, id: &TransactionId) -> Result<(), CoordinatorError> {
        self.scheduler
            .run(&self.log_retry, &CancellationToken::new(), |_| {
                self.decision_log.mark_done(id)
            })
            .await
            .map_err(|err| self.log_write_failed(id, err))
    }

    fn log_write_failed(
        &self,
        id: &TransactionId,
        err: RetryError<DecisionLogError>,
    ) -> CoordinatorError {
        let message = err.to_string();
        self.alarms.raise(Alarm::LogWriteFailed {
            transaction_id: id.clone(),
            message: message.clone(),
        });
        CoordinatorError::LogWrite(
            err.into_inner()
                .unwrap_or(DecisionLogError::Write(message)),
        )
    }

    // Delivers the decision to every participant the algorithm names and feeds their
    // acknowledgments back until the transaction is done.
    async fn run_phase_two(
        &self,
        context: &mut TransactionContext,
        mut actions: Vec<CoordinatorAction>,
    ) -> Result<Decision, CoordinatorError> {
        let id = context.id().clone();
        let mut deliveries = FuturesUnordered::new();
        let mut violation = None;

        loop {
            for action in actions {
                match action {
                    CoordinatorAction::Update(updated) => self.update(context, updated)?,
                    CoordinatorAction::SendDecision(participant, decision) => {
                        deliveries.push(self.deliver_until_acknowledged(&id, participant, decision))
                    }
                    CoordinatorAction::MarkDone => self.mark_done(&id).await?,
                    CoordinatorAction::Notify(CoordinatorActionNotification::Done(decision)) => {
                        info!("Transaction {} done: {}", id, decision);
                        return Ok(decision);
                    }
                    CoordinatorAction::Notify(CoordinatorActionNotification::MessageDropped(
                        reason,
                    )) => debug!("Transaction {}: dropped acknowledgment: {}", id, reason),
                    other => return Err(unexpected(&id, other)),
                }
            }

            let (participant_id, result) = match deliveries.next().await {
                Some(next) => next,
                None => break,
            };

            actions = match result {
                Ok(ack) => self
                    .algorithm
                    .event(CoordinatorEvent::Ack(ack), context.clone())?,
                Err(RetryError::Fatal {
                    error: ParticipantError::Rejected(message),
                    ..
                }) => {
                    self.alarms.raise(Alarm::ProtocolViolation {
                        transaction_id: id.clone(),
                        participant_id: participant_id.clone(),
                        message: message.clone(),
                    });
                    violation = Some(CoordinatorError::ProtocolViolation {
                        transaction_id: id.clone(),
                        participant_id,
                        message,
                    });
                    Vec::new()
                }
                Err(err) => {
                    return Err(CoordinatorError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "delivery of transaction {} to {} stopped: {}",
                            id, participant_id, err
                        )),
                    ))
                }
            };
        }

        Err(violation.unwrap_or_else(|| {
            CoordinatorError::Internal(format!(
                "phase two of transaction {} ended without every acknowledgment",
                id
            ))
        }))
    }
}

fn unexpected(id: &TransactionId, action: CoordinatorAction) -> CoordinatorError {
    CoordinatorError::Internal(format!(
        "transaction {}: unexpected action {:?}",
        id, action
    ))
}

#[async_trait]
impl CoordinatorLink for Coordinator {
    async fn get_status(&self, id: &TransactionId) -> Result<TransactionStatus, CoordinatorError> {
        Coordinator::get_status(self, id).await
    }
}
