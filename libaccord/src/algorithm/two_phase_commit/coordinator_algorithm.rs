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

use crate::algorithm::Algorithm;
use crate::error::{AlgorithmError, InvalidStateError};
use crate::time::TimeSource;
use crate::transaction::{Decision, VoteValue};

use super::CoordinatorAction;
use super::CoordinatorActionNotification;
use super::CoordinatorEvent;
use super::TransactionContext;
use super::TransactionState;

pub struct CoordinatorAlgorithm<TS>
where
    TS: TimeSource,
{
    time_source: TS,
}

impl<TS> CoordinatorAlgorithm<TS>
where
    TS: TimeSource,
{
    pub fn new(time_source: TS) -> Self {
        CoordinatorAlgorithm { time_source }
    }

    // Create actions for a decision. A decision is reached when:
    //
    // - All participants have voted yes (commit)
    // - Any participant voted no, or could not vote at all (abort)
    fn push_decision_actions(
        &self,
        mut context: TransactionContext,
        decision: Decision,
        actions: &mut Vec<CoordinatorAction>,
    ) {
        context.set_state(TransactionState::Decided(decision));
        actions.push(CoordinatorAction::Update(context));
        actions.push(CoordinatorAction::Notify(
            CoordinatorActionNotification::Decided(decision),
        ));
    }

    // Create actions for completion, once every participant has acknowledged the decision.
    fn push_done_actions(
        &self,
        mut context: TransactionContext,
        decision: Decision,
        actions: &mut Vec<CoordinatorAction>,
    ) {
        // The acknowledgments are kept while still Finalizing, so a failed MarkDone is retried
        // by the next Finalize without delivering the decision again.
        actions.push(CoordinatorAction::Update(context.clone()));
        actions.push(CoordinatorAction::MarkDone);
        context.set_state(TransactionState::Done(decision));
        actions.push(CoordinatorAction::Update(context));
        actions.push(CoordinatorAction::Notify(
            CoordinatorActionNotification::Done(decision),
        ));
    }
}

fn dropped(reason: &str) -> Vec<CoordinatorAction> {
    vec![CoordinatorAction::Notify(
        CoordinatorActionNotification::MessageDropped(reason.into()),
    )]
}

impl<TS> Algorithm for CoordinatorAlgorithm<TS>
where
    TS: TimeSource,
{
    type Event = CoordinatorEvent;
    type Action = CoordinatorAction;
    type Context = TransactionContext;

    fn event(
        &self,
        event: Self::Event,
        mut context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        match event {
            // Phase one begins with a prepare request to every participant.
            //
            // Steps:
            //   - Clear any votes left over from an interrupted attempt
            //   - Update the state to Preparing
            //   - Send a prepare request to each participant
            CoordinatorEvent::Prepare => match context.state() {
                TransactionState::Init | TransactionState::Preparing => {
                    context.reset_votes();
                    context.set_state(TransactionState::Preparing);

                    let mut actions = vec![CoordinatorAction::Update(context.clone())];
                    for participant in context.participants() {
                        actions.push(CoordinatorAction::SendPrepare(
                            participant.reference.clone(),
                            participant.payload.clone(),
                        ));
                    }

                    Ok(actions)
                }

                // Already decided; report the existing decision and send nothing.
                TransactionState::Decided(decision)
                | TransactionState::Finalizing(decision)
                | TransactionState::Done(decision) => Ok(vec![CoordinatorAction::Notify(
                    CoordinatorActionNotification::Decided(decision),
                )]),
            },

            // A participant answered our prepare request; record the vote and possibly decide.
            CoordinatorEvent::Vote(vote) => {
                if vote.transaction_id != *context.id() {
                    return Ok(dropped("vote is for a different transaction"));
                }

                // Votes which arrive after a decision was reached are ignored. This happens
                // under normal operation when a straggler answers after an early abort.
                if context.state() != TransactionState::Preparing {
                    return Ok(dropped("context state is not Preparing"));
                }

                let participant = match context.participant_mut(&vote.participant_id) {
                    Some(participant) => participant,
                    None => return Ok(dropped("sender is not a participant")),
                };

                if participant.vote.is_some() {
                    return Ok(dropped("participant has already voted"));
                }

                participant.vote = Some(vote.value);

                let mut actions = Vec::new();
                match vote.value {
                    VoteValue::No => {
                        self.push_decision_actions(context, Decision::Abort, &mut actions)
                    }
                    VoteValue::Yes => {
                        if context
                            .participants()
                            .iter()
                            .all(|p| p.vote == Some(VoteValue::Yes))
                        {
                            self.push_decision_actions(context, Decision::Commit, &mut actions)
                        } else {
                            actions.push(CoordinatorAction::Update(context));
                        }
                    }
                }

                Ok(actions)
            }

            // A participant in doubt is treated as a no vote.
            CoordinatorEvent::VoteFailed(participant_id, reason) => {
                if context.state() != TransactionState::Preparing {
                    return Ok(dropped("context state is not Preparing"));
                }

                match context.participant_mut(&participant_id) {
                    Some(participant) if participant.vote.is_some() => {
                        return Ok(dropped("participant has already voted"));
                    }
                    Some(_) => (),
                    None => return Ok(dropped("sender is not a participant")),
                }

                debug!(
                    "Transaction {}: participant {} failed to vote: {}",
                    context.id(),
                    participant_id,
                    reason
                );

                let mut actions = Vec::new();
                self.push_decision_actions(context, Decision::Abort, &mut actions);
                Ok(actions)
            }

            // Phase two begins by making the decision durable. Nothing may be sent to a
            // participant until the caller reports back with `DecisionLogged`.
            CoordinatorEvent::Finalize => match context.state() {
                TransactionState::Init | TransactionState::Preparing => {
                    Err(AlgorithmError::InvalidState(InvalidStateError::with_message(
                        format!(
                            "cannot finalize transaction {} before a decision is reached",
                            context.id()
                        ),
                    )))
                }

                // Finalizing is accepted again so an interrupted or recovered transaction can
                // resume; the caller must skip an append whose record is already durable.
                TransactionState::Decided(decision) | TransactionState::Finalizing(decision) => {
                    context.set_state(TransactionState::Finalizing(decision));
                    let record = context.decision_record(decision, self.time_source.now());

                    Ok(vec![
                        CoordinatorAction::Update(context),
                        CoordinatorAction::AppendDecision(record),
                    ])
                }

                TransactionState::Done(decision) => Ok(vec![CoordinatorAction::Notify(
                    CoordinatorActionNotification::Done(decision),
                )]),
            },

            // The decision is durable; deliver it to every participant which has not yet
            // acknowledged it.
            CoordinatorEvent::DecisionLogged => match context.state() {
                TransactionState::Finalizing(decision) => {
                    let mut actions = Vec::new();

                    for participant in context.participants().iter().filter(|p| !p.acknowledged)
                    {
                        if decision == Decision::Commit
                            && participant.vote != Some(VoteValue::Yes)
                        {
                            return Err(AlgorithmError::InvalidState(
                                InvalidStateError::with_message(format!(
                                    "participant {} did not vote yes in transaction {}",
                                    participant.id(),
                                    context.id()
                                )),
                            ));
                        }

                        actions.push(CoordinatorAction::SendDecision(
                            participant.reference.clone(),
                            decision,
                        ));
                    }

                    if actions.is_empty() {
                        self.push_done_actions(context, decision, &mut actions);
                    }

                    Ok(actions)
                }
                state => Err(AlgorithmError::InvalidState(
                    InvalidStateError::with_message(format!(
                        "decision logged for transaction {} in state {:?}",
                        context.id(),
                        state
                    )),
                )),
            },

            // A participant confirmed the decision; once all have, the transaction is done.
            CoordinatorEvent::Ack(ack) => {
                if ack.transaction_id != *context.id() {
                    return Ok(dropped("acknowledgment is for a different transaction"));
                }

                let decision = match context.state() {
                    TransactionState::Finalizing(decision) => decision,
                    _ => return Ok(dropped("context state is not Finalizing")),
                };

                if ack.phase != decision {
                    return Ok(dropped("acknowledgment is for a different decision"));
                }

                let participant = match context.participant_mut(&ack.participant_id) {
                    Some(participant) => participant,
                    None => return Ok(dropped("sender is not a participant")),
                };

                if participant.acknowledged {
                    return Ok(dropped("participant has already acknowledged"));
                }

                participant.acknowledged = true;

                let mut actions = Vec::new();
                if context.participants().iter().all(|p| p.acknowledged) {
                    self.push_done_actions(context, decision, &mut actions);
                } else {
                    actions.push(CoordinatorAction::Update(context));
                }

                Ok(actions)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use crate::time::ManualTimeSource;
    use crate::transaction::{Acknowledgment, ParticipantId, ParticipantRef, Vote};

    use super::*;

    fn context(ids: &[&str]) -> TransactionContext {
        TransactionContext::new(
            "tx".into(),
            ids.iter()
                .map(|id| (ParticipantRef::new(*id, format!("mem://{}", id)), vec![1]))
                .collect(),
            SystemTime::UNIX_EPOCH,
        )
        .expect("valid context")
    }

    fn vote(participant: &str, value: VoteValue) -> CoordinatorEvent {
        CoordinatorEvent::Vote(Vote {
            participant_id: participant.into(),
            transaction_id: "tx".into(),
            value,
        })
    }

    fn ack(participant: &str, phase: Decision) -> CoordinatorEvent {
        CoordinatorEvent::Ack(Acknowledgment {
            transaction_id: "tx".into(),
            participant_id: participant.into(),
            phase,
            received_at: SystemTime::UNIX_EPOCH,
        })
    }

    // Run the event and return the actions along with the last updated context.
    fn run(
        algorithm: &CoordinatorAlgorithm<ManualTimeSource>,
        event: CoordinatorEvent,
        context: TransactionContext,
    ) -> (Vec<CoordinatorAction>, TransactionContext) {
        let actions = algorithm
            .event(event, context.clone())
            .expect("event accepted");
        let updated = actions
            .iter()
            .filter_map(|action| match action {
                CoordinatorAction::Update(context) => Some(context.clone()),
                _ => None,
            })
            .last()
            .unwrap_or(context);
        (actions, updated)
    }

    fn prepared(
        algorithm: &CoordinatorAlgorithm<ManualTimeSource>,
        ids: &[&str],
    ) -> TransactionContext {
        run(algorithm, CoordinatorEvent::Prepare, context(ids)).1
    }

    #[test]
    fn prepare_sends_to_every_participant() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let (actions, updated) = run(&algorithm, CoordinatorEvent::Prepare, context(&["a", "b"]));

        assert_eq!(updated.state(), TransactionState::Preparing);
        let targets: Vec<ParticipantId> = actions
            .iter()
            .filter_map(|action| match action {
                CoordinatorAction::SendPrepare(p, payload) => {
                    assert_eq!(payload, &vec![1]);
                    Some(p.id.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            targets,
            vec![ParticipantId::from("a"), ParticipantId::from("b")]
        );
    }

    #[test]
    fn all_yes_decides_commit() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b"]);

        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        assert_eq!(ctx.state(), TransactionState::Preparing);

        let (actions, ctx) = run(&algorithm, vote("b", VoteValue::Yes), ctx);
        assert_eq!(ctx.state(), TransactionState::Decided(Decision::Commit));
        assert!(actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::Notify(CoordinatorActionNotification::Decided(Decision::Commit))
        )));
    }

    #[test]
    fn first_no_decides_abort_without_waiting() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b", "c"]);

        let (_, ctx) = run(&algorithm, vote("b", VoteValue::No), ctx);
        assert_eq!(ctx.state(), TransactionState::Decided(Decision::Abort));

        // A straggler's vote is dropped and does not change the decision.
        let (actions, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        assert_eq!(ctx.state(), TransactionState::Decided(Decision::Abort));
        assert!(matches!(
            actions.as_slice(),
            [CoordinatorAction::Notify(
                CoordinatorActionNotification::MessageDropped(_)
            )]
        ));
    }

    #[test]
    fn failed_vote_decides_abort() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b"]);

        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        let (_, ctx) = run(
            &algorithm,
            CoordinatorEvent::VoteFailed("b".into(), "unreachable".into()),
            ctx,
        );
        assert_eq!(ctx.state(), TransactionState::Decided(Decision::Abort));
    }

    #[test]
    fn votes_from_strangers_are_dropped() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a"]);

        let (actions, ctx) = run(&algorithm, vote("z", VoteValue::No), ctx);
        assert_eq!(ctx.state(), TransactionState::Preparing);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn prepare_after_decision_sends_nothing() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a"]);
        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);

        let (actions, _) = run(&algorithm, CoordinatorEvent::Prepare, ctx);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::SendPrepare(..))));
    }

    #[test]
    fn finalize_before_decision_is_an_error() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a"]);

        assert!(algorithm.event(CoordinatorEvent::Finalize, ctx).is_err());
    }

    #[test]
    fn decision_is_logged_before_it_is_sent() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b"]);
        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        let (_, ctx) = run(&algorithm, vote("b", VoteValue::Yes), ctx);

        let (actions, ctx) = run(&algorithm, CoordinatorEvent::Finalize, ctx);
        assert_eq!(ctx.state(), TransactionState::Finalizing(Decision::Commit));
        assert!(matches!(
            actions.as_slice(),
            [
                CoordinatorAction::Update(_),
                CoordinatorAction::AppendDecision(record),
            ] if record.decision == Decision::Commit && record.participants.len() == 2
        ));

        let (actions, _) = run(&algorithm, CoordinatorEvent::DecisionLogged, ctx);
        let sends = actions
            .iter()
            .filter(|a| matches!(a, CoordinatorAction::SendDecision(_, Decision::Commit)))
            .count();
        assert_eq!(sends, 2);
    }

    #[test]
    fn abort_is_sent_to_every_participant() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b", "c"]);
        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        let (_, ctx) = run(&algorithm, vote("b", VoteValue::No), ctx);
        let (_, ctx) = run(&algorithm, CoordinatorEvent::Finalize, ctx);

        let (actions, _) = run(&algorithm, CoordinatorEvent::DecisionLogged, ctx);
        let sends = actions
            .iter()
            .filter(|a| matches!(a, CoordinatorAction::SendDecision(_, Decision::Abort)))
            .count();
        assert_eq!(sends, 3);
    }

    #[test]
    fn acknowledgments_complete_the_transaction() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a", "b"]);
        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        let (_, ctx) = run(&algorithm, vote("b", VoteValue::Yes), ctx);
        let (_, ctx) = run(&algorithm, CoordinatorEvent::Finalize, ctx);
        let (_, ctx) = run(&algorithm, CoordinatorEvent::DecisionLogged, ctx);

        let (_, ctx) = run(&algorithm, ack("a", Decision::Commit), ctx);
        assert_eq!(ctx.state(), TransactionState::Finalizing(Decision::Commit));

        // A duplicate acknowledgment changes nothing.
        let (actions, ctx) = run(&algorithm, ack("a", Decision::Commit), ctx);
        assert_eq!(actions.len(), 1);

        let (actions, ctx) = run(&algorithm, ack("b", Decision::Commit), ctx);
        assert_eq!(ctx.state(), TransactionState::Done(Decision::Commit));
        assert!(actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::MarkDone)));
    }

    #[test]
    fn done_follows_the_durable_marker() {
        let algorithm = CoordinatorAlgorithm::new(ManualTimeSource::default());
        let ctx = prepared(&algorithm, &["a"]);
        let (_, ctx) = run(&algorithm, vote("a", VoteValue::Yes), ctx);
        let (_, ctx) = run(&algorithm, CoordinatorEvent::Finalize, ctx);
        let (_, ctx) = run(&algorithm, CoordinatorEvent::DecisionLogged, ctx);

        let actions = algorithm
            .event(ack("a", Decision::Commit), ctx)
            .expect("event accepted");
        let mark_done = actions
            .iter()
            .position(|a| matches!(a, CoordinatorAction::MarkDone))
            .expect("marker written");
        let (before, after) = actions.split_at(mark_done);
        assert!(!before.iter().any(|a| matches!(
            a,
            CoordinatorAction::Update(c) if c.state() == TransactionState::Done(Decision::Commit)
        )));
        assert!(after.iter().any(|a| matches!(
            a,
            CoordinatorAction::Update(c) if c.state() == TransactionState::Done(Decision::Commit)
        )));

        // The marker was lost: finalizing again writes it without resending the decision.
        let acknowledged = match &before[0] {
            CoordinatorAction::Update(c) => c.clone(),
            other => panic!("expected an update, got {:?}", other),
        };
        assert_eq!(
            acknowledged.state(),
            TransactionState::Finalizing(Decision::Commit)
        );
        let (_, ctx) = run(&algorithm, CoordinatorEvent::Finalize, acknowledged);
        let (actions, ctx) = run(&algorithm, CoordinatorEvent::DecisionLogged, ctx);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::SendDecision(..))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::MarkDone)));
        assert_eq!(ctx.state(), TransactionState::Done(Decision::Commit));
    }
}
