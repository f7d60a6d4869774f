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

use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::error::{AlgorithmError, InvalidStateError};
use crate::time::TimeSource;
use crate::transaction::{TransactionStatus, VoteValue};

use super::ParticipantAction;
use super::ParticipantActionNotification;
use super::ParticipantContext;
use super::ParticipantEvent;
use super::ParticipantState;
use super::Response;

const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ParticipantAlgorithm<TS>
where
    TS: TimeSource,
{
    time_source: TS,
    decision_timeout: Duration,
}

impl<TS> ParticipantAlgorithm<TS>
where
    TS: TimeSource,
{
    pub fn new(time_source: TS) -> Self {
        ParticipantAlgorithm {
            time_source,
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
        }
    }

    pub fn with_decision_timeout(mut self, decision_timeout: Duration) -> Self {
        self.decision_timeout = decision_timeout;
        self
    }

    // Create actions to apply a decision learned while in doubt, either delivered by the
    // coordinator or learned through the termination protocol.
    fn push_apply_actions(
        &self,
        mut context: ParticipantContext,
        commit: bool,
        actions: &mut Vec<ParticipantAction>,
    ) {
        if commit {
            context.set_state(ParticipantState::Commit);
            actions.push(ParticipantAction::Update(context));
            actions.push(ParticipantAction::Notify(
                ParticipantActionNotification::Commit,
            ));
        } else {
            context.set_state(ParticipantState::Abort);
            actions.push(ParticipantAction::Update(context));
            actions.push(ParticipantAction::Notify(ParticipantActionNotification::Abort));
        }
    }
}

fn respond(response: Response) -> Vec<ParticipantAction> {
    vec![ParticipantAction::Respond(response)]
}

impl<TS> Algorithm for ParticipantAlgorithm<TS>
where
    TS: TimeSource,
{
    type Event = ParticipantEvent;
    type Action = ParticipantAction;
    type Context = ParticipantContext;

    fn event(
        &self,
        event: Self::Event,
        mut context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        match event {
            ParticipantEvent::Alarm => match context.state().clone() {
                // A decision timeout has occurred, which means we have not received a decision
                // within the decision timeout. Ask the coordinator and restart the timeout.
                ParticipantState::Voted {
                    decision_timeout_start,
                } => {
                    let now = self.time_source.now();

                    // If the timeout has not yet passed we shouldn't have been woken up; ignore
                    // the alarm and wait for the next one.
                    if now < decision_timeout_start + self.decision_timeout {
                        return Ok(vec![]);
                    }

                    context.set_state(ParticipantState::Voted {
                        decision_timeout_start: now,
                    });

                    Ok(vec![
                        ParticipantAction::Update(context),
                        ParticipantAction::QueryCoordinator,
                    ])
                }

                // Only a participant in doubt waits on a decision timeout; an alarm in any other
                // state indicates a bug in the caller.
                state => Err(AlgorithmError::InvalidState(
                    InvalidStateError::with_message(format!(
                        "Alarm unexpected in {:?} state",
                        state
                    )),
                )),
            },

            // The coordinator requests a vote. A repeated request is answered with the vote that
            // was already given.
            ParticipantEvent::Prepare(payload) => match context.state() {
                ParticipantState::WaitingForVoteRequest => {
                    context.set_state(ParticipantState::WaitingForVote);
                    Ok(vec![
                        ParticipantAction::Update(context),
                        ParticipantAction::Notify(ParticipantActionNotification::RequestForVote(
                            payload,
                        )),
                    ])
                }
                ParticipantState::WaitingForVote => Ok(vec![ParticipantAction::Notify(
                    ParticipantActionNotification::MessageDropped(
                        "vote is already being computed".into(),
                    ),
                )]),
                ParticipantState::Voted { .. } | ParticipantState::Commit => {
                    Ok(respond(Response::Vote(VoteValue::Yes)))
                }
                ParticipantState::Abort => Ok(respond(Response::Vote(VoteValue::No))),
            },

            // In response to a RequestForVote, a Vote contains the local answer.
            ParticipantEvent::Vote(vote) => {
                if !matches!(context.state(), ParticipantState::WaitingForVote) {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(
                            "Vote event when not in WaitingForVote state".into(),
                        ),
                    ));
                }

                let mut actions = Vec::new();

                match vote {
                    VoteValue::Yes => {
                        context.set_state(ParticipantState::Voted {
                            decision_timeout_start: self.time_source.now(),
                        });
                        actions.push(ParticipantAction::Update(context));
                    }
                    // A no vote is a unilateral abort; the coordinator can only decide abort.
                    VoteValue::No => self.push_apply_actions(context, false, &mut actions),
                }

                actions.push(ParticipantAction::Respond(Response::Vote(vote)));

                Ok(actions)
            }

            ParticipantEvent::Commit => match context.state() {
                ParticipantState::Voted { .. } => {
                    let mut actions = Vec::new();
                    self.push_apply_actions(context, true, &mut actions);
                    actions.push(ParticipantAction::Respond(Response::Ack));
                    Ok(actions)
                }
                ParticipantState::Commit => Ok(respond(Response::Ack)),
                ParticipantState::Abort => Ok(respond(Response::Rejected(format!(
                    "transaction {} was already aborted",
                    context.transaction_id()
                )))),
                ParticipantState::WaitingForVoteRequest | ParticipantState::WaitingForVote => {
                    Ok(respond(Response::Rejected(format!(
                        "commit received for transaction {} without a yes vote",
                        context.transaction_id()
                    ))))
                }
            },

            // An abort may arrive before a vote was ever given, for example when the prepare
            // request never reached us.
            ParticipantEvent::Abort => match context.state() {
                ParticipantState::Voted { .. }
                | ParticipantState::WaitingForVoteRequest
                | ParticipantState::WaitingForVote => {
                    let mut actions = Vec::new();
                    self.push_apply_actions(context, false, &mut actions);
                    actions.push(ParticipantAction::Respond(Response::Ack));
                    Ok(actions)
                }
                ParticipantState::Abort => Ok(respond(Response::Ack)),
                ParticipantState::Commit => Ok(respond(Response::Rejected(format!(
                    "transaction {} was already committed",
                    context.transaction_id()
                )))),
            },

            ParticipantEvent::Status(status) => {
                if !context.in_doubt() {
                    return Ok(vec![ParticipantAction::Notify(
                        ParticipantActionNotification::MessageDropped(
                            "decision already known".into(),
                        ),
                    )]);
                }

                let mut actions = Vec::new();
                match status {
                    TransactionStatus::Commit => {
                        self.push_apply_actions(context, true, &mut actions)
                    }
                    TransactionStatus::Abort => {
                        self.push_apply_actions(context, false, &mut actions)
                    }
                    // The coordinator has not decided yet; keep waiting.
                    TransactionStatus::Unknown => (),
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

    use super::*;

    fn algorithm(clock: &ManualTimeSource) -> ParticipantAlgorithm<ManualTimeSource> {
        ParticipantAlgorithm::new(clock.clone()).with_decision_timeout(Duration::from_secs(10))
    }

    fn apply(
        algorithm: &ParticipantAlgorithm<ManualTimeSource>,
        event: ParticipantEvent,
        context: ParticipantContext,
    ) -> (Vec<ParticipantAction>, ParticipantContext) {
        let actions = algorithm
            .event(event, context.clone())
            .expect("event accepted");
        let updated = actions
            .iter()
            .filter_map(|action| match action {
                ParticipantAction::Update(context) => Some(context.clone()),
                _ => None,
            })
            .last()
            .unwrap_or(context);
        (actions, updated)
    }

    fn voted_yes(
        algorithm: &ParticipantAlgorithm<ManualTimeSource>,
    ) -> ParticipantContext {
        let context = ParticipantContext::new("tx".into());
        let (_, context) = apply(algorithm, ParticipantEvent::Prepare(vec![]), context);
        let (_, context) = apply(algorithm, ParticipantEvent::Vote(VoteValue::Yes), context);
        context
    }

    #[test]
    fn prepare_requests_a_vote() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);

        let (actions, context) = apply(
            &algorithm,
            ParticipantEvent::Prepare(vec![7]),
            ParticipantContext::new("tx".into()),
        );

        assert_eq!(context.state(), &ParticipantState::WaitingForVote);
        assert!(actions.iter().any(|a| matches!(
            a,
            ParticipantAction::Notify(ParticipantActionNotification::RequestForVote(p)) if p == &vec![7]
        )));
    }

    #[test]
    fn repeated_prepare_returns_the_same_vote() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);
        let context = voted_yes(&algorithm);

        let (actions, _) = apply(&algorithm, ParticipantEvent::Prepare(vec![]), context);
        assert!(matches!(
            actions.as_slice(),
            [ParticipantAction::Respond(Response::Vote(VoteValue::Yes))]
        ));
    }

    #[test]
    fn no_vote_aborts_locally() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);
        let context = ParticipantContext::new("tx".into());
        let (_, context) = apply(&algorithm, ParticipantEvent::Prepare(vec![]), context);

        let (actions, context) = apply(&algorithm, ParticipantEvent::Vote(VoteValue::No), context);
        assert_eq!(context.state(), &ParticipantState::Abort);
        assert!(actions.iter().any(|a| matches!(
            a,
            ParticipantAction::Notify(ParticipantActionNotification::Abort)
        )));

        // Abort from the coordinator is acknowledged without being applied twice.
        let (actions, _) = apply(&algorithm, ParticipantEvent::Abort, context.clone());
        assert!(matches!(
            actions.as_slice(),
            [ParticipantAction::Respond(Response::Ack)]
        ));

        // Commit is refused.
        let (actions, _) = apply(&algorithm, ParticipantEvent::Commit, context);
        assert!(matches!(
            actions.as_slice(),
            [ParticipantAction::Respond(Response::Rejected(_))]
        ));
    }

    #[test]
    fn commit_is_applied_once() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);
        let context = voted_yes(&algorithm);

        let (actions, context) = apply(&algorithm, ParticipantEvent::Commit, context);
        assert_eq!(context.state(), &ParticipantState::Commit);
        assert_eq!(
            actions
                .iter()
                .filter(|a| matches!(
                    a,
                    ParticipantAction::Notify(ParticipantActionNotification::Commit)
                ))
                .count(),
            1
        );

        let (actions, _) = apply(&algorithm, ParticipantEvent::Commit, context);
        assert!(matches!(
            actions.as_slice(),
            [ParticipantAction::Respond(Response::Ack)]
        ));
    }

    #[test]
    fn commit_without_yes_vote_is_rejected() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);

        let (actions, context) = apply(
            &algorithm,
            ParticipantEvent::Commit,
            ParticipantContext::new("tx".into()),
        );
        assert_eq!(context.state(), &ParticipantState::WaitingForVoteRequest);
        assert!(matches!(
            actions.as_slice(),
            [ParticipantAction::Respond(Response::Rejected(_))]
        ));
    }

    #[test]
    fn alarm_queries_coordinator_after_timeout() {
        let clock = ManualTimeSource::new(SystemTime::UNIX_EPOCH);
        let algorithm = algorithm(&clock);
        let context = voted_yes(&algorithm);

        let (actions, context) = apply(&algorithm, ParticipantEvent::Alarm, context);
        assert!(actions.is_empty());

        clock.advance(Duration::from_secs(11));
        let (actions, context) = apply(&algorithm, ParticipantEvent::Alarm, context);
        assert!(actions
            .iter()
            .any(|a| matches!(a, ParticipantAction::QueryCoordinator)));

        // Unknown leaves the participant in doubt; a decision resolves it.
        let (_, context) = apply(
            &algorithm,
            ParticipantEvent::Status(TransactionStatus::Unknown),
            context,
        );
        assert!(context.in_doubt());

        let (_, context) = apply(
            &algorithm,
            ParticipantEvent::Status(TransactionStatus::Commit),
            context,
        );
        assert_eq!(context.status(), TransactionStatus::Commit);
    }

    #[test]
    fn alarm_outside_doubt_is_an_error() {
        let clock = ManualTimeSource::default();
        let algorithm = algorithm(&clock);

        assert!(algorithm
            .event(ParticipantEvent::Alarm, ParticipantContext::new("tx".into()))
            .is_err());
    }
}
