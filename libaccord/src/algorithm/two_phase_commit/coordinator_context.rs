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

use std::collections::HashSet;
use std::time::SystemTime;

use crate::error::InvalidArgumentError;
use crate::transaction::{
    Decision, DecisionRecord, ParticipantId, ParticipantRef, TransactionId, VoteValue,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub reference: ParticipantRef,
    pub payload: Vec<u8>,
    pub vote: Option<VoteValue>,
    pub acknowledged: bool,
}

impl Participant {
    fn new(reference: ParticipantRef, payload: Vec<u8>) -> Participant {
        Participant {
            reference,
            payload,
            vote: None,
            acknowledged: false,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.reference.id
    }
}

/// The phases of a transaction, from the coordinator's point of view.
///
/// Transitions only move forward: `Init`, `Preparing`, `Decided`, `Finalizing`, `Done`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionState {
    Init,
    Preparing,
    Decided(Decision),
    Finalizing(Decision),
    Done(Decision),
}

impl TransactionState {
    pub fn decision(&self) -> Option<Decision> {
        match self {
            TransactionState::Init | TransactionState::Preparing => None,
            TransactionState::Decided(d)
            | TransactionState::Finalizing(d)
            | TransactionState::Done(d) => Some(*d),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransactionContext {
    id: TransactionId,
    participants: Vec<Participant>,
    state: TransactionState,
    created_at: SystemTime,
}

impl TransactionContext {
    /// Creates the context of a new transaction in the `Init` state.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgumentError`] if no participants are given or if two participants
    /// share an id.
    pub fn new(
        id: TransactionId,
        participants: Vec<(ParticipantRef, Vec<u8>)>,
        created_at: SystemTime,
    ) -> Result<Self, InvalidArgumentError> {
        if participants.is_empty() {
            return Err(InvalidArgumentError::new(
                "participants".to_string(),
                "at least one participant is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (reference, _) in &participants {
            if !seen.insert(&reference.id) {
                return Err(InvalidArgumentError::new(
                    "participants".to_string(),
                    format!("participant {} appears more than once", reference.id),
                ));
            }
        }

        Ok(TransactionContext {
            id,
            participants: participants
                .into_iter()
                .map(|(reference, payload)| Participant::new(reference, payload))
                .collect(),
            state: TransactionState::Init,
            created_at,
        })
    }

    /// Rebuilds the context of a transaction whose decision is already durable, ready to
    /// finalize.
    ///
    /// A logged commit implies every participant voted yes; for a logged abort the votes are not
    /// known and are left unset.
    pub fn from_record(
        record: &DecisionRecord,
        created_at: SystemTime,
    ) -> Result<Self, InvalidArgumentError> {
        let mut context = TransactionContext::new(
            record.transaction_id.clone(),
            record
                .participants
                .iter()
                .cloned()
                .map(|reference| (reference, Vec::new()))
                .collect(),
            created_at,
        )?;

        if record.decision == Decision::Commit {
            for participant in context.participants.iter_mut() {
                participant.vote = Some(VoteValue::Yes);
            }
        }
        context.state = TransactionState::Finalizing(record.decision);

        Ok(context)
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub(super) fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id() == id)
    }

    pub(super) fn reset_votes(&mut self) {
        for participant in self.participants.iter_mut() {
            participant.vote = None;
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub(super) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    pub fn decision_record(&self, decision: Decision, written_at: SystemTime) -> DecisionRecord {
        DecisionRecord {
            transaction_id: self.id.clone(),
            decision,
            participants: self
                .participants
                .iter()
                .map(|p| p.reference.clone())
                .collect(),
            written_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<(ParticipantRef, Vec<u8>)> {
        ids.iter()
            .map(|id| (ParticipantRef::new(*id, format!("mem://{}", id)), Vec::new()))
            .collect()
    }

    #[test]
    fn empty_participant_set_is_rejected() {
        assert!(TransactionContext::new("tx".into(), vec![], SystemTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn duplicate_participants_are_rejected() {
        assert!(TransactionContext::new(
            "tx".into(),
            refs(&["p1", "p2", "p1"]),
            SystemTime::UNIX_EPOCH
        )
        .is_err());
    }

    #[test]
    fn new_context_starts_in_init() -> Result<(), Box<dyn std::error::Error>> {
        let context =
            TransactionContext::new("tx".into(), refs(&["p1", "p2"]), SystemTime::UNIX_EPOCH)?;

        assert_eq!(context.state(), TransactionState::Init);
        assert_eq!(context.state().decision(), None);
        assert_eq!(context.participants().len(), 2);
        assert!(context.participants().iter().all(|p| p.vote.is_none()));

        Ok(())
    }

    #[test]
    fn context_from_commit_record() -> Result<(), Box<dyn std::error::Error>> {
        let record = DecisionRecord {
            transaction_id: "tx".into(),
            decision: Decision::Commit,
            participants: refs(&["p1", "p2"]).into_iter().map(|(r, _)| r).collect(),
            written_at: SystemTime::UNIX_EPOCH,
        };

        let context = TransactionContext::from_record(&record, SystemTime::UNIX_EPOCH)?;

        assert_eq!(
            context.state(),
            TransactionState::Finalizing(Decision::Commit)
        );
        assert!(context
            .participants()
            .iter()
            .all(|p| p.vote == Some(VoteValue::Yes) && !p.acknowledged));

        let rewritten = context.decision_record(Decision::Commit, SystemTime::now());
        assert!(rewritten.agrees_with(&record));

        Ok(())
    }
}
