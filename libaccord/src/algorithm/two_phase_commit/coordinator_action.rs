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

use crate::transaction::{Decision, DecisionRecord, ParticipantRef};

use super::TransactionContext;

#[derive(Debug)]
pub enum CoordinatorAction {
    /// Replace the stored context.
    Update(TransactionContext),
    SendPrepare(ParticipantRef, Vec<u8>),
    /// Durably append the record. No later action may be run until this one succeeds.
    AppendDecision(DecisionRecord),
    SendDecision(ParticipantRef, Decision),
    /// Record in the decision log that every participant has acknowledged.
    MarkDone,
    Notify(CoordinatorActionNotification),
}

#[derive(Debug, PartialEq)]
pub enum CoordinatorActionNotification {
    Decided(Decision),
    Done(Decision),
    MessageDropped(String),
}
