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

use crate::transaction::{TransactionStatus, VoteValue};

pub enum ParticipantEvent {
    /// The decision timeout may have expired.
    Alarm,
    /// The coordinator asked for a vote.
    Prepare(Vec<u8>),
    /// The local vote, in response to a `RequestForVote` notification.
    Vote(VoteValue),
    /// The coordinator delivered a commit decision.
    Commit,
    /// The coordinator delivered an abort decision.
    Abort,
    /// The coordinator answered a decision query made during the termination protocol.
    Status(TransactionStatus),
}
