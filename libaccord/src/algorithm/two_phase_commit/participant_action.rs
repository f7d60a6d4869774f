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

use crate::transaction::VoteValue;

use super::ParticipantContext;

#[derive(Debug)]
pub enum ParticipantAction {
    Notify(ParticipantActionNotification),
    /// Ask the coordinator for its recorded decision.
    QueryCoordinator,
    /// Answer the request which produced the event.
    Respond(Response),
    Update(ParticipantContext),
}

#[derive(Debug, PartialEq)]
pub enum ParticipantActionNotification {
    /// Apply the abort to local resources.
    Abort,
    /// Apply the commit to local resources.
    Commit,
    MessageDropped(String),
    RequestForVote(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Ack,
    Rejected(String),
    Vote(VoteValue),
}
