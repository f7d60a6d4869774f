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

//! Contains ParticipantError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

/// The ways a call to a participant can fail.
///
/// Voting no is not a failure; it is returned as a vote.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParticipantError {
    /// The participant could not be reached, or did not answer within the call timeout.
    Unreachable(String),

    /// The participant refused the request, for example because it already applied a different
    /// outcome. This is a protocol violation and is never retried.
    Rejected(String),
}

impl Error for ParticipantError {}

impl Display for ParticipantError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            ParticipantError::Unreachable(msg) => write!(f, "participant unreachable: {}", msg),
            ParticipantError::Rejected(msg) => write!(f, "participant rejected request: {}", msg),
        }
    }
}
