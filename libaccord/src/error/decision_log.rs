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

//! Contains DecisionLogError

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};

use crate::transaction::TransactionId;

#[derive(Debug)]
pub enum DecisionLogError {
    /// The storage medium failed to durably persist a record or marker.
    Write(String),

    /// The storage medium could not be read, or a stored record could not be decoded.
    Read(String),

    /// A decision has already been appended for this transaction.
    DuplicateDecision(TransactionId),
}

impl Error for DecisionLogError {}

impl Display for DecisionLogError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            DecisionLogError::Write(msg) => write!(f, "unable to write decision log: {}", msg),
            DecisionLogError::Read(msg) => write!(f, "unable to read decision log: {}", msg),
            DecisionLogError::DuplicateDecision(id) => {
                write!(f, "decision already recorded for transaction {}", id)
            }
        }
    }
}
