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

//! The durable record of every transaction's outcome.
//!
//! A decision record is appended once, before any participant is told the outcome, and never
//! changes afterwards. A separate DONE marker is written once every participant has
//! acknowledged; records without one are what recovery resumes.

#[cfg(feature = "file-log")]
mod file;
mod memory;

use async_trait::async_trait;

use crate::error::DecisionLogError;
use crate::transaction::{DecisionRecord, TransactionId};

#[cfg(feature = "file-log")]
pub use file::FileDecisionLog;
pub use memory::InMemoryDecisionLog;

#[async_trait]
pub trait DecisionLog: Send + Sync {
    /// Durably appends a decision record.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionLogError::DuplicateDecision`] if a record already exists for the
    /// transaction, or [`DecisionLogError::Write`] if the storage medium fails.
    async fn append(&self, record: DecisionRecord) -> Result<(), DecisionLogError>;

    async fn read(&self, id: &TransactionId) -> Result<Option<DecisionRecord>, DecisionLogError>;

    /// Durably records that every participant acknowledged the decision. Marking a transaction
    /// without a record is an error; marking it twice is not.
    async fn mark_done(&self, id: &TransactionId) -> Result<(), DecisionLogError>;

    /// Whether the transaction has a DONE marker.
    async fn is_done(&self, id: &TransactionId) -> Result<bool, DecisionLogError>;

    /// Lists transactions which have a decision record but no DONE marker.
    async fn scan_incomplete(&self) -> Result<Vec<TransactionId>, DecisionLogError>;
}
