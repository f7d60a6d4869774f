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

//! Resumes transactions left incomplete by a previous run.
//!
//! Every transaction with a decision record but no DONE marker had its decision made durable
//! and possibly delivered to some participants. Recovery never recomputes such a decision; it
//! re-enters phase two with the recorded outcome until every participant has acknowledged.

use futures::stream::{FuturesUnordered, StreamExt};

use crate::coordinator::{Coordinator, FinalizeStatus};
use crate::decision_log::DecisionLog;
use crate::error::CoordinatorError;
use crate::transaction::TransactionId;

/// What a recovery pass accomplished.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Transactions taken over, with how far their delivery got.
    pub resumed: Vec<(TransactionId, FinalizeStatus)>,
    /// Transactions which could not be taken over, with the reason.
    pub failed: Vec<(TransactionId, CoordinatorError)>,
}

impl RecoveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self
                .resumed
                .iter()
                .all(|(_, status)| matches!(status, FinalizeStatus::Done(_)))
    }
}

pub struct RecoveryManager {
    coordinator: Coordinator,
}

impl RecoveryManager {
    pub fn new(coordinator: Coordinator) -> Self {
        RecoveryManager { coordinator }
    }

    /// Scans the decision log and finalizes every incomplete transaction concurrently.
    ///
    /// A transaction still being finalized by a live call is waited for rather than delivered
    /// twice.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::LogRead`] if the log cannot be scanned. Failures of
    /// individual transactions are collected in the report instead.
    pub async fn resume(&self) -> Result<RecoveryReport, CoordinatorError> {
        let incomplete = self
            .coordinator
            .decision_log()
            .scan_incomplete()
            .await
            .map_err(CoordinatorError::LogRead)?;

        if incomplete.is_empty() {
            debug!("Recovery found no incomplete transactions");
            return Ok(RecoveryReport::default());
        }
        info!(
            "Recovery resuming {} incomplete transactions",
            incomplete.len()
        );

        let mut resuming: FuturesUnordered<_> = incomplete
            .into_iter()
            .map(|id| async move {
                let result = self.resume_one(&id).await;
                (id, result)
            })
            .collect();

        let mut report = RecoveryReport::default();
        while let Some((id, result)) = resuming.next().await {
            match result {
                Ok(status) => report.resumed.push((id, status)),
                Err(err) => {
                    warn!("Unable to resume transaction {}: {}", id, err);
                    report.failed.push((id, err));
                }
            }
        }

        report.resumed.sort_by(|a, b| a.0.cmp(&b.0));
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(report)
    }

    async fn resume_one(&self, id: &TransactionId) -> Result<FinalizeStatus, CoordinatorError> {
        let record = self
            .coordinator
            .decision_log()
            .read(id)
            .await?
            .ok_or_else(|| CoordinatorError::UnknownTransaction(id.clone()))?;

        debug!(
            "Recovering transaction {} with decision {}",
            id, record.decision
        );
        self.coordinator.resume(record).await
    }
}
