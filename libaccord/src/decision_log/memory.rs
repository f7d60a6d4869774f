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

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::DecisionLogError;
use crate::transaction::{DecisionRecord, TransactionId};

use super::DecisionLog;

struct Entry {
    record: DecisionRecord,
    done: bool,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<TransactionId, Entry>,
    failing_writes: u32,
}

/// A decision log held in memory.
///
/// Clones share the same storage, so a test can drop a coordinator and build a new one over the
/// same log to simulate a restart.
#[derive(Clone, Default)]
pub struct InMemoryDecisionLog {
    state: Arc<Mutex<State>>,
}

impl InMemoryDecisionLog {
    pub fn new() -> Self {
        InMemoryDecisionLog::default()
    }

    /// Makes the next `count` appends or DONE markers fail with a write error.
    pub fn fail_next_writes(&self, count: u32) {
        if let Ok(mut state) = self.state() {
            state.failing_writes = count;
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, DecisionLogError> {
        self.state
            .lock()
            .map_err(|_| DecisionLogError::Read("decision log lock poisoned".into()))
    }
}

impl State {
    fn take_write_fault(&mut self) -> Result<(), DecisionLogError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(DecisionLogError::Write("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DecisionLog for InMemoryDecisionLog {
    async fn append(&self, record: DecisionRecord) -> Result<(), DecisionLogError> {
        let mut state = self.state()?;
        state.take_write_fault()?;

        if state.entries.contains_key(&record.transaction_id) {
            return Err(DecisionLogError::DuplicateDecision(record.transaction_id));
        }

        state.entries.insert(
            record.transaction_id.clone(),
            Entry {
                record,
                done: false,
            },
        );
        Ok(())
    }

    async fn read(&self, id: &TransactionId) -> Result<Option<DecisionRecord>, DecisionLogError> {
        Ok(self.state()?.entries.get(id).map(|e| e.record.clone()))
    }

    async fn mark_done(&self, id: &TransactionId) -> Result<(), DecisionLogError> {
        let mut state = self.state()?;
        state.take_write_fault()?;

        match state.entries.get_mut(id) {
            Some(entry) => {
                entry.done = true;
                Ok(())
            }
            None => Err(DecisionLogError::Write(format!(
                "no decision recorded for transaction {}",
                id
            ))),
        }
    }

    async fn is_done(&self, id: &TransactionId) -> Result<bool, DecisionLogError> {
        Ok(self
            .state()?
            .entries
            .get(id)
            .map(|entry| entry.done)
            .unwrap_or(false))
    }

    async fn scan_incomplete(&self) -> Result<Vec<TransactionId>, DecisionLogError> {
        Ok(self
            .state()?
            .entries
            .iter()
            .filter(|(_, entry)| !entry.done)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use crate::transaction::{Decision, ParticipantRef};

    use super::*;

    fn record(id: &str, decision: Decision) -> DecisionRecord {
        DecisionRecord {
            transaction_id: id.into(),
            decision,
            participants: vec![ParticipantRef::new("p1", "mem://p1")],
            written_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn append_then_read() -> Result<(), Box<dyn std::error::Error>> {
        let log = InMemoryDecisionLog::new();
        log.append(record("tx-1", Decision::Commit)).await?;

        let stored = log.read(&"tx-1".into()).await?;
        assert_eq!(stored.map(|r| r.decision), Some(Decision::Commit));
        assert!(log.read(&"tx-2".into()).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn second_append_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let log = InMemoryDecisionLog::new();
        log.append(record("tx-1", Decision::Commit)).await?;

        let result = log.append(record("tx-1", Decision::Abort)).await;
        assert!(matches!(
            result,
            Err(DecisionLogError::DuplicateDecision(_))
        ));

        // The first decision is kept.
        let stored = log.read(&"tx-1".into()).await?;
        assert_eq!(stored.map(|r| r.decision), Some(Decision::Commit));

        Ok(())
    }

    #[tokio::test]
    async fn scan_skips_done_transactions() -> Result<(), Box<dyn std::error::Error>> {
        let log = InMemoryDecisionLog::new();
        log.append(record("tx-1", Decision::Commit)).await?;
        log.append(record("tx-2", Decision::Abort)).await?;
        log.mark_done(&"tx-1".into()).await?;

        assert_eq!(
            log.scan_incomplete().await?,
            vec![TransactionId::from("tx-2")]
        );
        assert!(log.is_done(&"tx-1".into()).await?);

        Ok(())
    }

    #[tokio::test]
    async fn injected_faults_fail_writes() -> Result<(), Box<dyn std::error::Error>> {
        let log = InMemoryDecisionLog::new();
        log.fail_next_writes(1);

        assert!(matches!(
            log.append(record("tx-1", Decision::Commit)).await,
            Err(DecisionLogError::Write(_))
        ));
        log.append(record("tx-1", Decision::Commit)).await?;

        Ok(())
    }

    #[tokio::test]
    async fn mark_done_without_record_fails() {
        let log = InMemoryDecisionLog::new();
        assert!(log.mark_done(&"tx-1".into()).await.is_err());
    }
}
