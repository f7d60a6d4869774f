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

use std::convert::TryFrom;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::algorithm::two_phase_commit::CoordinatorAlgorithm;
use crate::decision_log::DecisionLog;
use crate::error::{InvalidArgumentError, InvalidStateError};
use crate::keyed::KeyedMutex;
use crate::links::Connector;
use crate::retry::{CancellationToken, RetryPolicy, RetryScheduler};
use crate::time::{SystemTimeSource, TimeSource};

use super::alarm::Alarms;
use super::config::CoordinatorConfig;
use super::{Coordinator, Inner};

#[derive(Default)]
pub struct CoordinatorBuilder {
    decision_log: Option<Arc<dyn DecisionLog>>,
    connector: Option<Arc<dyn Connector>>,
    time_source: Option<Arc<dyn TimeSource>>,
    prepare_retry: Option<RetryPolicy>,
    delivery_retry: Option<RetryPolicy>,
    log_retry: Option<RetryPolicy>,
    call_timeout: Option<Duration>,
    prepare_timeout: Option<Duration>,
    finalize_deadline: Option<Duration>,
    alarm_capacity: Option<usize>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        CoordinatorBuilder::default()
    }

    pub fn with_decision_log(mut self, decision_log: Arc<dyn DecisionLog>) -> Self {
        self.decision_log = Some(decision_log);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    pub fn with_prepare_retry(mut self, policy: RetryPolicy) -> Self {
        self.prepare_retry = Some(policy);
        self
    }

    pub fn with_delivery_retry(mut self, policy: RetryPolicy) -> Self {
        self.delivery_retry = Some(policy);
        self
    }

    pub fn with_log_retry(mut self, policy: RetryPolicy) -> Self {
        self.log_retry = Some(policy);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    pub fn with_prepare_timeout(mut self, prepare_timeout: Duration) -> Self {
        self.prepare_timeout = Some(prepare_timeout);
        self
    }

    pub fn with_finalize_deadline(mut self, finalize_deadline: Duration) -> Self {
        self.finalize_deadline = Some(finalize_deadline);
        self
    }

    pub fn with_alarm_capacity(mut self, alarm_capacity: usize) -> Self {
        self.alarm_capacity = Some(alarm_capacity);
        self
    }

    /// Applies every setting in `config`, replacing any set earlier.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgumentError`] if one of the retry settings is invalid.
    pub fn with_config(self, config: &CoordinatorConfig) -> Result<Self, InvalidArgumentError> {
        Ok(self
            .with_prepare_retry(RetryPolicy::try_from(&config.prepare_retry)?)
            .with_delivery_retry(RetryPolicy::try_from(&config.delivery_retry)?)
            .with_log_retry(RetryPolicy::try_from(&config.log_retry)?)
            .with_call_timeout(config.call_timeout())
            .with_prepare_timeout(config.prepare_timeout())
            .with_finalize_deadline(config.finalize_deadline())
            .with_alarm_capacity(config.alarm_capacity))
    }

    /// Builds the coordinator. The decision log and connector are required; everything else
    /// falls back to [`CoordinatorConfig::default`].
    pub fn build(self) -> Result<Coordinator, InvalidStateError> {
        let decision_log = self
            .decision_log
            .ok_or_else(|| InvalidStateError::with_message("missing decision_log field".into()))?;
        let connector = self
            .connector
            .ok_or_else(|| InvalidStateError::with_message("missing connector field".into()))?;

        let defaults = CoordinatorConfig::default();
        let time_source = self
            .time_source
            .unwrap_or_else(|| Arc::new(SystemTimeSource::new()));
        let delivery_retry = self
            .delivery_retry
            .unwrap_or_else(RetryPolicy::phase_two);

        if delivery_retry.max_attempts().is_some() {
            return Err(InvalidStateError::with_message(
                "delivery retry policy must not limit attempts".into(),
            ));
        }

        Ok(Coordinator {
            inner: Arc::new(Inner {
                decision_log,
                connector,
                algorithm: CoordinatorAlgorithm::new(time_source.clone()),
                time_source,
                transactions: KeyedMutex::new(),
                phases: Mutex::default(),
                scheduler: RetryScheduler::new(),
                prepare_retry: self.prepare_retry.unwrap_or_else(RetryPolicy::phase_one),
                delivery_retry,
                log_retry: self.log_retry.unwrap_or_else(RetryPolicy::phase_one),
                call_timeout: self.call_timeout.unwrap_or_else(|| defaults.call_timeout()),
                prepare_timeout: self
                    .prepare_timeout
                    .unwrap_or_else(|| defaults.prepare_timeout()),
                finalize_deadline: self
                    .finalize_deadline
                    .unwrap_or_else(|| defaults.finalize_deadline()),
                alarms: Alarms::new(self.alarm_capacity.unwrap_or(defaults.alarm_capacity)),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}
