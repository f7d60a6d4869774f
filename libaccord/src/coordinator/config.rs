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

//! Serializable coordinator settings.
//!
//! Durations are given in milliseconds. Every field has a default, so a host can load a partial
//! document and only override what it needs.

use std::convert::TryFrom;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgumentError;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// `None` retries without limit.
    pub max_attempts: Option<u32>,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub report_interval_ms: Option<u64>,
}

impl RetryConfig {
    fn from_policy(policy: &RetryPolicy) -> Self {
        RetryConfig {
            max_attempts: policy.max_attempts(),
            base_delay_ms: policy.base_delay().as_millis() as u64,
            multiplier: policy.multiplier(),
            max_delay_ms: policy.max_delay().as_millis() as u64,
            jitter: policy.jitter(),
            report_interval_ms: policy.report_interval().map(|d| d.as_millis() as u64),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::from_policy(&RetryPolicy::phase_one())
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = InvalidArgumentError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        let mut builder = RetryPolicy::builder()
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_multiplier(config.multiplier)
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_jitter(config.jitter);

        builder = match config.max_attempts {
            Some(max_attempts) => builder.with_max_attempts(max_attempts),
            None => builder.unbounded(),
        };

        if let Some(interval) = config.report_interval_ms {
            builder = builder.with_report_interval(Duration::from_millis(interval));
        }

        builder.build()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bound on a single call to a participant.
    pub call_timeout_ms: u64,
    /// Bound on all of phase one; participants which have not voted by then are in doubt.
    pub prepare_timeout_ms: u64,
    /// How long `finalize` waits for acknowledgments before reporting the transaction pending.
    pub finalize_deadline_ms: u64,
    pub alarm_capacity: usize,
    pub prepare_retry: RetryConfig,
    pub delivery_retry: RetryConfig,
    pub log_retry: RetryConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            call_timeout_ms: 1_000,
            prepare_timeout_ms: 10_000,
            finalize_deadline_ms: 30_000,
            alarm_capacity: 64,
            prepare_retry: RetryConfig::default(),
            delivery_retry: RetryConfig::from_policy(&RetryPolicy::phase_two()),
            log_retry: RetryConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_millis(self.prepare_timeout_ms)
    }

    pub fn finalize_deadline(&self) -> Duration {
        Duration::from_millis(self.finalize_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config: CoordinatorConfig = serde_json::from_str(
            r#"{ "call_timeout_ms": 250, "prepare_retry": { "max_attempts": 5 } }"#,
        )?;

        assert_eq!(config.call_timeout(), Duration::from_millis(250));
        assert_eq!(config.finalize_deadline(), Duration::from_secs(30));
        assert_eq!(config.prepare_retry.max_attempts, Some(5));
        assert_eq!(config.delivery_retry.max_attempts, None);

        let policy = RetryPolicy::try_from(&config.prepare_retry)?;
        assert_eq!(policy.max_attempts(), Some(5));
        assert_eq!(policy.base_delay(), Duration::from_millis(50));

        assert_eq!(
            RetryPolicy::try_from(&config.delivery_retry)?,
            RetryPolicy::phase_two()
        );

        Ok(())
    }

    #[test]
    fn invalid_retry_settings_are_rejected() {
        let config = RetryConfig {
            max_attempts: Some(0),
            ..RetryConfig::default()
        };

        assert!(RetryPolicy::try_from(&config).is_err());
    }
}
