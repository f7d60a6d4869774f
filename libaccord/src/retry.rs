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

//! Backoff-governed retries for outbound calls.
//!
//! Phase one uses bounded policies: doubt must resolve to abort within a finite window. Phase two
//! uses unbounded policies with a reporting interval, so delivery of a durable decision never
//! gives up but a stuck transaction becomes visible.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use tokio::time::Instant;

pub use tokio_util::sync::CancellationToken;

use crate::error::{DecisionLogError, InvalidArgumentError, ParticipantError};

/// Classifies failures which are worth another attempt.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ParticipantError {
    fn is_transient(&self) -> bool {
        matches!(self, ParticipantError::Unreachable(_))
    }
}

impl Retryable for DecisionLogError {
    fn is_transient(&self) -> bool {
        !matches!(self, DecisionLogError::DuplicateDecision(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: f64,
    report_interval: Option<Duration>,
}

impl RetryPolicy {
    /// The default policy for prepare calls: three attempts, then the participant is in doubt.
    pub fn phase_one() -> Self {
        RetryPolicy {
            max_attempts: Some(3),
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: 0.2,
            report_interval: None,
        }
    }

    /// The default policy for decision delivery: retry forever, reporting every 30 seconds.
    pub fn phase_two() -> Self {
        RetryPolicy {
            max_attempts: None,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
            report_interval: Some(Duration::from_secs(30)),
        }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn report_interval(&self) -> Option<Duration> {
        self.report_interval
    }

    /// A fresh backoff schedule for one run. Attempts, not elapsed time, bound a run, so the
    /// schedule itself never expires.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: self.jitter,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

#[derive(Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<Option<u32>>,
    base_delay: Option<Duration>,
    multiplier: Option<f64>,
    max_delay: Option<Duration>,
    jitter: Option<f64>,
    report_interval: Option<Duration>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        RetryPolicyBuilder::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(Some(max_attempts));
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_attempts = Some(None);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = Some(report_interval);
        self
    }

    /// Builds the policy. Unset fields take their phase one defaults.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidArgumentError`] if max attempts is zero, the multiplier is below 1,
    /// the jitter is outside `0.0..=1.0`, or the base delay exceeds the max delay.
    pub fn build(self) -> Result<RetryPolicy, InvalidArgumentError> {
        let defaults = RetryPolicy::phase_one();

        let policy = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.base_delay.unwrap_or(defaults.base_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            report_interval: self.report_interval,
        };

        if policy.max_attempts == Some(0) {
            return Err(InvalidArgumentError::new(
                "max_attempts".to_string(),
                "must allow at least one attempt".to_string(),
            ));
        }

        if !policy.multiplier.is_finite() || policy.multiplier < 1.0 {
            return Err(InvalidArgumentError::new(
                "multiplier".to_string(),
                "must be a finite number no smaller than 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&policy.jitter) {
            return Err(InvalidArgumentError::new(
                "jitter".to_string(),
                "must be between 0 and 1".to_string(),
            ));
        }

        if policy.base_delay > policy.max_delay {
            return Err(InvalidArgumentError::new(
                "base_delay".to_string(),
                "must not exceed max_delay".to_string(),
            ));
        }

        Ok(policy)
    }
}

/// Reported each time a policy's reporting interval passes without a successful attempt.
#[derive(Clone, Debug)]
pub struct RetryStall {
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_error: String,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Every permitted attempt failed.
    Exhausted { attempts: u32, last: E },
    /// The run was cancelled.
    Cancelled { attempts: u32 },
    /// An attempt failed in a way which retrying cannot fix.
    Fatal { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// The last error seen, if any attempt completed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled after {} attempts", attempts)
            }
            RetryError::Fatal { attempts, error } => {
                write!(f, "failed on attempt {}: {}", attempts, error)
            }
        }
    }
}

/// Runs operations until they succeed, fail fatally, exhaust their policy, or are cancelled.
#[derive(Clone, Debug, Default)]
pub struct RetryScheduler {}

impl RetryScheduler {
    pub fn new() -> Self {
        RetryScheduler {}
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.run_reporting(policy, cancel, operation, |_| ()).await
    }

    /// Runs `operation`, passing it the attempt number starting at 1, and calls `on_stall`
    /// whenever the policy's reporting interval passes without success.
    pub async fn run_reporting<T, E, F, Fut, S>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut operation: F,
        mut on_stall: S,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        S: FnMut(&RetryStall),
    {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let max_attempts = policy.max_attempts();
        let report_interval = policy.report_interval();
        let started = Instant::now();
        let mut last_report = started;

        let retrying = backoff::future::retry_notify(
            policy.backoff(),
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let call = operation(attempt);
                async move {
                    call.await.map_err(|error| {
                        if error.is_transient() && max_attempts.map_or(true, |max| attempt < max)
                        {
                            backoff::Error::transient(error)
                        } else {
                            backoff::Error::permanent(error)
                        }
                    })
                }
            },
            move |error: E, delay: Duration| {
                let attempts = attempts.load(Ordering::SeqCst);
                if let Some(interval) = report_interval {
                    if last_report.elapsed() >= interval {
                        on_stall(&RetryStall {
                            attempts,
                            elapsed: started.elapsed(),
                            last_error: error.to_string(),
                        });
                        last_report = Instant::now();
                    }
                }
                debug!(
                    "Attempt {} failed: {}; retrying in {:?}",
                    attempts, error, delay
                );
            },
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled {
                    attempts: counter.load(Ordering::SeqCst),
                })
            }
            result = retrying => result,
        };

        let attempts = counter.load(Ordering::SeqCst);
        result.map_err(|error| {
            if error.is_transient() {
                RetryError::Exhausted {
                    attempts,
                    last: error,
                }
            } else {
                RetryError::Fatal { attempts, error }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
            .with_jitter(0.0)
            .build()
            .expect("valid policy")
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = RetryScheduler::new()
            .run(&quick(5), &CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ParticipantError::Unreachable("down".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), _> = RetryScheduler::new()
            .run(&quick(3), &CancellationToken::new(), |_| async {
                Err(ParticipantError::Unreachable("down".into()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let result: Result<(), _> = RetryScheduler::new()
            .run(&quick(3), &CancellationToken::new(), |_| async {
                Err(ParticipantError::Rejected("no".into()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Fatal { attempts: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_the_wait() {
        let cancel = CancellationToken::new();
        let handle = cancel.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::builder()
            .unbounded()
            .with_base_delay(Duration::from_secs(60))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(0.0)
            .build()
            .expect("valid policy");

        let counted = calls.clone();
        let run = tokio::spawn(async move {
            RetryScheduler::new()
                .run(&policy, &cancel, |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ParticipantError::Unreachable("down".into())) }
                })
                .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let result = run.await.expect("task completed");
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> = RetryScheduler::new()
            .run(&quick(3), &cancel, |_| async { Ok::<(), ParticipantError>(()) })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_policy_reports_stalls() {
        let policy = RetryPolicy::builder()
            .unbounded()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(0.0)
            .with_report_interval(Duration::from_secs(3))
            .build()
            .expect("valid policy");
        let mut stalls = Vec::new();

        let result = RetryScheduler::new()
            .run_reporting(
                &policy,
                &CancellationToken::new(),
                |attempt| async move {
                    if attempt < 10 {
                        Err(ParticipantError::Unreachable("down".into()))
                    } else {
                        Ok(())
                    }
                },
                |stall| stalls.push(stall.attempts),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(stalls, vec![4, 7]);
    }

    // The backoff schedule may add up to a nanosecond even without jitter.
    fn close_to(actual: Option<Duration>, expected: Duration) -> bool {
        matches!(actual, Some(delay) if delay >= expected && delay <= expected + Duration::from_micros(1))
    }

    #[test]
    fn delay_grows_and_is_capped() {
        use backoff::backoff::Backoff;

        let policy = RetryPolicy::builder()
            .with_base_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(0.0)
            .build()
            .expect("valid policy");
        let mut backoff = policy.backoff();

        assert!(close_to(backoff.next_backoff(), Duration::from_millis(100)));
        assert!(close_to(backoff.next_backoff(), Duration::from_millis(200)));
        assert!(close_to(backoff.next_backoff(), Duration::from_millis(400)));
        assert!(close_to(backoff.next_backoff(), Duration::from_millis(500)));
        for _ in 0..100 {
            assert!(close_to(backoff.next_backoff(), Duration::from_millis(500)));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        use backoff::backoff::Backoff;

        let policy = RetryPolicy::builder()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(0.5)
            .build()
            .expect("valid policy");

        for _ in 0..100 {
            let delay = policy.backoff().next_backoff();
            assert!(matches!(
                delay,
                Some(delay) if delay >= Duration::from_millis(50)
                    && delay <= Duration::from_millis(151)
            ));
        }
    }

    #[test]
    fn invalid_policies_are_rejected() {
        assert!(RetryPolicy::builder().with_max_attempts(0).build().is_err());
        assert!(RetryPolicy::builder().with_multiplier(0.5).build().is_err());
        assert!(RetryPolicy::builder().with_jitter(1.5).build().is_err());
        assert!(RetryPolicy::builder()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1))
            .build()
            .is_err());
    }
}
