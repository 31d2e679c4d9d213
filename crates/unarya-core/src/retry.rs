//! Bounded retry-with-delay policy.
//!
//! The policy owns both the counting loop and the re-invocation: callers hand
//! it a closure that performs one attempt, and get back either the first
//! success or a terminal [`RetryExhausted`] naming the stage and retry count.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{ErrorKind, StageError};
use crate::metrics::METRICS;
use crate::obs;

/// Retry configuration applied to every stage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry cycles after the first attempt. `0` means a single attempt.
    pub max_retries: u32,

    /// Pause before each retry.
    pub delay: Duration,

    /// Also retry when the remote service reported a domain failure.
    /// Transport failures and timeouts are always retried.
    pub retry_application_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            retry_application_errors: false,
        }
    }
}

/// Successful outcome with the number of calls it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// One retry cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEntry {
    /// Retry number, starting at 1.
    pub retry: u32,
    /// Error that triggered this retry.
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Terminal failure after the policy gave up.
#[derive(Debug, Clone, thiserror::Error)]
#[error("stage {stage} failed after {retries} retries: {error}")]
pub struct RetryExhausted {
    pub stage: String,
    pub retries: u32,
    /// Total calls made, including the first.
    pub attempts: u32,
    pub retry_log: Vec<RetryEntry>,
    #[source]
    pub error: StageError,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Self::default()
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn retry_application_errors(mut self, enabled: bool) -> Self {
        self.retry_application_errors = enabled;
        self
    }

    /// Whether `error` qualifies for another attempt.
    pub fn is_retryable(&self, error: &StageError) -> bool {
        match error.kind() {
            ErrorKind::Transport => true,
            ErrorKind::Application => self.retry_application_errors,
            ErrorKind::Cancelled => false,
        }
    }

    /// Run `op` until it succeeds, the error is not retryable, retries are
    /// exhausted, or `cancel` fires during a delay.
    ///
    /// `op` receives the attempt number, starting at 1.
    pub async fn run<T, F, Fut>(
        &self,
        stage: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Retried<T>, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let mut attempt = 1;
        let mut error = match op(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => e,
        };
        obs::emit_stage_failed(stage, attempt, &error);

        let mut retry_log = Vec::new();
        let mut retries = 0;
        while retries < self.max_retries && self.is_retryable(&error) {
            retries += 1;
            obs::emit_stage_retry(stage, retries, self.max_retries, &error);
            METRICS.record_stage_retry(stage);
            retry_log.push(RetryEntry {
                retry: retries,
                error: error.to_string(),
                at: Utc::now(),
            });

            tokio::select! {
                _ = cancel.cancelled() => {
                    error = StageError::Cancelled;
                    break;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }

            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    tracing::info!(stage = %stage, attempts = attempt, "stage recovered after retry");
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    tracing::debug!(stage = %stage, attempt = attempt, error = %e, "retry attempt failed");
                    error = e;
                }
            }
        }

        Err(RetryExhausted {
            stage: stage.to_string(),
            retries,
            attempts: attempt,
            retry_log,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn transport() -> StageError {
        StageError::Transport("connection refused".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let out = policy
            .run("parser", &cancel, |_| async { Ok::<_, StageError>(42) })
            .await
            .unwrap();

        assert_eq!(out.value, 42);
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let out = policy
            .run("collector", &cancel, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(transport())
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out.value, "ok");
        assert_eq!(out.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_exhaustion_records_every_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let err = policy
            .run("ai", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transport()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.retries, 3);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.retry_log.len(), 3);
        assert_eq!(
            err.retry_log.iter().map(|e| e.retry).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            err.to_string(),
            "stage ai failed after 3 retries: transport error: connection refused"
        );
        assert!(logs_contain("retry 3/3 for stage ai"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_is_single_attempt() {
        let policy = RetryPolicy::none();
        let cancel = CancellationToken::new();

        let err = policy
            .run("security", &cancel, |_| async { Err::<(), _>(transport()) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(err.retries, 0);
        assert!(err.retry_log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_errors_not_retried_by_default() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let err = policy
            .run("parser", &cancel, |_| async {
                Err::<(), _>(StageError::Application("unparseable code".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert!(matches!(err.error, StageError::Application(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_errors_retried_when_enabled() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10)).retry_application_errors(true);
        let cancel = CancellationToken::new();

        let err = policy
            .run("parser", &cancel, |_| async {
                Err::<(), _>(StageError::Application("unparseable code".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay_stops_retrying() {
        let policy = RetryPolicy::new(10, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = policy
            .run("collector", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(transport()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.error, StageError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
