//! Handling of failed steady-state batch calls

use crate::error::AgentErrorKind;
use docload_config::BatchErrorPolicyConfig;
use docload_interfaces::DataStoreResult;
use docload_resilience::{RetryError, RetryExecutor, RetryPolicy};
use std::future::Future;
use tracing::warn;

/// What an agent does when a batch call fails.
///
/// Provisioning never goes through the policy: a failed create-user is always
/// fatal.
#[derive(Debug, Clone)]
pub enum BatchErrorPolicy {
    /// The first failure is fatal
    Abort,
    /// Log the failure and carry on without the batch
    Skip,
    /// Retry retryable failures, fatal once attempts run out
    Retry(RetryExecutor),
}

impl Default for BatchErrorPolicy {
    fn default() -> Self {
        Self::from_config(&BatchErrorPolicyConfig::default())
    }
}

impl BatchErrorPolicy {
    pub fn from_config(config: &BatchErrorPolicyConfig) -> Self {
        match config {
            BatchErrorPolicyConfig::Abort => BatchErrorPolicy::Abort,
            BatchErrorPolicyConfig::Skip => BatchErrorPolicy::Skip,
            BatchErrorPolicyConfig::Retry {
                max_attempts,
                initial_delay_ms,
                max_delay_ms,
            } => BatchErrorPolicy::Retry(RetryExecutor::new(RetryPolicy::exponential(
                *max_attempts,
                *initial_delay_ms,
                *max_delay_ms,
            ))),
        }
    }

    /// Run one batch call under the policy.
    ///
    /// `Ok(Some(_))` is a successful call, `Ok(None)` a skipped failure and
    /// `Err(_)` a failure that must end the agent.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<Option<T>, AgentErrorKind>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DataStoreResult<T>>,
    {
        match self {
            BatchErrorPolicy::Abort => call(1).await.map(Some).map_err(AgentErrorKind::from),
            BatchErrorPolicy::Skip => match call(1).await {
                Ok(value) => Ok(Some(value)),
                Err(error) => {
                    warn!(operation, %error, "batch failed, skipping");
                    Ok(None)
                }
            },
            BatchErrorPolicy::Retry(executor) => match executor.execute(operation, call).await {
                Ok(value) => Ok(Some(value)),
                Err(RetryError::MaxAttemptsExceeded {
                    attempts,
                    last_error,
                }) => Err(AgentErrorKind::RetriesExhausted {
                    attempts,
                    last_error,
                }),
                Err(RetryError::NonRetryable(error)) => Err(AgentErrorKind::DataStore(error)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docload_interfaces::DataStoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn unavailable() -> DataStoreError {
        DataStoreError::Status {
            operation: "bulk_create",
            status: 502,
            body: String::new(),
        }
    }

    fn retry(max_attempts: u32) -> BatchErrorPolicy {
        BatchErrorPolicy::from_config(&BatchErrorPolicyConfig::Retry {
            max_attempts,
            initial_delay_ms: Duration::from_millis(10),
            max_delay_ms: Duration::from_millis(100),
        })
    }

    #[tokio::test]
    async fn test_abort_surfaces_first_failure() {
        let result: Result<Option<()>, _> = BatchErrorPolicy::Abort
            .run("bulk_create", |_| async { Err(unavailable()) })
            .await;
        assert!(matches!(result, Err(AgentErrorKind::DataStore(_))));
    }

    #[tokio::test]
    async fn test_skip_swallows_failure() {
        let result: Result<Option<()>, _> = BatchErrorPolicy::Skip
            .run("bulk_create", |_| async { Err(unavailable()) })
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = retry(3)
            .run("bulk_create", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(unavailable())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let result: Result<Option<()>, _> = retry(2)
            .run("bulk_create", |_| async { Err(unavailable()) })
            .await;
        assert!(matches!(
            result,
            Err(AgentErrorKind::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_client_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, _> = retry(5)
            .run("bulk_create", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(DataStoreError::Status {
                        operation: "bulk_create",
                        status: 400,
                        body: String::new(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(AgentErrorKind::DataStore(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
