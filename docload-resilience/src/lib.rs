//! Resilience patterns for docload
//!
//! Retry policies with pluggable backoff, applied by scenario runners to
//! steady-state batch calls against the data store.

pub mod backoff;
pub mod retry;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
