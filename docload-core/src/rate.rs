//! Per-agent think-time pacing

use std::time::Duration;
use tokio::time::Instant;

/// Delay still owed before the next operation.
///
/// Closed-loop pacing: time already spent since the prior operation counts
/// against the configured delay, so a saturated agent never sleeps.
pub fn next_delay(configured: Duration, elapsed: Duration) -> Duration {
    configured.saturating_sub(elapsed)
}

/// Spaces one agent's operations at least `delay` apart
#[derive(Debug, Clone)]
pub struct RateScheduler {
    delay: Duration,
    last: Option<Instant>,
}

impl RateScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the remaining think time, then mark the start of an operation
    pub async fn pace(&mut self) {
        if let Some(last) = self.last {
            let wait = next_delay(self.delay, last.elapsed());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
