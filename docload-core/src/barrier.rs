//! Completion barrier for a set of concurrently running agents
//!
//! Every agent is registered before any is launched and gets a
//! [`CompletionToken`]. Completing a token decrements the barrier; failing it
//! records the failure and wakes the waiter immediately, so a fatal agent error
//! ends the wait instead of leaving the count stuck above zero. A token dropped
//! without either (a panicking task) counts as a failure.

use crate::agent::AgentRole;
use crate::error::{AgentError, AgentErrorKind};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

#[derive(Debug, Clone, Default)]
struct BarrierState {
    registered: usize,
    remaining: usize,
    failure: Option<AgentError>,
}

/// Counting barrier that the scenario runner blocks on
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    state: Arc<watch::Sender<BarrierState>>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(BarrierState::default());
        Self {
            state: Arc::new(sender),
        }
    }

    /// Add one participant
    pub fn register(&self, role: AgentRole, agent_id: usize) -> CompletionToken {
        self.state.send_modify(|state| {
            state.registered += 1;
            state.remaining += 1;
        });
        CompletionToken {
            state: self.state.clone(),
            role,
            agent_id,
            finished: false,
        }
    }

    /// Participants that have not completed yet
    pub fn remaining(&self) -> usize {
        self.state.borrow().remaining
    }

    /// Block until every participant completed or one of them failed.
    ///
    /// Returns the number of participants on success and the first recorded
    /// failure otherwise.
    pub async fn wait(&self) -> Result<usize, AgentError> {
        let mut receiver = self.state.subscribe();
        let state = match receiver
            .wait_for(|state| state.remaining == 0 || state.failure.is_some())
            .await
        {
            Ok(state) => (*state).clone(),
            // The sender lives in `self`, so it cannot be gone
            Err(_) => (*self.state.borrow()).clone(),
        };

        match state.failure {
            Some(failure) => Err(failure),
            None => Ok(state.registered),
        }
    }
}

/// One participant's handle on the barrier
#[derive(Debug)]
pub struct CompletionToken {
    state: Arc<watch::Sender<BarrierState>>,
    role: AgentRole,
    agent_id: usize,
    finished: bool,
}

impl CompletionToken {
    pub fn complete(mut self) {
        self.finished = true;
        debug!(role = %self.role, agent_id = self.agent_id, "agent completed");
        self.state.send_modify(|state| {
            state.remaining = state.remaining.saturating_sub(1);
        });
    }

    pub fn fail(mut self, failure: AgentError) {
        self.finished = true;
        record_failure(&self.state, failure);
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        if !self.finished {
            record_failure(
                &self.state,
                AgentError::new(self.role, self.agent_id, "run", AgentErrorKind::Abandoned),
            );
        }
    }
}

fn record_failure(state: &watch::Sender<BarrierState>, failure: AgentError) {
    if state.borrow().failure.is_some() {
        // Agents torn down after the first failure
        debug!(role = %failure.role, agent_id = failure.agent_id, error = %failure.kind, "agent stopped");
        return;
    }
    error!(
        role = %failure.role,
        agent_id = failure.agent_id,
        operation = failure.operation,
        error = %failure.kind,
        "agent failed"
    );
    state.send_modify(|state| {
        if state.failure.is_none() {
            state.failure = Some(failure);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_when_all_complete() {
        let barrier = CompletionBarrier::new();
        let tokens: Vec<_> = (0..5).map(|i| barrier.register(AgentRole::Writer, i)).collect();
        assert_eq!(barrier.remaining(), 5);

        for token in tokens {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                token.complete();
            });
        }

        assert_eq!(barrier.wait().await.unwrap(), 5);
        assert_eq!(barrier.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failure_ends_wait_with_first_error() {
        let barrier = CompletionBarrier::new();
        let first = barrier.register(AgentRole::Writer, 0);
        let second = barrier.register(AgentRole::Reader, 1);
        let _never = barrier.register(AgentRole::Updater, 2);

        first.fail(AgentError::new(
            AgentRole::Writer,
            0,
            "create_user",
            AgentErrorKind::InvalidSetup("boom".to_string()),
        ));
        second.fail(AgentError::new(
            AgentRole::Reader,
            1,
            "changes",
            AgentErrorKind::Incomplete,
        ));

        let err = barrier.wait().await.unwrap_err();
        assert_eq!(err.role, AgentRole::Writer);
        assert_eq!(err.operation, "create_user");
    }

    #[tokio::test]
    async fn test_dropped_token_fails_barrier() {
        let barrier = CompletionBarrier::new();
        let token = barrier.register(AgentRole::Updater, 3);

        let handle = tokio::spawn(async move {
            let _token = token;
            panic!("agent blew up");
        });
        assert!(handle.await.is_err());

        let err = barrier.wait().await.unwrap_err();
        assert_eq!(err.agent_id, 3);
        assert!(matches!(err.kind, AgentErrorKind::Abandoned));
    }

    #[tokio::test]
    async fn test_empty_barrier_is_immediately_done() {
        assert_eq!(CompletionBarrier::new().wait().await.unwrap(), 0);
    }
}
