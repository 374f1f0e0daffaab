//! Simulated clients
//!
//! Writers, readers and updaters share an [`AgentIdentity`] (id, credentials,
//! data store handle, batch size and the run-wide resources in [`AgentShared`])
//! and implement the [`Agent`] capability the scenario runner launches.

mod notify;
mod reader;
mod updater;
mod writer;

pub use notify::{notification_queues, Notification, UpdateNotifier};
pub use reader::Reader;
pub use updater::Updater;
pub use writer::{DocumentFeeder, Writer};

use crate::error::{AgentError, AgentErrorKind};
use crate::metrics::{ops, MetricKey, SharedMetrics};
use crate::policy::BatchErrorPolicy;
use crate::rate::RateScheduler;
use crate::throttle::ProvisioningThrottle;
use async_trait::async_trait;
use docload_interfaces::{DataStore, UserCred};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Role an agent plays in a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentRole {
    Writer,
    Reader,
    Updater,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Writer => "writer",
            AgentRole::Reader => "reader",
            AgentRole::Updater => "updater",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concurrently running simulated client
#[async_trait]
pub trait Agent: Send + 'static {
    fn role(&self) -> AgentRole;

    fn id(&self) -> usize;

    /// Drive the agent to completion or to its first fatal error
    async fn run(&mut self) -> Result<(), AgentError>;

    /// Whether all assigned work has been done
    fn is_done(&self) -> bool;
}

/// Resources shared by all agents of one role in a run
#[derive(Clone)]
pub struct AgentShared {
    pub metrics: SharedMetrics,
    pub policy: Arc<BatchErrorPolicy>,
    /// `None` when users already exist and provisioning is skipped
    pub throttle: Option<ProvisioningThrottle>,
    /// Documents completed by all agents of the role
    pub progress: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl AgentShared {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self {
            metrics,
            policy: Arc::new(BatchErrorPolicy::default()),
            throttle: None,
            progress: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn with_policy(mut self, policy: BatchErrorPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_throttle(mut self, throttle: Option<ProvisioningThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn completed(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }
}

/// Fields common to every agent, fixed at construction
pub struct AgentIdentity<S> {
    id: usize,
    role: AgentRole,
    cred: UserCred,
    store: S,
    batch_size: usize,
    shared: AgentShared,
}

impl<S: DataStore> AgentIdentity<S> {
    pub fn new(
        role: AgentRole,
        id: usize,
        cred: UserCred,
        store: S,
        batch_size: usize,
        shared: AgentShared,
    ) -> Result<Self, AgentError> {
        let invalid = |reason: &str| {
            AgentError::new(
                role,
                id,
                "init",
                AgentErrorKind::InvalidSetup(reason.to_string()),
            )
        };
        if cred.is_empty() {
            return Err(invalid("empty credentials"));
        }
        if batch_size == 0 {
            return Err(invalid("batch size must be positive"));
        }

        Ok(Self {
            id,
            role,
            cred,
            store,
            batch_size,
            shared,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn cred(&self) -> &UserCred {
        &self.cred
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn policy(&self) -> &BatchErrorPolicy {
        &self.shared.policy
    }

    pub fn scheduler(&self) -> RateScheduler {
        RateScheduler::new(self.shared.delay)
    }

    pub fn error(&self, operation: &'static str, kind: impl Into<AgentErrorKind>) -> AgentError {
        AgentError::new(self.role, self.id, operation, kind.into())
    }

    /// Create the remote user if provisioning is enabled, then attach the
    /// credentials to the store handle
    pub async fn provision(&mut self, channel_names: &[String]) -> Result<(), AgentError> {
        if let Some(throttle) = &self.shared.throttle {
            let start = Instant::now();
            throttle
                .provision(&self.store, &self.cred, channel_names)
                .await
                .map_err(|kind| self.error(ops::CREATE_USER, kind))?;
            self.record_timing(ops::CREATE_USER, start.elapsed());
            info!(
                role = %self.role,
                agent_id = self.id,
                username = %self.cred.username,
                channels = channel_names.len(),
                "user provisioned"
            );
        }

        self.store.set_user_creds(self.cred.clone());
        Ok(())
    }

    pub fn record_timing(&self, operation: &'static str, elapsed: Duration) {
        self.shared
            .metrics
            .record_timing(MetricKey::new(self.role, operation), elapsed);
    }

    pub fn increment(&self, operation: &'static str, count: usize) {
        if count > 0 {
            self.shared
                .metrics
                .increment(MetricKey::new(self.role, operation), count as u64);
        }
    }

    /// Add completed documents to the role's progress gauge
    pub fn advance(&self, count: usize) {
        if count == 0 {
            return;
        }
        let total = self.shared.progress.fetch_add(count, Ordering::Relaxed) + count;
        self.shared
            .metrics
            .set_gauge(MetricKey::new(self.role, ops::DOCS_COMPLETED), total as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InMemoryMetrics, NoopMetrics};
    use docload_interfaces::testing::{InMemoryDataStore, MockStore};

    #[test]
    fn test_empty_credentials_rejected() {
        let result = AgentIdentity::new(
            AgentRole::Reader,
            4,
            UserCred::empty(),
            MockStore::new(),
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
        );
        let err = result.err().unwrap();
        assert_eq!(err.agent_id, 4);
        assert!(matches!(err.kind, AgentErrorKind::InvalidSetup(_)));
    }

    #[tokio::test]
    async fn test_provision_creates_user_and_sets_creds() {
        let store = InMemoryDataStore::new();
        let metrics = Arc::new(InMemoryMetrics::new());
        let shared = AgentShared::new(metrics.clone())
            .with_throttle(Some(ProvisioningThrottle::new(2)));

        let mut identity = AgentIdentity::new(
            AgentRole::Writer,
            0,
            UserCred::new("writer-0-s", "pw"),
            store.clone(),
            1,
            shared,
        )
        .unwrap();
        identity.provision(&["0-s".to_string()]).await.unwrap();

        assert!(store.has_user("writer-0-s"));
        assert_eq!(
            metrics
                .get(MetricKey::new(AgentRole::Writer, ops::CREATE_USER))
                .calls,
            1
        );
    }

    #[tokio::test]
    async fn test_provision_skipped_without_throttle() {
        let mut store = MockStore::new();
        store.expect_create_user().never();
        store.expect_set_user_creds().times(1).return_const(());

        let mut identity = AgentIdentity::new(
            AgentRole::Updater,
            1,
            UserCred::new("existing", "pw"),
            store,
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
        )
        .unwrap();
        identity.provision(&[]).await.unwrap();
    }

    #[test]
    fn test_advance_updates_shared_progress() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let shared = AgentShared::new(metrics.clone());
        let make = |id| {
            AgentIdentity::new(
                AgentRole::Writer,
                id,
                UserCred::new(format!("w{}", id), "pw"),
                MockStore::new(),
                1,
                shared.clone(),
            )
            .unwrap()
        };

        make(0).advance(3);
        make(1).advance(4);

        assert_eq!(shared.completed(), 7);
        assert_eq!(
            metrics
                .get(MetricKey::new(AgentRole::Writer, ops::DOCS_COMPLETED))
                .gauge,
            Some(7.0)
        );
    }
}
