//! Bounded concurrency around user provisioning

use crate::error::AgentErrorKind;
use docload_interfaces::{DataStore, UserCred};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Permit pool shared by every agent of a run.
///
/// Each create-user call holds one permit for its duration, released on
/// success and failure alike.
#[derive(Debug, Clone)]
pub struct ProvisioningThrottle {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ProvisioningThrottle {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Create a user while holding a permit
    pub async fn provision<S>(
        &self,
        store: &S,
        cred: &UserCred,
        channel_names: &[String],
    ) -> Result<(), AgentErrorKind>
    where
        S: DataStore + ?Sized,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AgentErrorKind::ThrottleClosed)?;
        debug!(username = %cred.username, available = self.available(), "provisioning user");

        store
            .create_user(cred, channel_names)
            .await
            .map_err(AgentErrorKind::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docload_interfaces::testing::MockStore;
    use docload_interfaces::{
        ChangeCursor, ChangeSet, ChangesFeed, DataStoreError, DataStoreResult, Document,
        DocumentRevisionPair,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_permit_released_after_failure() {
        let mut store = MockStore::new();
        store.expect_create_user().times(1).returning(|_, _| {
            Err(DataStoreError::Status {
                operation: "create_user",
                status: 500,
                body: String::new(),
            })
        });

        let throttle = ProvisioningThrottle::new(1);
        let result = throttle
            .provision(&store, &UserCred::new("writer-0", "pw"), &[])
            .await;

        assert!(matches!(result, Err(AgentErrorKind::DataStore(_))));
        assert_eq!(throttle.available(), 1);
    }

    /// Store whose create-user takes a while and records its concurrency
    #[derive(Default)]
    struct SlowStore {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DataStore for SlowStore {
        async fn create_user(&self, _cred: &UserCred, _channels: &[String]) -> DataStoreResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create_document(&self, _doc: Document) -> DataStoreResult<DocumentRevisionPair> {
            unimplemented!()
        }

        async fn bulk_create_documents(
            &self,
            _docs: Vec<Document>,
        ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
            unimplemented!()
        }

        async fn bulk_update_documents(
            &self,
            _docs: Vec<Document>,
        ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
            unimplemented!()
        }

        async fn changes(
            &self,
            _since: &ChangeCursor,
            _limit: usize,
        ) -> DataStoreResult<(ChangeSet, ChangeCursor)> {
            unimplemented!()
        }

        async fn get_revision(&self, _id: &str) -> DataStoreResult<DocumentRevisionPair> {
            unimplemented!()
        }

        async fn bulk_get_documents(&self, _refs: &[DocumentRevisionPair]) -> DataStoreResult<()> {
            unimplemented!()
        }

        fn set_user_creds(&mut self, _cred: UserCred) {}

        fn set_changes_feed(&mut self, _feed: ChangesFeed) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_capacity() {
        let store = Arc::new(SlowStore::default());
        let throttle = ProvisioningThrottle::new(3);

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let throttle = throttle.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    throttle
                        .provision(store.as_ref(), &UserCred::new(format!("u{}", i), "pw"), &[])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.peak.load(Ordering::SeqCst), 3);
        assert_eq!(throttle.available(), 3);
    }
}
