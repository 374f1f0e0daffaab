use super::notify::Notification;
use super::{Agent, AgentIdentity, AgentRole};
use crate::error::{AgentError, AgentErrorKind};
use crate::metrics::ops;
use crate::rate::RateScheduler;
use crate::tracker::UpdateTracker;
use async_trait::async_trait;
use chrono::Utc;
use docload_interfaces::{DataStore, Document};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const UPDATED_AT_FIELD: &str = "updated_at";

/// Pushes new revisions of the documents announced to it until each has
/// received its full number of updates.
pub struct Updater<S> {
    identity: AgentIdentity<S>,
    channels: Vec<String>,
    notifications: mpsc::Receiver<Notification>,
    tracker: UpdateTracker,
    scheduler: RateScheduler,
    revs_per_update: usize,
    /// Documents routed to this updater, inserted or not
    expected_share: usize,
    announced: usize,
    abandoned: usize,
    updates: usize,
}

impl<S: DataStore + 'static> Updater<S> {
    pub fn new(
        identity: AgentIdentity<S>,
        channels: Vec<String>,
        notifications: mpsc::Receiver<Notification>,
        expected_share: usize,
        updates_per_doc: usize,
        revs_per_update: usize,
    ) -> Self {
        let scheduler = identity.scheduler();
        Self {
            identity,
            channels,
            notifications,
            tracker: UpdateTracker::new(updates_per_doc),
            scheduler,
            revs_per_update: revs_per_update.max(1),
            expected_share,
            announced: 0,
            abandoned: 0,
            updates: 0,
        }
    }

    pub fn tracker(&self) -> &UpdateTracker {
        &self.tracker
    }

    /// Successful document updates pushed
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn all_announced(&self) -> bool {
        self.announced >= self.expected_share
    }

    fn accept(&mut self, notification: Notification) {
        self.announced += 1;
        match notification {
            Notification::Inserted { pair, channels, .. } => {
                if !self.tracker.track(&pair, channels) {
                    warn!(agent_id = self.identity.id(), doc_id = %pair.id, "duplicate insert notification");
                }
            }
            Notification::Abandoned { .. } => self.abandoned += 1,
        }
    }

    /// Take everything already queued without waiting
    fn drain(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            self.accept(notification);
        }
    }

    /// Wait for the next notification; the queue closing early is fatal
    async fn await_notification(&mut self) -> Result<(), AgentError> {
        match self.notifications.recv().await {
            Some(notification) => {
                self.accept(notification);
                Ok(())
            }
            None => Err(self.identity.error(
                "await_notification",
                AgentErrorKind::NotificationsClosed {
                    received: self.announced,
                    expected: self.expected_share,
                },
            )),
        }
    }

    async fn update_batch(&mut self, ids: Vec<String>) -> Result<(), AgentError> {
        self.scheduler.pace().await;

        let now = Utc::now().to_rfc3339();
        let mut docs = Vec::with_capacity(ids.len());
        let mut revisions = HashMap::with_capacity(ids.len());
        for id in &ids {
            let mut doc: Document = self
                .tracker
                .prepare_update(id, self.revs_per_update)
                .map_err(|kind| self.identity.error("prepare_update", kind))?;
            doc.insert(UPDATED_AT_FIELD, now.clone());
            if let Some(rev) = doc.revision() {
                revisions.insert(id.clone(), rev.to_string());
            }
            docs.push(doc);
        }

        let start = Instant::now();
        let store = self.identity.store();
        let batch = &docs;
        let outcome = self
            .identity
            .policy()
            .run("bulk_update", move |_| store.bulk_update_documents(batch.clone()))
            .await
            .map_err(|kind| self.identity.error("bulk_update", kind))?;

        // Skipped batches stay eligible and are picked again
        let Some(results) = outcome else {
            return Ok(());
        };
        self.identity.record_timing(ops::BATCH_UPDATE, start.elapsed());

        let rejected: HashMap<String, String> = results
            .into_iter()
            .filter(|pair| !pair.is_ok())
            .map(|pair| (pair.id.clone(), pair.to_string()))
            .collect();

        let mut applied = 0;
        for (id, rev) in revisions {
            if let Some(reason) = rejected.get(&id) {
                warn!(agent_id = self.identity.id(), %reason, "update rejected");
                continue;
            }
            self.tracker
                .record_update(&id, rev)
                .map_err(|kind| self.identity.error("bulk_update", kind))?;
            applied += 1;
        }

        self.updates += applied;
        self.identity.increment(ops::DOCS_UPDATED, applied);
        self.identity.advance(applied);
        debug!(
            agent_id = self.identity.id(),
            batch_len = ids.len(),
            applied,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch updated"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: DataStore + 'static> Agent for Updater<S> {
    fn role(&self) -> AgentRole {
        AgentRole::Updater
    }

    fn id(&self) -> usize {
        self.identity.id()
    }

    async fn run(&mut self) -> Result<(), AgentError> {
        self.identity.provision(&self.channels).await?;

        loop {
            self.drain();
            if self.is_done() {
                break;
            }

            let ready = self.tracker.select_ready(self.identity.batch_size());
            if ready.is_empty() {
                self.await_notification().await?;
                continue;
            }
            self.update_batch(ready).await?;
        }

        info!(
            agent_id = self.identity.id(),
            documents = self.tracker.len(),
            abandoned = self.abandoned,
            updates = self.updates,
            "updater finished"
        );
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.all_announced() && self.tracker.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{notification_queues, AgentShared};
    use crate::metrics::{InMemoryMetrics, MetricKey, NoopMetrics};
    use docload_interfaces::testing::{InMemoryDataStore, MockStore};
    use docload_interfaces::{DocumentRevisionPair, UserCred};
    use std::sync::Arc;

    fn updater_with<S: DataStore + 'static>(
        store: S,
        batch_size: usize,
        notifications: mpsc::Receiver<Notification>,
        share: usize,
        updates_per_doc: usize,
        revs: usize,
        shared: AgentShared,
    ) -> Updater<S> {
        let identity = AgentIdentity::new(
            AgentRole::Updater,
            0,
            UserCred::new("updater-0", "pw"),
            store,
            batch_size,
            shared,
        )
        .unwrap();
        Updater::new(identity, Vec::new(), notifications, share, updates_per_doc, revs)
    }

    async fn insert(store: &InMemoryDataStore, n: usize) -> Vec<Notification> {
        let mut writer = store.clone();
        let cred = UserCred::new("writer", "pw");
        store.add_user(&cred);
        writer.set_user_creds(cred);

        let mut out = Vec::new();
        for doc_num in 0..n as u64 {
            let mut doc = Document::new();
            doc.set_doc_num(doc_num);
            doc.set_channels(&["c"]);
            let pair = writer.create_document(doc).await.unwrap();
            out.push(Notification::Inserted {
                doc_num,
                pair,
                channels: vec!["c".to_string()],
            });
        }
        out
    }

    #[tokio::test]
    async fn test_updates_every_document_to_budget() {
        let store = InMemoryDataStore::new();
        store.add_user(&UserCred::new("updater-0", "pw"));
        let notifications = insert(&store, 5).await;

        let (notifier, mut receivers) = notification_queues(1, 16);
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut updater = updater_with(
            store.clone(),
            2,
            receivers.remove(0),
            5,
            3,
            2,
            AgentShared::new(metrics.clone()),
        );

        let ids: Vec<String> = notifications
            .iter()
            .filter_map(|n| match n {
                Notification::Inserted { pair, .. } => Some(pair.id.clone()),
                Notification::Abandoned { .. } => None,
            })
            .collect();
        let feeder = tokio::spawn(async move {
            for notification in notifications {
                notifier.notify(notification).await;
            }
        });
        updater.run().await.unwrap();
        feeder.await.unwrap();

        assert!(updater.is_done());
        assert_eq!(updater.updates(), 15);
        assert_eq!(ids.len(), 5);
        for id in &ids {
            assert_eq!(store.update_count(id), Some(3));
            // Three updates of two revisions each on top of generation 1
            assert!(store.revision_of(id).unwrap().starts_with("7-"));
        }
        assert_eq!(
            metrics
                .get(MetricKey::new(AgentRole::Updater, ops::DOCS_UPDATED))
                .count,
            15
        );
    }

    #[tokio::test]
    async fn test_abandoned_documents_count_toward_share() {
        let mut store = MockStore::new();
        store.expect_set_user_creds().return_const(());
        store
            .expect_bulk_update_documents()
            .times(1)
            .returning(|docs| {
                Ok(docs
                    .iter()
                    .map(|d| DocumentRevisionPair::new(d.id().unwrap_or_default(), d.revision().unwrap_or_default()))
                    .collect())
            });

        let (notifier, mut receivers) = notification_queues(1, 4);
        notifier
            .notify(Notification::Inserted {
                doc_num: 0,
                pair: DocumentRevisionPair::new("doc-0", "1-a"),
                channels: Vec::new(),
            })
            .await;
        notifier.notify(Notification::Abandoned { doc_num: 1 }).await;

        let mut updater = updater_with(
            store,
            4,
            receivers.remove(0),
            2,
            1,
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
        );
        updater.run().await.unwrap();
        assert!(updater.is_done());
        assert_eq!(updater.updates(), 1);
    }

    #[tokio::test]
    async fn test_queue_closed_before_share_is_fatal() {
        let mut store = MockStore::new();
        store.expect_set_user_creds().return_const(());

        let (notifier, mut receivers) = notification_queues(1, 4);
        drop(notifier);

        let mut updater = updater_with(
            store,
            1,
            receivers.remove(0),
            3,
            1,
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
        );
        let err = updater.run().await.unwrap_err();
        assert!(matches!(
            err.kind,
            AgentErrorKind::NotificationsClosed {
                received: 0,
                expected: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_rejected_update_is_retried() {
        let mut store = MockStore::new();
        store.expect_set_user_creds().return_const(());
        let mut call = 0;
        store
            .expect_bulk_update_documents()
            .times(2)
            .returning(move |docs| {
                call += 1;
                let doc = &docs[0];
                let mut pair = DocumentRevisionPair::new(
                    doc.id().unwrap_or_default(),
                    doc.revision().unwrap_or_default(),
                );
                if call == 1 {
                    pair.error = Some("conflict".to_string());
                }
                Ok(vec![pair])
            });

        let (notifier, mut receivers) = notification_queues(1, 4);
        notifier
            .notify(Notification::Inserted {
                doc_num: 0,
                pair: DocumentRevisionPair::new("doc-0", "1-a"),
                channels: Vec::new(),
            })
            .await;

        let mut updater = updater_with(
            store,
            1,
            receivers.remove(0),
            1,
            1,
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
        );
        updater.run().await.unwrap();
        assert_eq!(updater.tracker().status("doc-0").map(|s| s.num_updates), Some(1));
    }
}
