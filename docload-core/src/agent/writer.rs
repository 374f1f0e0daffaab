use super::notify::{Notification, UpdateNotifier};
use super::{Agent, AgentIdentity, AgentRole};
use crate::error::{AgentError, AgentErrorKind};
use crate::metrics::ops;
use crate::rate::RateScheduler;
use async_trait::async_trait;
use docload_interfaces::{DataStore, DataStoreError, Document, DocumentRevisionPair};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Hands a writer its assigned documents one batch at a time, in assignment
/// order
pub struct DocumentFeeder {
    docs: Vec<Document>,
    batch_size: usize,
    batches: mpsc::Sender<Vec<Document>>,
}

impl DocumentFeeder {
    /// Returns the feeder and the receiving end for its writer
    pub fn new(docs: Vec<Document>, batch_size: usize) -> (Self, mpsc::Receiver<Vec<Document>>) {
        let (batches, receiver) = mpsc::channel(1);
        (
            Self {
                docs,
                batch_size: batch_size.max(1),
                batches,
            },
            receiver,
        )
    }

    pub async fn run(self) {
        let mut docs = self.docs.into_iter().peekable();
        while docs.peek().is_some() {
            let batch: Vec<Document> = docs.by_ref().take(self.batch_size).collect();
            if self.batches.send(batch).await.is_err() {
                // Writer gone; it reports its own failure
                return;
            }
        }
    }
}

/// Inserts its assigned documents and announces each result to the updaters
pub struct Writer<S> {
    identity: AgentIdentity<S>,
    channels: Vec<String>,
    batches: mpsc::Receiver<Vec<Document>>,
    notifier: UpdateNotifier,
    scheduler: RateScheduler,
    expected: usize,
    written: usize,
    failed: usize,
    calls: usize,
    exhausted: bool,
}

impl<S: DataStore + 'static> Writer<S> {
    /// `channels` are the channels of the assigned documents, granted to the
    /// writer's user
    pub fn new(
        identity: AgentIdentity<S>,
        channels: Vec<String>,
        expected: usize,
        batches: mpsc::Receiver<Vec<Document>>,
        notifier: UpdateNotifier,
    ) -> Self {
        let scheduler = identity.scheduler();
        Self {
            identity,
            channels,
            batches,
            notifier,
            scheduler,
            expected,
            written: 0,
            failed: 0,
            calls: 0,
            exhausted: false,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Documents that were not created, by a skipped batch or a per-entry error
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Remote insert calls made
    pub fn calls(&self) -> usize {
        self.calls
    }

    async fn write_batch(&mut self, batch: Vec<Document>) -> Result<(), AgentError> {
        self.scheduler.pace().await;

        let meta: Vec<(u64, Vec<String>)> = batch
            .iter()
            .map(|doc| (doc.doc_num().unwrap_or_default(), doc.channels()))
            .collect();

        let start = Instant::now();
        let store = self.identity.store();
        let docs = &batch;
        let operation = if docs.len() == 1 { "create_document" } else { "bulk_create" };
        self.calls += 1;
        let mut attempts = 0;
        let outcome = self
            .identity
            .policy()
            .run(operation, |attempt| {
                attempts = attempt;
                async move {
                    if docs.len() == 1 {
                        store.create_document(docs[0].clone()).await.map(|pair| vec![pair])
                    } else {
                        store.bulk_create_documents(docs.clone()).await
                    }
                }
            })
            .await
            .map_err(|kind| self.identity.error(operation, kind))?;
        let elapsed = start.elapsed();

        let Some(pairs) = outcome else {
            self.failed += batch.len();
            self.identity.increment(ops::DOCS_FAILED, batch.len());
            for (doc_num, _) in meta {
                self.notifier.notify(Notification::Abandoned { doc_num }).await;
            }
            return Ok(());
        };

        if pairs.len() != meta.len() {
            return Err(self.identity.error(
                operation,
                AgentErrorKind::DataStore(DataStoreError::invalid_response(
                    operation,
                    format!("{} results for {} documents", pairs.len(), meta.len()),
                )),
            ));
        }

        let pairs = if attempts > 1 {
            self.recover_conflicts(pairs).await?
        } else {
            pairs
        };

        self.identity.record_timing(ops::BATCH_WRITE, elapsed);
        let mut ok = 0;
        for ((doc_num, channels), pair) in meta.into_iter().zip(pairs) {
            self.notifier.notify(self.outcome(doc_num, channels, pair, &mut ok)).await;
        }
        self.written += ok;
        self.failed += batch.len() - ok;
        self.identity.increment(ops::DOCS_WRITTEN, ok);
        self.identity.increment(ops::DOCS_FAILED, batch.len() - ok);
        self.identity.advance(ok);

        debug!(
            agent_id = self.identity.id(),
            batch_len = batch.len(),
            written = ok,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch written"
        );
        Ok(())
    }

    /// A conflict on a re-sent batch means an earlier attempt committed the
    /// document and only its response was lost. Look up the revision it got.
    async fn recover_conflicts(
        &self,
        pairs: Vec<DocumentRevisionPair>,
    ) -> Result<Vec<DocumentRevisionPair>, AgentError> {
        let mut recovered = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if !pair.is_conflict() {
                recovered.push(pair);
                continue;
            }

            let store = self.identity.store();
            let id = pair.id.as_str();
            let current = self
                .identity
                .policy()
                .run("get_revision", move |_| store.get_revision(id))
                .await
                .map_err(|kind| self.identity.error("get_revision", kind))?;

            match current {
                Some(current) if current.is_ok() => {
                    debug!(agent_id = self.identity.id(), %current, "insert committed by an earlier attempt");
                    recovered.push(current);
                }
                _ => recovered.push(pair),
            }
        }
        Ok(recovered)
    }

    fn outcome(
        &self,
        doc_num: u64,
        channels: Vec<String>,
        pair: DocumentRevisionPair,
        ok: &mut usize,
    ) -> Notification {
        if pair.is_ok() {
            *ok += 1;
            Notification::Inserted {
                doc_num,
                pair,
                channels,
            }
        } else {
            warn!(agent_id = self.identity.id(), %pair, "document rejected");
            Notification::Abandoned { doc_num }
        }
    }
}

#[async_trait]
impl<S: DataStore + 'static> Agent for Writer<S> {
    fn role(&self) -> AgentRole {
        AgentRole::Writer
    }

    fn id(&self) -> usize {
        self.identity.id()
    }

    async fn run(&mut self) -> Result<(), AgentError> {
        let channels = std::mem::take(&mut self.channels);
        self.identity.provision(&channels).await?;

        while let Some(batch) = self.batches.recv().await {
            self.write_batch(batch).await?;
        }
        self.exhausted = true;

        info!(
            agent_id = self.identity.id(),
            written = self.written,
            failed = self.failed,
            calls = self.calls,
            "writer finished"
        );
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.exhausted && self.written + self.failed == self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::notification_queues;
    use crate::agent::AgentShared;
    use crate::distributor::{channel_names, distribute};
    use crate::metrics::{InMemoryMetrics, MetricKey, NoopMetrics};
    use crate::policy::BatchErrorPolicy;
    use docload_interfaces::testing::{InMemoryDataStore, MockStore};
    use docload_interfaces::UserCred;
    use std::sync::Arc;

    fn writer_with<S: DataStore + 'static>(
        store: S,
        docs: Vec<Document>,
        batch_size: usize,
        shared: AgentShared,
        notifier: UpdateNotifier,
    ) -> (Writer<S>, DocumentFeeder) {
        let expected = docs.len();
        let identity = AgentIdentity::new(
            AgentRole::Writer,
            0,
            UserCred::new("writer-0", "pw"),
            store,
            batch_size,
            shared,
        )
        .unwrap();
        let (feeder, batches) = DocumentFeeder::new(docs, batch_size);
        (
            Writer::new(identity, Vec::new(), expected, batches, notifier),
            feeder,
        )
    }

    fn docs(n: usize) -> Vec<Document> {
        distribute(1, &channel_names(1, "t"), n, 8, "t").unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_feeder_batches_in_order() {
        let (feeder, mut batches) = DocumentFeeder::new(docs(7), 3);
        tokio::spawn(feeder.run());

        let mut sizes = Vec::new();
        let mut nums = Vec::new();
        while let Some(batch) = batches.recv().await {
            sizes.push(batch.len());
            nums.extend(batch.iter().filter_map(Document::doc_num));
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(nums, (0..7).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_issues_ceil_k_over_b_bulk_calls() {
        let mut store = MockStore::new();
        store.expect_set_user_creds().return_const(());
        store
            .expect_bulk_create_documents()
            .times(3)
            .returning(|docs| {
                Ok(docs
                    .iter()
                    .enumerate()
                    .map(|(i, _)| DocumentRevisionPair::new(format!("d{}", i), "1-a"))
                    .collect())
            });
        // The last batch of 10 / 3 holds a single document
        store
            .expect_create_document()
            .times(1)
            .returning(|_| Ok(DocumentRevisionPair::new("last", "1-a")));

        let metrics = Arc::new(InMemoryMetrics::new());
        let (mut writer, feeder) = writer_with(
            store,
            docs(10),
            3,
            AgentShared::new(metrics.clone()),
            UpdateNotifier::disabled(),
        );
        tokio::spawn(feeder.run());

        writer.run().await.unwrap();
        assert!(writer.is_done());
        assert_eq!(writer.calls(), 4);
        assert_eq!(writer.written(), 10);
        assert_eq!(
            metrics
                .get(MetricKey::new(AgentRole::Writer, ops::DOCS_WRITTEN))
                .count,
            10
        );
        assert_eq!(
            metrics
                .get(MetricKey::new(AgentRole::Writer, ops::BATCH_WRITE))
                .calls,
            4
        );
    }

    #[tokio::test]
    async fn test_unbatched_writes_one_call_per_document() {
        let store = InMemoryDataStore::new();
        store.add_user(&UserCred::new("writer-0", "pw"));

        let (mut writer, feeder) = writer_with(
            store.clone(),
            docs(5),
            1,
            AgentShared::new(Arc::new(NoopMetrics)),
            UpdateNotifier::disabled(),
        );
        tokio::spawn(feeder.run());
        writer.run().await.unwrap();

        assert_eq!(store.calls().create_document, 5);
        assert_eq!(store.calls().bulk_create, 0);
        assert_eq!(store.document_count(), 5);
    }

    #[tokio::test]
    async fn test_notifies_updaters_of_inserts() {
        let store = InMemoryDataStore::new();
        store.add_user(&UserCred::new("writer-0", "pw"));
        let (notifier, mut receivers) = notification_queues(2, 16);

        let (mut writer, feeder) = writer_with(
            store,
            docs(6),
            4,
            AgentShared::new(Arc::new(NoopMetrics)),
            notifier,
        );
        tokio::spawn(feeder.run());
        writer.run().await.unwrap();
        drop(writer);

        for (index, receiver) in receivers.iter_mut().enumerate() {
            let mut count = 0;
            while let Some(notification) = receiver.recv().await {
                assert_eq!(notification.doc_num() % 2, index as u64);
                assert!(matches!(notification, Notification::Inserted { .. }));
                count += 1;
            }
            assert_eq!(count, 3);
        }
    }

    #[tokio::test]
    async fn test_skipped_batch_is_abandoned() {
        let store = InMemoryDataStore::new();
        store.add_user(&UserCred::new("writer-0", "pw"));
        store.fail_next_bulk_creates(1);
        let (notifier, mut receivers) = notification_queues(1, 16);

        let (mut writer, feeder) = writer_with(
            store.clone(),
            docs(4),
            2,
            AgentShared::new(Arc::new(NoopMetrics)).with_policy(BatchErrorPolicy::Skip),
            notifier,
        );
        tokio::spawn(feeder.run());
        writer.run().await.unwrap();

        assert!(writer.is_done());
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.failed(), 2);
        assert_eq!(store.document_count(), 2);
        drop(writer);

        let mut abandoned = 0;
        while let Some(notification) = receivers[0].recv().await {
            if matches!(notification, Notification::Abandoned { .. }) {
                abandoned += 1;
            }
        }
        assert_eq!(abandoned, 2);
    }

    #[tokio::test]
    async fn test_failed_batch_aborts() {
        let store = InMemoryDataStore::new();
        store.add_user(&UserCred::new("writer-0", "pw"));
        store.fail_next_bulk_creates(1);

        let (mut writer, feeder) = writer_with(
            store,
            docs(4),
            2,
            AgentShared::new(Arc::new(NoopMetrics)).with_policy(BatchErrorPolicy::Abort),
            UpdateNotifier::disabled(),
        );
        tokio::spawn(feeder.run());

        let err = writer.run().await.unwrap_err();
        assert_eq!(err.role, AgentRole::Writer);
        assert_eq!(err.operation, "bulk_create");
        assert!(!writer.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_response_is_not_written_twice() {
        let mut store = MockStore::new();
        store.expect_set_user_creds().return_const(());

        let mut attempt = 0;
        store
            .expect_bulk_create_documents()
            .times(2)
            .returning(move |docs| {
                attempt += 1;
                if attempt == 1 {
                    return Err(DataStoreError::Timeout("response lost".to_string()));
                }
                let first = docs[0].id().unwrap_or_default().to_string();
                Ok(vec![
                    DocumentRevisionPair {
                        id: first,
                        rev: String::new(),
                        error: Some("conflict".to_string()),
                        reason: Some("Document exists".to_string()),
                    },
                    DocumentRevisionPair::new(docs[1].id().unwrap_or_default(), "1-b"),
                ])
            });
        store
            .expect_get_revision()
            .times(1)
            .withf(|id| id.to_string() == "t-0")
            .returning(|id| Ok(DocumentRevisionPair::new(id, "1-a")));

        let retry = BatchErrorPolicy::from_config(&docload_config::BatchErrorPolicyConfig::Retry {
            max_attempts: 3,
            initial_delay_ms: std::time::Duration::from_millis(10),
            max_delay_ms: std::time::Duration::from_millis(50),
        });
        let (notifier, mut receivers) = notification_queues(1, 16);
        let (mut writer, feeder) = writer_with(
            store,
            docs(2),
            2,
            AgentShared::new(Arc::new(NoopMetrics)).with_policy(retry),
            notifier,
        );
        tokio::spawn(feeder.run());
        writer.run().await.unwrap();

        assert!(writer.is_done());
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.failed(), 0);
        drop(writer);

        let mut revs = Vec::new();
        while let Some(notification) = receivers[0].recv().await {
            match notification {
                Notification::Inserted { pair, .. } => revs.push(pair.rev),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(revs, vec!["1-a", "1-b"]);
    }
}
