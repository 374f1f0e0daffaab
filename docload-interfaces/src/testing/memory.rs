//! In-process document service

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::types::parse_revision;
use crate::{
    Change, ChangeCursor, ChangeRev, ChangeSet, ChangesFeed, DataStore, DataStoreError,
    DataStoreResult, Document, DocumentRevisionPair, UserCred,
};
use docload_config::FeedType;

/// Number of calls made against the store, by operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_user: usize,
    pub create_document: usize,
    pub bulk_create: usize,
    pub bulk_update: usize,
    pub changes: usize,
    pub get_revision: usize,
    pub bulk_get: usize,
}

#[derive(Debug)]
struct StoredDoc {
    rev: String,
    seq: u64,
    channels: Vec<String>,
    updates: usize,
}

#[derive(Debug)]
struct StoredUser {
    password: String,
    channels: Vec<String>,
    seq: u64,
}

#[derive(Debug, Default)]
struct State {
    last_seq: u64,
    next_doc_id: u64,
    docs: HashMap<String, StoredDoc>,
    users: HashMap<String, StoredUser>,
    failing_users: HashSet<String>,
    bulk_create_failures: usize,
    lost_bulk_create_acks: usize,
    changes_failures: usize,
    calls: CallCounts,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    fn authenticate(&self, cred: Option<&UserCred>, operation: &'static str) -> DataStoreResult<()> {
        let cred = cred.ok_or(DataStoreError::MissingCredentials(operation))?;
        match self.users.get(&cred.username) {
            Some(user) if user.password == cred.password => Ok(()),
            _ => Err(DataStoreError::Status {
                operation,
                status: 401,
                body: format!("unknown user or bad password: {}", cred.username),
            }),
        }
    }

    fn insert_doc(&mut self, doc: &Document) -> DocumentRevisionPair {
        let id = match doc.id() {
            Some(id) => id.to_string(),
            None => {
                self.next_doc_id += 1;
                format!("mem-{:08}", self.next_doc_id)
            }
        };
        if self.docs.contains_key(&id) {
            return DocumentRevisionPair {
                id,
                rev: String::new(),
                error: Some("conflict".to_string()),
                reason: Some("Document exists".to_string()),
            };
        }

        let rev = format!("1-{}", digest());
        let seq = self.next_seq();
        self.docs.insert(
            id.clone(),
            StoredDoc {
                rev: rev.clone(),
                seq,
                channels: doc.channels(),
                updates: 0,
            },
        );
        DocumentRevisionPair::new(id, rev)
    }

    fn apply_revision(&mut self, doc: &Document) -> DocumentRevisionPair {
        let id = doc.id().unwrap_or_default().to_string();
        let rev = doc.revision().unwrap_or_default().to_string();
        let incoming = parse_revision(&rev).map(|(generation, _)| generation);

        let seq = self.next_seq();
        match self.docs.get_mut(&id) {
            Some(stored) => {
                let current = parse_revision(&stored.rev).map(|(generation, _)| generation);
                if incoming > current {
                    stored.rev = rev.clone();
                    stored.seq = seq;
                    stored.updates += 1;
                }
                DocumentRevisionPair::new(id, stored.rev.clone())
            }
            None => DocumentRevisionPair {
                id,
                rev: String::new(),
                error: Some("not_found".to_string()),
                reason: Some("missing".to_string()),
            },
        }
    }
}

fn digest() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    changed: Notify,
}

/// A document service kept in memory and shared between all handles cloned
/// from the same store.
///
/// Handles carry their own credentials and feed options, like separate HTTP
/// clients would. Longpoll requests with nothing to return wait until a write
/// lands or `longpoll_wait` passes.
#[derive(Debug, Clone)]
pub struct InMemoryDataStore {
    shared: Arc<Shared>,
    creds: Option<UserCred>,
    feed: ChangesFeed,
    longpoll_wait: Duration,
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            creds: None,
            feed: ChangesFeed::default(),
            longpoll_wait: Duration::from_millis(50),
        }
    }

    pub fn with_longpoll_wait(mut self, wait: Duration) -> Self {
        self.longpoll_wait = wait;
        self
    }

    /// Register a user directly, as if provisioned before the run
    pub fn add_user(&self, cred: &UserCred) {
        let mut state = self.shared.state.lock();
        let seq = state.next_seq();
        state.users.insert(
            cred.username.clone(),
            StoredUser {
                password: cred.password.clone(),
                channels: Vec::new(),
                seq,
            },
        );
    }

    /// Make `create_user` fail for this username
    pub fn fail_create_user(&self, username: impl Into<String>) {
        self.shared.state.lock().failing_users.insert(username.into());
    }

    /// Make the next `count` bulk creates fail with a 503
    pub fn fail_next_bulk_creates(&self, count: usize) {
        self.shared.state.lock().bulk_create_failures = count;
    }

    /// Commit the next `count` bulk creates but answer them with a timeout,
    /// as if the response was lost on the way back
    pub fn lose_next_bulk_create_acks(&self, count: usize) {
        self.shared.state.lock().lost_bulk_create_acks = count;
    }

    /// Make the next `count` changes requests fail with a 500
    pub fn fail_next_changes(&self, count: usize) {
        self.shared.state.lock().changes_failures = count;
    }

    pub fn calls(&self) -> CallCounts {
        self.shared.state.lock().calls.clone()
    }

    pub fn document_count(&self) -> usize {
        self.shared.state.lock().docs.len()
    }

    pub fn user_count(&self) -> usize {
        self.shared.state.lock().users.len()
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.shared.state.lock().users.contains_key(username)
    }

    /// Channels granted when the user was created
    pub fn granted_channels(&self, username: &str) -> Option<Vec<String>> {
        self.shared
            .state
            .lock()
            .users
            .get(username)
            .map(|u| u.channels.clone())
    }

    pub fn revision_of(&self, id: &str) -> Option<String> {
        self.shared.state.lock().docs.get(id).map(|d| d.rev.clone())
    }

    /// Number of accepted revision pushes for a document
    pub fn update_count(&self, id: &str) -> Option<usize> {
        self.shared.state.lock().docs.get(id).map(|d| d.updates)
    }

    /// Number of documents routed to a channel
    pub fn documents_in_channel(&self, channel: &str) -> usize {
        self.shared
            .state
            .lock()
            .docs
            .values()
            .filter(|d| d.channels.iter().any(|c| c == channel))
            .count()
    }

    fn collect_changes(&self, since: u64, limit: usize) -> (ChangeSet, u64) {
        let state = self.shared.state.lock();
        let filter = &self.feed.channels;

        let mut entries: Vec<Change> = state
            .docs
            .iter()
            .filter(|(_, d)| d.seq > since)
            .filter(|(_, d)| filter.is_empty() || d.channels.iter().any(|c| filter.contains(c)))
            .map(|(id, d)| Change {
                seq: JsonValue::from(d.seq),
                id: id.clone(),
                changes: vec![ChangeRev { rev: d.rev.clone() }],
                deleted: false,
            })
            .collect();

        if filter.is_empty() {
            entries.extend(state.users.iter().filter(|(_, u)| u.seq > since).map(
                |(name, u)| Change {
                    seq: JsonValue::from(u.seq),
                    id: format!("_user/{}", name),
                    changes: Vec::new(),
                    deleted: false,
                },
            ));
        }

        entries.sort_by_key(|c| c.seq.as_u64().unwrap_or_default());
        entries.truncate(limit);

        let last = entries
            .last()
            .and_then(|c| c.seq.as_u64())
            .unwrap_or(since);
        (entries, last)
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn create_user(&self, cred: &UserCred, channel_names: &[String]) -> DataStoreResult<()> {
        {
            let mut state = self.shared.state.lock();
            state.calls.create_user += 1;
            if state.failing_users.contains(&cred.username) {
                return Err(DataStoreError::Status {
                    operation: "create_user",
                    status: 500,
                    body: "injected failure".to_string(),
                });
            }
            let seq = state.next_seq();
            state.users.insert(
                cred.username.clone(),
                StoredUser {
                    password: cred.password.clone(),
                    channels: channel_names.to_vec(),
                    seq,
                },
            );
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn create_document(&self, doc: Document) -> DataStoreResult<DocumentRevisionPair> {
        let pair = {
            let mut state = self.shared.state.lock();
            state.calls.create_document += 1;
            state.authenticate(self.creds.as_ref(), "create_document")?;
            state.insert_doc(&doc)
        };
        self.shared.changed.notify_waiters();
        Ok(pair)
    }

    async fn bulk_create_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
        let (pairs, lost) = {
            let mut state = self.shared.state.lock();
            state.calls.bulk_create += 1;
            state.authenticate(self.creds.as_ref(), "bulk_create")?;
            if state.bulk_create_failures > 0 {
                state.bulk_create_failures -= 1;
                return Err(DataStoreError::Status {
                    operation: "bulk_create",
                    status: 503,
                    body: "injected failure".to_string(),
                });
            }
            let pairs = docs
                .iter()
                .map(|doc| state.insert_doc(doc))
                .collect::<Vec<_>>();
            let lost = state.lost_bulk_create_acks > 0;
            if lost {
                state.lost_bulk_create_acks -= 1;
            }
            (pairs, lost)
        };
        self.shared.changed.notify_waiters();
        if lost {
            return Err(DataStoreError::Timeout("injected lost response".to_string()));
        }
        Ok(pairs)
    }

    async fn bulk_update_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
        let pairs = {
            let mut state = self.shared.state.lock();
            state.calls.bulk_update += 1;
            state.authenticate(self.creds.as_ref(), "bulk_update")?;
            docs.iter()
                .map(|doc| state.apply_revision(doc))
                .collect::<Vec<_>>()
        };
        self.shared.changed.notify_waiters();
        Ok(pairs)
    }

    async fn changes(
        &self,
        since: &ChangeCursor,
        limit: usize,
    ) -> DataStoreResult<(ChangeSet, ChangeCursor)> {
        let since_seq = match since.as_value() {
            None => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                DataStoreError::invalid_response("changes", format!("foreign cursor {}", since))
            })?,
        };

        // Registered before the first look so a write landing in between
        // still wakes us
        let notified = self.shared.changed.notified();
        {
            let mut state = self.shared.state.lock();
            state.calls.changes += 1;
            state.authenticate(self.creds.as_ref(), "changes")?;
            if state.changes_failures > 0 {
                state.changes_failures -= 1;
                return Err(DataStoreError::Status {
                    operation: "changes",
                    status: 500,
                    body: "injected failure".to_string(),
                });
            }
        }

        let (entries, last) = self.collect_changes(since_seq, limit);
        if !entries.is_empty() || self.feed.feed == FeedType::Normal {
            return Ok((entries, ChangeCursor::from(last)));
        }

        let _ = tokio::time::timeout(self.longpoll_wait, notified).await;
        let (entries, last) = self.collect_changes(since_seq, limit);
        Ok((entries, ChangeCursor::from(last)))
    }

    async fn get_revision(&self, id: &str) -> DataStoreResult<DocumentRevisionPair> {
        let mut state = self.shared.state.lock();
        state.calls.get_revision += 1;
        state.authenticate(self.creds.as_ref(), "get_revision")?;
        match state.docs.get(id) {
            Some(stored) => Ok(DocumentRevisionPair::new(id, stored.rev.clone())),
            None => Err(DataStoreError::Status {
                operation: "get_revision",
                status: 404,
                body: format!("missing {}", id),
            }),
        }
    }

    async fn bulk_get_documents(&self, refs: &[DocumentRevisionPair]) -> DataStoreResult<()> {
        let mut state = self.shared.state.lock();
        state.calls.bulk_get += 1;
        state.authenticate(self.creds.as_ref(), "bulk_get")?;
        if let Some(missing) = refs.iter().find(|r| !state.docs.contains_key(&r.id)) {
            return Err(DataStoreError::Status {
                operation: "bulk_get",
                status: 404,
                body: format!("missing {}", missing.id),
            });
        }
        Ok(())
    }

    fn set_user_creds(&mut self, cred: UserCred) {
        self.creds = Some(cred);
    }

    fn set_changes_feed(&mut self, feed: ChangesFeed) {
        self.feed = feed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_in(channel: &str) -> Document {
        let mut doc = Document::new();
        doc.set_channels(&[channel]);
        doc
    }

    async fn logged_in(store: &InMemoryDataStore, name: &str) -> InMemoryDataStore {
        let cred = UserCred::new(name, "pw");
        store.create_user(&cred, &[]).await.unwrap();
        let mut handle = store.clone();
        handle.set_user_creds(cred);
        handle
    }

    #[tokio::test]
    async fn test_requires_provisioned_user() {
        let store = InMemoryDataStore::new();
        let err = store.create_document(doc_in("a")).await.unwrap_err();
        assert!(matches!(err, DataStoreError::MissingCredentials(_)));

        let mut stranger = store.clone();
        stranger.set_user_creds(UserCred::new("nobody", "pw"));
        let err = stranger.create_document(doc_in("a")).await.unwrap_err();
        assert!(matches!(err, DataStoreError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_changes_include_user_docs_and_filter_by_channel() {
        let store = InMemoryDataStore::new();
        let writer = logged_in(&store, "writer-0").await;
        writer
            .bulk_create_documents(vec![doc_in("a"), doc_in("b"), doc_in("a")])
            .await
            .unwrap();

        let mut reader = logged_in(&store, "reader-0").await;
        reader.set_changes_feed(ChangesFeed {
            feed: FeedType::Normal,
            channels: Vec::new(),
        });
        let (all, _) = reader.changes(&ChangeCursor::empty(), 100).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.iter().filter(|c| c.is_user_doc()).count(), 2);

        reader.set_changes_feed(ChangesFeed {
            feed: FeedType::Normal,
            channels: vec!["a".to_string()],
        });
        let (only_a, cursor) = reader.changes(&ChangeCursor::empty(), 100).await.unwrap();
        assert_eq!(only_a.len(), 2);

        let (rest, next) = reader.changes(&cursor, 100).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(next, cursor);
    }

    #[tokio::test]
    async fn test_changes_respects_limit() {
        let store = InMemoryDataStore::new();
        let writer = logged_in(&store, "w").await;
        let docs = (0..10).map(|_| doc_in("a")).collect();
        writer.bulk_create_documents(docs).await.unwrap();

        let mut reader = writer.clone();
        reader.set_changes_feed(ChangesFeed {
            feed: FeedType::Normal,
            channels: vec!["a".to_string()],
        });
        let (page1, cursor) = reader.changes(&ChangeCursor::empty(), 4).await.unwrap();
        let (page2, _) = reader.changes(&cursor, 100).await.unwrap();
        assert_eq!(page1.len(), 4);
        assert_eq!(page2.len(), 6);
    }

    #[tokio::test]
    async fn test_revision_push_moves_doc_to_feed_tail() {
        let store = InMemoryDataStore::new();
        let writer = logged_in(&store, "w").await;
        let pair = writer.create_document(doc_in("a")).await.unwrap();

        let mut update = Document::new();
        update.set_id(pair.id.clone());
        update.set_revision("3-ccc");
        let result = writer.bulk_update_documents(vec![update]).await.unwrap();

        assert_eq!(result[0].rev, "3-ccc");
        assert_eq!(store.update_count(&pair.id), Some(1));
        assert_eq!(store.revision_of(&pair.id).as_deref(), Some("3-ccc"));
    }

    #[tokio::test]
    async fn test_longpoll_wakes_on_write() {
        let store = InMemoryDataStore::new().with_longpoll_wait(Duration::from_secs(5));
        let writer = logged_in(&store, "w").await;

        let mut reader = writer.clone();
        reader.set_changes_feed(ChangesFeed {
            feed: FeedType::Longpoll,
            channels: vec!["a".to_string()],
        });

        let poll = tokio::spawn(async move { reader.changes(&ChangeCursor::empty(), 10).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.create_document(doc_in("a")).await.unwrap();

        let (entries, _) = poll.await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryDataStore::new();
        store.fail_create_user("writer-3");
        assert!(store
            .create_user(&UserCred::new("writer-3", "pw"), &[])
            .await
            .is_err());

        let writer = logged_in(&store, "w").await;
        store.fail_next_bulk_creates(1);
        assert!(writer.bulk_create_documents(vec![doc_in("a")]).await.is_err());
        assert!(writer.bulk_create_documents(vec![doc_in("a")]).await.is_ok());
        assert_eq!(store.calls().bulk_create, 2);
        assert_eq!(store.document_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_ack_commits_and_resend_conflicts() {
        let store = InMemoryDataStore::new();
        let writer = logged_in(&store, "w").await;
        let mut doc = doc_in("a");
        doc.set_id("s-0");

        store.lose_next_bulk_create_acks(1);
        let err = writer.bulk_create_documents(vec![doc.clone()]).await.unwrap_err();
        assert!(matches!(err, DataStoreError::Timeout(_)));
        assert_eq!(store.document_count(), 1);

        let resent = writer.bulk_create_documents(vec![doc]).await.unwrap();
        assert!(resent[0].is_conflict());
        assert_eq!(store.document_count(), 1);

        let current = writer.get_revision("s-0").await.unwrap();
        assert_eq!(Some(current.rev), store.revision_of("s-0"));
        assert!(writer.get_revision("s-1").await.is_err());
    }

    #[tokio::test]
    async fn test_create_user_records_grants() {
        let store = InMemoryDataStore::new();
        store
            .create_user(&UserCred::new("r", "pw"), &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.granted_channels("r"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(store.granted_channels("nobody"), None);
    }
}
