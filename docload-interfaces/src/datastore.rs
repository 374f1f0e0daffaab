//! Data store port

use crate::cursor::ChangeCursor;
use crate::error::DataStoreResult;
use crate::types::{ChangeSet, Document, DocumentRevisionPair, UserCred};
use async_trait::async_trait;
use docload_config::FeedType;

/// Changes feed options bound to one agent's handle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangesFeed {
    pub feed: FeedType,
    /// Channel filter; empty means the unfiltered feed
    pub channels: Vec<String>,
}

/// Capability set the load generation engine uses against a document service.
///
/// Every agent owns its own handle (cloned from a prototype by the scenario
/// runner) so per-agent state such as credentials and feed options never needs
/// locking.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Provision a user with access to the given channels
    async fn create_user(&self, cred: &UserCred, channel_names: &[String]) -> DataStoreResult<()>;

    /// Create a single document
    async fn create_document(&self, doc: Document) -> DataStoreResult<DocumentRevisionPair>;

    /// Create documents in one call (`new_edits: true`); results are in
    /// submission order
    async fn bulk_create_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>>;

    /// Push documents carrying explicit revision histories in one call
    /// (`new_edits: false`)
    async fn bulk_update_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>>;

    /// Poll the changes feed from `since`, returning the entries and the
    /// cursor to resume from
    async fn changes(
        &self,
        since: &ChangeCursor,
        limit: usize,
    ) -> DataStoreResult<(ChangeSet, ChangeCursor)>;

    /// Current revision of a document
    async fn get_revision(&self, id: &str) -> DataStoreResult<DocumentRevisionPair>;

    /// Fetch the given revisions in one call
    async fn bulk_get_documents(&self, refs: &[DocumentRevisionPair]) -> DataStoreResult<()>;

    /// Credentials used for every non-admin call made through this handle
    fn set_user_creds(&mut self, cred: UserCred);

    /// Feed mode and channel filter used by [`DataStore::changes`]
    fn set_changes_feed(&mut self, feed: ChangesFeed);
}
