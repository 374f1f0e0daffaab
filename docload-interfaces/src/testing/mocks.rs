//! Mock data store using the mockall framework

use async_trait::async_trait;
use mockall::mock;

use crate::{
    ChangeCursor, ChangeSet, ChangesFeed, DataStore, DataStoreResult, Document,
    DocumentRevisionPair, UserCred,
};

mock! {
    pub Store {}

    #[async_trait]
    impl DataStore for Store {
        async fn create_user(&self, cred: &UserCred, channel_names: &[String]) -> DataStoreResult<()>;
        async fn create_document(&self, doc: Document) -> DataStoreResult<DocumentRevisionPair>;
        async fn bulk_create_documents(&self, docs: Vec<Document>) -> DataStoreResult<Vec<DocumentRevisionPair>>;
        async fn bulk_update_documents(&self, docs: Vec<Document>) -> DataStoreResult<Vec<DocumentRevisionPair>>;
        async fn changes(&self, since: &ChangeCursor, limit: usize) -> DataStoreResult<(ChangeSet, ChangeCursor)>;
        async fn get_revision(&self, id: &str) -> DataStoreResult<DocumentRevisionPair>;
        async fn bulk_get_documents(&self, refs: &[DocumentRevisionPair]) -> DataStoreResult<()>;
        fn set_user_creds(&mut self, cred: UserCred);
        fn set_changes_feed(&mut self, feed: ChangesFeed);
    }
}
