//! HTTP data store implementation

use crate::config::HttpStoreConfig;
use crate::wire::{self, BulkDocsRequest, BulkGetRequest, CreateUserRequest};
use async_trait::async_trait;
use docload_interfaces::{
    ChangeCursor, ChangeSet, ChangesFeed, DataStore, DataStoreError, DataStoreResult, Document,
    DocumentRevisionPair, UserCred,
};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

/// Data store handle talking to the document service over HTTP.
///
/// Cloning is cheap: clones share the connection pool but carry their own
/// credentials and changes feed options.
#[derive(Debug, Clone)]
pub struct HttpDataStore {
    client: Client,
    config: HttpStoreConfig,
    creds: Option<UserCred>,
    feed: ChangesFeed,
}

impl HttpDataStore {
    /// Create a new handle with the given configuration
    pub fn new(config: HttpStoreConfig) -> DataStoreResult<Self> {
        debug!(
            url = %config.url,
            admin_url = %config.admin_url,
            timeout_secs = config.timeout.as_secs(),
            "Creating HTTP data store"
        );

        for (name, url) in [("url", &config.url), ("admin_url", &config.admin_url)] {
            reqwest::Url::parse(url)
                .map_err(|e| DataStoreError::InvalidUrl(format!("{} {}: {}", name, url, e)))?;
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            config,
            creds: None,
            feed: ChangesFeed::default(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url, path)
    }

    /// Attach the handle's credentials, failing if none were set
    fn authed(&self, request: RequestBuilder, operation: &'static str) -> DataStoreResult<RequestBuilder> {
        let cred = self
            .creds
            .as_ref()
            .ok_or(DataStoreError::MissingCredentials(operation))?;
        Ok(request.basic_auth(&cred.username, Some(&cred.password)))
    }

    async fn send(&self, request: RequestBuilder, operation: &'static str) -> DataStoreResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        trace!(operation, status = status.as_u16(), "response received");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DataStoreError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json(&self, request: RequestBuilder, operation: &'static str) -> DataStoreResult<JsonValue> {
        self.send(request, operation)
            .await?
            .json::<JsonValue>()
            .await
            .map_err(|e| DataStoreError::invalid_response(operation, e.to_string()))
    }

    async fn bulk_docs(
        &self,
        docs: Vec<Document>,
        new_edits: bool,
        operation: &'static str,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
        let expected = docs.len();
        let request = self
            .client
            .post(self.endpoint("_bulk_docs"))
            .json(&BulkDocsRequest {
                new_edits,
                docs: &docs,
            });
        let body = self.send_json(self.authed(request, operation)?, operation).await?;
        wire::parse_bulk_docs(body, expected, operation)
    }
}

/// Map a transport failure onto the port's error type
fn transport_error(error: reqwest::Error) -> DataStoreError {
    if error.is_timeout() {
        DataStoreError::Timeout(error.to_string())
    } else {
        DataStoreError::Network(error.to_string())
    }
}

#[async_trait]
impl DataStore for HttpDataStore {
    async fn create_user(&self, cred: &UserCred, channel_names: &[String]) -> DataStoreResult<()> {
        debug!(username = %cred.username, channels = channel_names.len(), "Creating user");

        let request = self
            .client
            .post(format!("{}/_user/", self.config.admin_url))
            .json(&CreateUserRequest {
                name: &cred.username,
                password: &cred.password,
                admin_channels: channel_names,
            });
        self.send(request, "create_user").await?;
        Ok(())
    }

    async fn create_document(&self, doc: Document) -> DataStoreResult<DocumentRevisionPair> {
        let request = self.client.post(format!("{}/", self.config.url)).json(&doc);
        let body = self
            .send_json(self.authed(request, "create_document")?, "create_document")
            .await?;
        serde_json::from_value(body)
            .map_err(|e| DataStoreError::invalid_response("create_document", e.to_string()))
    }

    async fn bulk_create_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
        self.bulk_docs(docs, true, "bulk_create").await
    }

    async fn bulk_update_documents(
        &self,
        docs: Vec<Document>,
    ) -> DataStoreResult<Vec<DocumentRevisionPair>> {
        self.bulk_docs(docs, false, "bulk_update").await
    }

    async fn changes(
        &self,
        since: &ChangeCursor,
        limit: usize,
    ) -> DataStoreResult<(ChangeSet, ChangeCursor)> {
        let query = wire::changes_query(since, limit, &self.feed, self.config.heartbeat_ms);
        let request = self.client.get(self.endpoint("_changes")).query(&query);
        let body = self.send_json(self.authed(request, "changes")?, "changes").await?;
        wire::parse_changes(body, since)
    }

    async fn get_revision(&self, id: &str) -> DataStoreResult<DocumentRevisionPair> {
        let mut url = reqwest::Url::parse(&self.config.url)
            .map_err(|e| DataStoreError::InvalidUrl(format!("url {}: {}", self.config.url, e)))?;
        url.path_segments_mut()
            .map_err(|_| DataStoreError::InvalidUrl(self.config.url.clone()))?
            .push(id);

        let request = self.client.get(url);
        let body = self
            .send_json(self.authed(request, "get_revision")?, "get_revision")
            .await?;
        wire::parse_document_revision(body)
    }

    async fn bulk_get_documents(&self, refs: &[DocumentRevisionPair]) -> DataStoreResult<()> {
        let request = self
            .client
            .post(self.endpoint("_bulk_get"))
            .query(&[("revs", "true")])
            .json(&BulkGetRequest::new(refs));
        let response = self.send(self.authed(request, "bulk_get")?, "bulk_get").await?;

        // Multipart body; drain it so the connection goes back to the pool
        response
            .bytes()
            .await
            .map_err(|e| DataStoreError::invalid_response("bulk_get", e.to_string()))?;
        Ok(())
    }

    fn set_user_creds(&mut self, cred: UserCred) {
        self.creds = Some(cred);
    }

    fn set_changes_feed(&mut self, feed: ChangesFeed) {
        self.feed = feed;
    }
}
