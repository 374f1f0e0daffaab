//! Request and response shapes of the document service

use docload_interfaces::{
    ChangeCursor, ChangeSet, ChangesFeed, DataStoreError, Document, DocumentRevisionPair,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Server-side filter selecting changes by channel
pub const CHANNEL_FILTER: &str = "sync_gateway/bychannel";

/// `_changes` style returning every leaf revision
pub const CHANGES_STYLE: &str = "all_docs";

/// Body of a `_bulk_docs` request
#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<'a> {
    pub new_edits: bool,
    pub docs: &'a [Document],
}

/// Body of an admin `_user/` request
#[derive(Debug, Serialize)]
pub struct CreateUserRequest<'a> {
    pub name: &'a str,
    pub password: &'a str,
    pub admin_channels: &'a [String],
}

/// Body of a `_bulk_get` request
#[derive(Debug, Serialize)]
pub struct BulkGetRequest<'a> {
    pub docs: Vec<BulkGetEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct BulkGetEntry<'a> {
    pub id: &'a str,
    pub rev: &'a str,
}

impl<'a> BulkGetRequest<'a> {
    pub fn new(refs: &'a [DocumentRevisionPair]) -> Self {
        Self {
            docs: refs
                .iter()
                .map(|r| BulkGetEntry {
                    id: &r.id,
                    rev: &r.rev,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    results: ChangeSet,
    #[serde(default)]
    last_seq: JsonValue,
}

/// Query parameters of a `_changes` request
pub fn changes_query(
    since: &ChangeCursor,
    limit: usize,
    feed: &ChangesFeed,
    heartbeat_ms: u64,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("feed", feed.feed.as_str().to_string()),
        ("limit", limit.to_string()),
        ("heartbeat", heartbeat_ms.to_string()),
        ("style", CHANGES_STYLE.to_string()),
    ];

    if !since.is_empty() {
        query.push(("since", since.to_string()));
    }

    if !feed.channels.is_empty() {
        query.push(("filter", CHANNEL_FILTER.to_string()));
        query.push(("channels", feed.channels.join(",")));
    }

    query
}

/// Parse a `_changes` response body into entries and the next cursor.
///
/// A response without `last_seq` leaves the caller where it was.
pub fn parse_changes(
    body: JsonValue,
    since: &ChangeCursor,
) -> Result<(ChangeSet, ChangeCursor), DataStoreError> {
    let response: ChangesResponse = serde_json::from_value(body)
        .map_err(|e| DataStoreError::invalid_response("changes", e.to_string()))?;

    let next = match response.last_seq {
        JsonValue::Null => since.clone(),
        seq => ChangeCursor::from_value(seq),
    };
    Ok((response.results, next))
}

/// Parse a `_bulk_docs` response, checking it lines up with the request
pub fn parse_bulk_docs(
    body: JsonValue,
    expected: usize,
    operation: &'static str,
) -> Result<Vec<DocumentRevisionPair>, DataStoreError> {
    let pairs: Vec<DocumentRevisionPair> = serde_json::from_value(body)
        .map_err(|e| DataStoreError::invalid_response(operation, e.to_string()))?;

    if pairs.len() != expected {
        return Err(DataStoreError::invalid_response(
            operation,
            format!("expected {} results, got {}", expected, pairs.len()),
        ));
    }
    Ok(pairs)
}

#[derive(Debug, Deserialize)]
struct DocumentHead {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev")]
    rev: String,
}

/// Read the id and current revision out of a fetched document body
pub fn parse_document_revision(body: JsonValue) -> Result<DocumentRevisionPair, DataStoreError> {
    let head: DocumentHead = serde_json::from_value(body)
        .map_err(|e| DataStoreError::invalid_response("get_revision", e.to_string()))?;
    Ok(DocumentRevisionPair::new(head.id, head.rev))
}
