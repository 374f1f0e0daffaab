//! Document model shared by the engine and data store adapters

use chrono::{DateTime, Utc};
use docload_config::UserCredConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Reserved field holding the channel names a document is routed to
pub const CHANNELS_FIELD: &str = "channels";
/// Reserved field holding the synthetic document number
pub const DOC_NUM_FIELD: &str = "docNum";
/// Reserved field holding the creation timestamp
pub const CREATED_AT_FIELD: &str = "created_at";
/// Reserved field holding the size padding
pub const BODY_FIELD: &str = "body";

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";
const REVISIONS_FIELD: &str = "_revisions";

/// Username/password pair for one agent.
///
/// The empty credential is a distinguished invalid state; agents refuse to
/// start with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserCred {
    pub username: String,
    pub password: String,
}

impl UserCred {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl From<UserCredConfig> for UserCred {
    fn from(config: UserCredConfig) -> Self {
        Self::new(config.username, config.password)
    }
}

/// A JSON document: application fields plus the reserved load-test fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, JsonValue>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(JsonValue::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.insert(ID_FIELD, id.into());
    }

    pub fn revision(&self) -> Option<&str> {
        self.0.get(REV_FIELD).and_then(JsonValue::as_str)
    }

    pub fn set_revision(&mut self, rev: impl Into<String>) {
        self.insert(REV_FIELD, rev.into());
    }

    /// Attach an explicit revision history, newest first, for
    /// `new_edits: false` pushes
    pub fn set_revision_history(&mut self, start: u64, ids: Vec<String>) {
        self.insert(
            REVISIONS_FIELD,
            serde_json::json!({ "start": start, "ids": ids }),
        );
    }

    pub fn channels(&self) -> Vec<String> {
        self.0
            .get(CHANNELS_FIELD)
            .and_then(JsonValue::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_channels<S: AsRef<str>>(&mut self, channels: &[S]) {
        let names: Vec<JsonValue> = channels
            .iter()
            .map(|c| JsonValue::String(c.as_ref().to_string()))
            .collect();
        self.insert(CHANNELS_FIELD, names);
    }

    pub fn doc_num(&self) -> Option<u64> {
        self.0.get(DOC_NUM_FIELD).and_then(JsonValue::as_u64)
    }

    pub fn set_doc_num(&mut self, num: u64) {
        self.insert(DOC_NUM_FIELD, num);
    }

    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.insert(CREATED_AT_FIELD, at.to_rfc3339());
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.insert(BODY_FIELD, body.into());
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for Document {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// Outcome of one create or update: the document id and the revision the
/// service assigned, or the per-entry error it reported
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentRevisionPair {
    pub id: String,
    #[serde(default)]
    pub rev: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DocumentRevisionPair {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            error: None,
            reason: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.rev.is_empty()
    }

    /// The service refused the entry because the id is already taken
    pub fn is_conflict(&self) -> bool {
        self.error.as_deref() == Some("conflict")
    }
}

impl fmt::Display for DocumentRevisionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}@{}", self.id, self.rev),
            Some(err) => write!(
                f,
                "{}: {} ({})",
                self.id,
                err,
                self.reason.as_deref().unwrap_or("no reason")
            ),
        }
    }
}

/// One revision listed in a change entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

/// One entry of a changes feed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub seq: JsonValue,
    pub id: String,
    #[serde(default)]
    pub changes: Vec<ChangeRev>,
    #[serde(default)]
    pub deleted: bool,
}

impl Change {
    /// Whether the entry is the service's internal record for a user account
    pub fn is_user_doc(&self) -> bool {
        self.id.starts_with("_user/")
    }

    /// First (winning) revision listed for the entry
    pub fn latest_rev(&self) -> Option<&str> {
        self.changes.first().map(|c| c.rev.as_str())
    }
}

pub type ChangeSet = Vec<Change>;

/// Split a revision id into its generation and digest
pub fn parse_revision(rev: &str) -> Option<(u64, &str)> {
    let (generation, digest) = rev.split_once('-')?;
    let generation = generation.parse().ok()?;
    Some((generation, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_reserved_fields() {
        let mut doc = Document::new();
        doc.set_channels(&["0-abc", "1-abc"]);
        doc.set_doc_num(7);
        doc.set_body("xxxx");
        doc.insert("owner", "writer-1");

        assert_eq!(doc.channels(), vec!["0-abc", "1-abc"]);
        assert_eq!(doc.doc_num(), Some(7));
        assert_eq!(doc.id(), None);

        let wire = serde_json::to_value(&doc).unwrap();
        assert_eq!(wire["channels"], json!(["0-abc", "1-abc"]));
        assert_eq!(wire["docNum"], json!(7));
        assert_eq!(wire["body"], json!("xxxx"));
        assert_eq!(wire["owner"], json!("writer-1"));
    }

    #[test]
    fn test_revision_history() {
        let mut doc = Document::new();
        doc.set_id("doc-1");
        doc.set_revision("3-c");
        doc.set_revision_history(3, vec!["c".into(), "b".into(), "a".into()]);

        let wire = serde_json::to_value(&doc).unwrap();
        assert_eq!(wire["_revisions"], json!({"start": 3, "ids": ["c", "b", "a"]}));
        assert_eq!(doc.revision(), Some("3-c"));
    }

    #[test]
    fn test_user_doc_detection() {
        let change: Change =
            serde_json::from_value(json!({"seq": 3, "id": "_user/reader-1", "changes": []}))
                .unwrap();
        assert!(change.is_user_doc());

        let change: Change = serde_json::from_value(
            json!({"seq": 4, "id": "doc-9", "changes": [{"rev": "1-abc"}]}),
        )
        .unwrap();
        assert!(!change.is_user_doc());
        assert_eq!(change.latest_rev(), Some("1-abc"));
    }

    #[test]
    fn test_parse_revision() {
        assert_eq!(parse_revision("12-deadbeef"), Some((12, "deadbeef")));
        assert_eq!(parse_revision("nope"), None);
        assert_eq!(parse_revision("x-1"), None);
    }

    #[test]
    fn test_revision_pair_status() {
        assert!(DocumentRevisionPair::new("a", "1-x").is_ok());
        let conflict = DocumentRevisionPair {
            id: "a".into(),
            rev: String::new(),
            error: Some("conflict".into()),
            reason: Some("Document update conflict".into()),
        };
        assert!(!conflict.is_ok());
        assert!(conflict.is_conflict());
        assert!(!DocumentRevisionPair::new("a", "1-x").is_conflict());
        assert_eq!(conflict.to_string(), "a: conflict (Document update conflict)");
    }

    #[test]
    fn test_empty_cred() {
        assert!(UserCred::empty().is_empty());
        assert!(!UserCred::new("u", "p").is_empty());
    }
}
