//! Changes feed cursor

use serde_json::Value as JsonValue;
use std::fmt;

/// Opaque position in a changes feed.
///
/// Wraps whatever the service returned as `last_seq` (a number or a string,
/// depending on the service) without interpreting it. A cursor is replaced
/// after every poll and never mutated; two cursors are compared only through
/// their own equality.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeCursor(Option<JsonValue>);

impl ChangeCursor {
    /// Start-of-feed cursor
    pub fn empty() -> Self {
        Self(None)
    }

    /// Cursor from a `last_seq` value; JSON `null` and `""` mean start-of-feed
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::empty(),
            JsonValue::String(ref s) if s.is_empty() => Self::empty(),
            other => Self(Some(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Raw value, suitable for echoing back to the service
    pub fn as_value(&self) -> Option<&JsonValue> {
        self.0.as_ref()
    }
}

impl fmt::Display for ChangeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => Ok(()),
            Some(JsonValue::String(s)) => f.write_str(s),
            Some(other) => write!(f, "{}", other),
        }
    }
}

impl From<u64> for ChangeCursor {
    fn from(seq: u64) -> Self {
        Self(Some(JsonValue::from(seq)))
    }
}

impl From<&str> for ChangeCursor {
    fn from(seq: &str) -> Self {
        Self::from_value(JsonValue::String(seq.to_string()))
    }
}
