//! # docload interfaces
//!
//! The seam between the load generation engine and the document service it
//! drives. The engine depends only on the [`DataStore`] trait; the HTTP
//! adapter lives in `docload-http` and an in-memory implementation for tests
//! lives behind the `testing` feature.
//!
//! ## Main Interfaces
//!
//! - [`DataStore`] - capability set an agent uses against the service
//! - [`ChangeCursor`] - opaque position in the changes feed
//! - [`Document`] - a JSON document with the reserved load-test fields

pub mod cursor;
pub mod datastore;
pub mod error;
pub mod types;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use cursor::ChangeCursor;
pub use datastore::{ChangesFeed, DataStore};
pub use error::{DataStoreError, DataStoreResult};
pub use types::{
    parse_revision, Change, ChangeRev, ChangeSet, Document, DocumentRevisionPair, UserCred,
};
