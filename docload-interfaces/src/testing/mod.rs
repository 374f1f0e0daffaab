//! Testing utilities for docload-interfaces
//!
//! - [`InMemoryDataStore`] - a shared, in-process document service with a
//!   changes feed, user accounts and failure injection, for whole-scenario
//!   tests
//! - [`MockStore`] - a `mockall` mock of [`crate::DataStore`] for call-level
//!   assertions
//!
//! ```toml
//! [dev-dependencies]
//! docload-interfaces = { path = "../docload-interfaces", features = ["testing"] }
//! ```

pub mod memory;
pub mod mocks;

pub use memory::{CallCounts, InMemoryDataStore};
pub use mocks::MockStore;
