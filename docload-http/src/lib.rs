//! HTTP data store adapter for docload
//!
//! Implements [`docload_interfaces::DataStore`] against a document service
//! speaking the `_bulk_docs` / `_changes` / `_bulk_get` REST dialect, with user
//! provisioning through the admin endpoint.

pub mod client;
pub mod config;
pub mod wire;

// Re-export main types for convenience
pub use client::HttpDataStore;
pub use config::HttpStoreConfig;
