//! Logging initialisation for docload
//!
//! Builds a `tracing` subscriber from [`LoggingConfig`]: an env filter plus one
//! formatting layer per configured target. File targets write through a
//! non-blocking appender whose guard must be held for the life of the process.

pub mod init;

pub use docload_config::{LogFormat, LogLevel, LogTarget, LoggingConfig};
pub use init::{init_logging_from_config, init_simple_tracing, LoggingGuard};
