//! Engine error types

use crate::agent::AgentRole;
use docload_config::ConfigError;
use docload_interfaces::DataStoreError;
use thiserror::Error;

/// Result type alias for the engine
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors that end a scenario run
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected before any agent started
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document assignment could not be built
    #[error("Distribution error: {0}")]
    Distribution(String),

    /// An agent failed fatally
    #[error("{0}")]
    Agent(#[from] AgentError),
}

/// Fatal failure of a single agent.
///
/// The message names the role, the agent id and the operation that failed so
/// an operator can find the offending client in the logs.
#[derive(Debug, Clone, Error)]
#[error("{role} {agent_id} failed during {operation}: {kind}")]
pub struct AgentError {
    pub role: AgentRole,
    pub agent_id: usize,
    pub operation: &'static str,
    #[source]
    pub kind: AgentErrorKind,
}

impl AgentError {
    pub fn new(
        role: AgentRole,
        agent_id: usize,
        operation: &'static str,
        kind: AgentErrorKind,
    ) -> Self {
        Self {
            role,
            agent_id,
            operation,
            kind,
        }
    }
}

/// What went wrong inside an agent
#[derive(Debug, Clone, Error)]
pub enum AgentErrorKind {
    #[error("data store error: {0}")]
    DataStore(#[from] DataStoreError),

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: DataStoreError,
    },

    #[error("invalid agent setup: {0}")]
    InvalidSetup(String),

    /// A reader saw more documents than were written to its channels
    #[error("observed {observed} documents but only {expected} were expected")]
    OverCount { observed: usize, expected: usize },

    /// An updater was asked to push a document past its update budget
    #[error("document {doc_id} already has {updates} of {max} updates")]
    LedgerOverflow {
        doc_id: String,
        updates: usize,
        max: usize,
    },

    #[error("document {0} is not in the update ledger")]
    UnknownDocument(String),

    #[error("notification queue closed with {received} of {expected} documents announced")]
    NotificationsClosed { received: usize, expected: usize },

    #[error("provisioning throttle closed")]
    ThrottleClosed,

    /// The agent returned without finishing its work
    #[error("stopped before completing its work")]
    Incomplete,

    /// The agent's task went away without reporting, usually a panic
    #[error("task ended without reporting completion")]
    Abandoned,
}

impl AgentErrorKind {
    /// Whether the failure indicates a logic bug rather than a remote problem
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            AgentErrorKind::OverCount { .. }
                | AgentErrorKind::LedgerOverflow { .. }
                | AgentErrorKind::UnknownDocument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_names_role_id_and_operation() {
        let err = AgentError::new(
            AgentRole::Reader,
            7,
            "changes",
            AgentErrorKind::OverCount {
                observed: 11,
                expected: 10,
            },
        );
        assert_eq!(
            err.to_string(),
            "reader 7 failed during changes: observed 11 documents but only 10 were expected"
        );
        assert!(err.kind.is_invariant_violation());
    }

    #[test]
    fn test_store_errors_are_not_invariant_violations() {
        let kind = AgentErrorKind::from(DataStoreError::Timeout("slow".to_string()));
        assert!(!kind.is_invariant_violation());

        let engine: EngineError = AgentError::new(AgentRole::Writer, 0, "create_user", kind).into();
        assert!(engine.to_string().starts_with("writer 0 failed during create_user"));
    }
}
