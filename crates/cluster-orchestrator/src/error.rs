//! Error types for cluster lifecycle operations.

use thiserror::Error;

use crate::cluster::ClusterState;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while provisioning, stopping, or tracking clusters.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed input or an engine that cannot be resolved.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A non-deleted cluster with this name already exists.
    #[error("Cluster {0} already exists")]
    Conflict(String),

    /// Credential acquisition failed.
    #[error("Authentication failed for {principal}: {message}")]
    AuthFailure { principal: String, message: String },

    /// A resource-manager subprocess exited non-zero or reported a fatal line.
    #[error("{command} failed (exit code {exit_code:?}): {diagnostics}")]
    ProcessFailure {
        command: String,
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// The live cluster could not be contacted.
    #[error("Cluster {name} at {address} is unreachable: {message}")]
    Unreachable {
        name: String,
        address: String,
        message: String,
    },

    /// No cluster with this name exists.
    #[error("Cluster {0} does not exist")]
    NotFound(String),

    /// The operation is not permitted in the cluster's current state.
    #[error("Cannot {operation} cluster {name} while it is {state}")]
    InvalidState {
        name: String,
        operation: &'static str,
        state: ClusterState,
    },

    /// The datastore failed to read or write a record.
    #[error("Datastore error: {0}")]
    Store(String),

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub(crate) fn auth(principal: &str, message: impl Into<String>) -> Self {
        Self::AuthFailure {
            principal: principal.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(name: &str, operation: &'static str, state: ClusterState) -> Self {
        Self::InvalidState {
            name: name.to_string(),
            operation,
            state,
        }
    }
}
