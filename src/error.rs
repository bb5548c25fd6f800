//! Error types for the onboarding engine.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::onboarding::model::{AccountType, FieldValue};
use crate::onboarding::state::StepId;

/// Top-level error type for wiring the engine up (config, storage, network).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures talking to the remote account backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Backend rejected {endpoint} with status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Not authorized to call {endpoint}")]
    Unauthorized { endpoint: String },
}

/// Profile store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend failed: {0}")]
    Backend(#[from] DatabaseError),

    #[error("Stored onboarding state for session {session_id} is unreadable: {reason}")]
    Corrupt { session_id: String, reason: String },

    #[error("Failed to encode onboarding state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Defects in the step graph definition or its use.
///
/// These should be unreachable with a correctly configured graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Step {0} is not declared in the workflow graph")]
    UnknownStep(StepId),

    #[error("Cannot resolve branch at {0}: account type is not set")]
    UnresolvedBranch(StepId),

    #[error("Step {0} is declared more than once")]
    DuplicateStep(StepId),

    #[error("Step {from} names undeclared successor {to}")]
    DanglingSuccessor { from: StepId, to: StepId },
}

/// Outcomes of engine operations the caller must branch on.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Step cannot advance: missing {missing_fields:?}, invalid {invalid_fields:?}")]
    ValidationBlocked {
        missing_fields: BTreeSet<String>,
        invalid_fields: BTreeMap<String, String>,
    },

    #[error("Commit for step {step} failed: {cause}")]
    CommitFailed {
        step: StepId,
        #[source]
        cause: NetworkError,
    },

    #[error("Failed to persist onboarding state: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Another onboarding operation is still in progress")]
    OperationInProgress,

    #[error("Already at the first step")]
    NoHistory,

    #[error("Account type is already committed as {committed}; cannot change to {requested:?}")]
    AccountTypeFrozen {
        committed: AccountType,
        requested: FieldValue,
    },

    #[error("Field {field} does not belong to step {step}")]
    ForeignField { field: String, step: StepId },

    #[error("Onboarding is already complete")]
    AlreadyCompleted,

    #[error("Onboarding session has been closed")]
    SessionClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Whether the user can fix this themselves (fill fields, retry the tap).
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationBlocked { .. }
                | Self::CommitFailed { .. }
                | Self::OperationInProgress
                | Self::AccountTypeFrozen { .. }
        )
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
