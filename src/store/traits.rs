//! Async interface over the local onboarding database.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Row-level access to saved onboarding state, one JSON document per session.
#[async_trait]
pub trait Database: Send + Sync {
    /// Apply pending schema steps.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Raw JSON saved for `session_id`, if any.
    async fn load_state(&self, session_id: &str) -> Result<Option<String>, DatabaseError>;

    /// Insert or replace the document for `session_id` in one statement.
    async fn save_state(&self, session_id: &str, state_json: &str) -> Result<(), DatabaseError>;

    /// Delete the document. Returns whether a row was removed.
    async fn clear_state(&self, session_id: &str) -> Result<bool, DatabaseError>;
}
