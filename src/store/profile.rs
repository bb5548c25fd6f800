//! ProfileStore — durable, per-session storage of onboarding engine state.
//!
//! State is written as one JSON document per session:
//! `{ sessionId, currentStepId, draft, completedStepIds, history, accountTypeCommitted }`.
//! Every save replaces the whole document, so readers see either the old or
//! the new state, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::onboarding::state::EngineState;

use super::traits::Database;

/// Persists and reloads engine state keyed by session id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the state saved for `session_id`, or `None` if there is none.
    async fn load(&self, session_id: &str) -> Result<Option<EngineState>, StoreError>;

    /// Atomically replace the state saved for `session_id`.
    async fn save(&self, session_id: &str, state: &EngineState) -> Result<(), StoreError>;

    /// Remove any saved state for `session_id`.
    async fn clear(&self, session_id: &str) -> Result<(), StoreError>;
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    session_id: String,
    #[serde(flatten)]
    state: EngineState,
}

fn encode(session_id: &str, state: &EngineState) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&PersistedState {
        session_id: session_id.to_string(),
        state: state.clone(),
    })?)
}

fn decode(session_id: &str, json: &str) -> Result<EngineState, StoreError> {
    let persisted: PersistedState =
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
            session_id: session_id.to_string(),
            reason: e.to_string(),
        })?;

    if persisted.session_id != session_id {
        return Err(StoreError::Corrupt {
            session_id: session_id.to_string(),
            reason: format!("record belongs to session {}", persisted.session_id),
        });
    }
    Ok(persisted.state)
}

// ── Database-backed store ───────────────────────────────────────────

/// Stores each session's state as a row of the `onboarding_state` table.
pub struct SqlProfileStore {
    db: Arc<dyn Database>,
}

impl SqlProfileStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for SqlProfileStore {
    async fn load(&self, session_id: &str) -> Result<Option<EngineState>, StoreError> {
        match self.db.load_state(session_id).await? {
            Some(json) => decode(session_id, &json).map(Some),
            None => Ok(None),
        }
    }

    async fn save(&self, session_id: &str, state: &EngineState) -> Result<(), StoreError> {
        let json = encode(session_id, state)?;
        self.db.save_state(session_id, &json).await?;
        tracing::debug!(session_id, step = %state.current_step_id, "Onboarding state saved");
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        let removed = self.db.clear_state(session_id).await?;
        tracing::debug!(session_id, removed, "Onboarding state cleared");
        Ok(())
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Process-local store holding serialized documents; lost on restart.
#[derive(Default)]
pub struct MemoryProfileStore {
    docs: RwLock<HashMap<String, String>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted document as it would appear on disk, parsed for inspection.
    pub async fn raw(&self, session_id: &str) -> Option<serde_json::Value> {
        let docs = self.docs.read().await;
        docs.get(session_id)
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, session_id: &str) -> Result<Option<EngineState>, StoreError> {
        let doc = self.docs.read().await.get(session_id).cloned();
        doc.map(|json| decode(session_id, &json)).transpose()
    }

    async fn save(&self, session_id: &str, state: &EngineState) -> Result<(), StoreError> {
        let json = encode(session_id, state)?;
        self.docs.write().await.insert(session_id.to_string(), json);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.docs.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::{fields, AccountType, ProfileDraft};
    use crate::onboarding::state::StepId;
    use crate::store::LibSqlBackend;

    fn sample_state() -> EngineState {
        let mut state = EngineState::new(StepId::AccountType);
        state.draft = ProfileDraft::new()
            .with(fields::ACCOUNT_TYPE, AccountType::Business)
            .with(fields::BUSINESS_NAME, "Studio Kora");
        state.completed_step_ids.insert(StepId::AccountType);
        state.account_type_committed = true;
        state.move_to(StepId::BusinessDetails);
        state
    }

    async fn sql_store() -> SqlProfileStore {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        SqlProfileStore::new(db)
    }

    #[tokio::test]
    async fn sql_store_round_trips_state() {
        let store = sql_store().await;
        let state = sample_state();

        assert!(store.load("sess-1").await.unwrap().is_none());
        store.save("sess-1", &state).await.unwrap();
        assert_eq!(store.load("sess-1").await.unwrap(), Some(state));

        store.clear("sess-1").await.unwrap();
        assert!(store.load("sess-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let store = sql_store().await;
        let mut state = sample_state();
        store.save("sess-1", &state).await.unwrap();

        state.move_to(StepId::Portfolio);
        store.save("sess-1", &state).await.unwrap();

        let loaded = store.load("sess-1").await.unwrap().unwrap();
        assert_eq!(loaded.current_step_id, StepId::Portfolio);
        assert_eq!(loaded.history.len(), 3);
    }

    #[tokio::test]
    async fn persisted_layout_carries_session_id() {
        let store = MemoryProfileStore::new();
        store.save("sess-9", &sample_state()).await.unwrap();

        let raw = store.raw("sess-9").await.unwrap();
        assert_eq!(raw["sessionId"], "sess-9");
        assert_eq!(raw["currentStepId"], "BusinessDetails");
        assert_eq!(raw["completedStepIds"], serde_json::json!(["AccountType"]));
        assert_eq!(
            raw["history"],
            serde_json::json!(["AccountType", "BusinessDetails"])
        );
        assert_eq!(raw["draft"]["businessName"]["value"], "Studio Kora");
    }

    #[tokio::test]
    async fn record_for_other_session_is_corrupt() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let value = encode("sess-a", &sample_state()).unwrap();
        db.save_state("sess-b", &value).await.unwrap();

        let store = SqlProfileStore::new(db);
        let err = store.load("sess-b").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn undecodable_record_is_corrupt() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.save_state("sess-1", r#"{"sessionId":"sess-1","currentStepId":"Nowhere"}"#)
            .await
            .unwrap();

        let store = SqlProfileStore::new(db);
        assert!(matches!(
            store.load("sess-1").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let store = MemoryProfileStore::new();
        store.save("a", &sample_state()).await.unwrap();
        assert!(store.load("b").await.unwrap().is_none());
        store.clear("b").await.unwrap();
        assert!(store.load("a").await.unwrap().is_some());
    }
}
