//! libSQL storage for onboarding state, one row per session.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Connection};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

fn query_error(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

/// Local libSQL database holding the `onboarding_state` table.
pub struct LibSqlBackend {
    conn: Connection,
}

impl LibSqlBackend {
    /// Open or create the database file at `path`, creating missing directories.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                DatabaseError::Pool(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("cannot open {}: {e}", path.display())))?;
        let backend = Self::connect(&db).await?;
        info!(path = %path.display(), "Onboarding database opened");
        Ok(backend)
    }

    /// Scratch database that disappears with the value.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("cannot open in-memory database: {e}")))?;
        Self::connect(&db).await
    }

    async fn connect(db: &libsql::Database) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("cannot connect: {e}")))?;
        let backend = Self { conn };
        backend.init_schema().await?;
        Ok(backend)
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        let version = migrations::migrate(&self.conn).await?;
        debug!(version, "Onboarding schema ready");
        Ok(())
    }

    async fn load_state(&self, session_id: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT state FROM onboarding_state WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(query_error("load_state"))?;

        match rows.next().await.map_err(query_error("load_state"))? {
            Some(row) => Ok(Some(row.get(0).map_err(query_error("load_state"))?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, session_id: &str, state_json: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO onboarding_state (session_id, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (session_id) DO UPDATE
                 SET state = excluded.state, updated_at = excluded.updated_at",
                params![session_id, state_json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_error("save_state"))?;
        Ok(())
    }

    async fn clear_state(&self, session_id: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM onboarding_state WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(query_error("clear_state"))?;
        Ok(removed > 0)
    }
}
