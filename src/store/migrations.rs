//! Schema for the onboarding database, applied in numbered steps.
//!
//! Applied steps are recorded in `schema_version`. Opening a database runs
//! whatever steps are missing, each in its own transaction.

use chrono::Utc;
use libsql::{params, Connection};

use crate::error::DatabaseError;

/// `(version, description, sql)`. Append only; never edit a shipped step.
const STEPS: &[(i64, &str, &str)] = &[(
    1,
    "onboarding_state",
    r#"
        CREATE TABLE IF NOT EXISTS onboarding_state (
            session_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
)];

fn migration_error(context: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Migration(format!("{context}: {e}"))
}

/// Bring the schema up to date. Returns the resulting version.
pub async fn migrate(conn: &Connection) -> Result<i64, DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(migration_error("create schema_version"))?;

    let applied = applied_version(conn).await?;
    let mut version = applied;
    for &(step, description, sql) in STEPS.iter().filter(|(v, _, _)| *v > applied) {
        apply(conn, step, description, sql).await?;
        tracing::info!(version = step, description, "Applied schema step");
        version = step;
    }
    Ok(version)
}

async fn apply(
    conn: &Connection,
    version: i64,
    description: &str,
    sql: &str,
) -> Result<(), DatabaseError> {
    let tx = conn
        .transaction()
        .await
        .map_err(migration_error("begin schema step"))?;
    tx.execute_batch(sql)
        .await
        .map_err(|e| DatabaseError::Migration(format!("step {version} ({description}): {e}")))?;
    tx.execute(
        "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![version, description, Utc::now().to_rfc3339()],
    )
    .await
    .map_err(migration_error("record schema step"))?;
    tx.commit()
        .await
        .map_err(migration_error("commit schema step"))
}

async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await
        .map_err(migration_error("read schema version"))?;
    match rows
        .next()
        .await
        .map_err(migration_error("read schema version"))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(migration_error("decode schema version")),
        None => Ok(0),
    }
}
