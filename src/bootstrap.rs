//! Builds the production collaborators from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::OnboardingConfig;
use crate::error::Result;
use crate::onboarding::{EngineDeps, HttpAuthGateway, WorkflowEngine};
use crate::store::{Database, LibSqlBackend, SqlProfileStore};

/// Open the local database and build engine dependencies for the
/// marketplace graph, talking to the configured account API.
pub async fn connect(config: &OnboardingConfig) -> Result<EngineDeps> {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.database_path).await?);
    let store = Arc::new(SqlProfileStore::new(db));
    let gateway = Arc::new(HttpAuthGateway::new(&config.gateway)?);

    info!(
        database = %config.database_path.display(),
        api = %config.gateway.base_url,
        "Onboarding dependencies ready"
    );
    Ok(EngineDeps::standard(gateway, store))
}

/// Resume (or start) onboarding for `session_id` with production wiring.
pub async fn open_session(
    config: &OnboardingConfig,
    session_id: &str,
) -> Result<Arc<WorkflowEngine>> {
    let deps = connect(config).await?;
    Ok(WorkflowEngine::resume(session_id, deps).await?)
}
