use thiserror::Error;
use tracing::info;
use vmgate_core::config::{AppConfig, ConfigError};
use vmgate_db::{connect_with_settings, migrations, DbPool, Workflows};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflows: Workflows,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects, migrates and wires the workflow services for an already
/// loaded configuration.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let policy = config.approvals.policy();
    info!(
        event_name = "system.bootstrap.approval_policy",
        correlation_id = "bootstrap",
        level_quorum = ?policy.level_quorum,
        customization_returned = ?policy.customization_returned,
        "approval policy loaded"
    );

    let workflows = Workflows::new(db_pool.clone(), policy);
    Ok(Application { config, db_pool, workflows })
}
