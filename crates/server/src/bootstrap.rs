use std::sync::Arc;

use handoff_core::clock::{Clock, SystemClock};
use handoff_core::config::{AppConfig, ConfigError, LoadOptions};
use handoff_core::service::RequestService;
use handoff_core::sla::SlaMonitor;
use handoff_core::store::WorkflowStore;
use handoff_db::{connect_with_config, migrations, DbPool, SqlWorkflowStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: RequestService,
    pub monitor: Arc<SlaMonitor>,
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

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let store: Arc<dyn WorkflowStore> = Arc::new(SqlWorkflowStore::new(db_pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = RequestService::new(store.clone(), clock.clone())
        .with_default_sla_minutes(config.sla.default_minutes);
    let monitor =
        Arc::new(SlaMonitor::new(store, clock).with_interval(config.sla.sweep_interval()));

    Ok(Application { config, db_pool, service, monitor })
}
