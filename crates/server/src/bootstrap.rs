use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use deptflow_agent::{AgentRuntime, ConfidenceGate, Orchestrator, OrchestratorStores};
use deptflow_core::audit::InMemoryAuditSink;
use deptflow_core::config::{AppConfig, ConfigError, LoadOptions};
use deptflow_core::departments::{standard_roster, AgentManager, AgentSettings, DelegationError};
use deptflow_core::flows::engine::ExecutorSettings;
use deptflow_core::store::{StoreError, StudentDirectory};
use deptflow_db::repositories::RepositoryError;
use deptflow_db::{
    connect_config, migrations, CampusSeedDataset, DbPool, SqlPolicyStore,
    SqlStudentDirectory, SqlWorkflowStore,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub runtime: Arc<AgentRuntime>,
    pub audit: Arc<InMemoryAuditSink>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("campus seed failed: {0}")]
    Seed(#[source] RepositoryError),
    #[error("student directory unavailable: {0}")]
    Directory(#[source] StoreError),
    #[error("department roster rejected: {0}")]
    Roster(#[source] DelegationError),
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

    let db_pool = connect_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    CampusSeedDataset::load(&db_pool).await.map_err(BootstrapError::Seed)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied and campus seed loaded"
    );

    let students = Arc::new(SqlStudentDirectory::new(db_pool.clone()));
    let interns = students.internship_students().await.map_err(BootstrapError::Directory)?;
    let settings = AgentSettings {
        latency: config.orchestrator.simulated_latency(),
        policy_mode: config.orchestrator.policy_mode(),
    };
    let agents = Arc::new(
        AgentManager::with_agents(standard_roster(settings, interns))
            .map_err(BootstrapError::Roster)?,
    );

    let audit = Arc::new(InMemoryAuditSink::default());
    let orchestrator = Arc::new(Orchestrator::new(
        agents,
        OrchestratorStores {
            workflows: Arc::new(SqlWorkflowStore::new(db_pool.clone())),
            policies: Arc::new(SqlPolicyStore::new(db_pool.clone())),
            students,
            audit: audit.clone(),
        },
        ExecutorSettings {
            step_timeout: config.orchestrator.step_timeout(),
            initiated_by: "server",
        },
    ));
    let runtime = Arc::new(AgentRuntime::new(
        Arc::clone(&orchestrator),
        ConfidenceGate::new(config.orchestrator.confidence_threshold),
    ));
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        departments = orchestrator.all_departments().len(),
        "orchestrator initialized"
    );

    Ok(Application { config, db_pool, orchestrator, runtime, audit })
}

/// Options for an isolated in-memory application without simulated latency.
#[cfg(test)]
pub(crate) fn in_memory_options() -> LoadOptions {
    use deptflow_core::config::ConfigOverrides;

    LoadOptions {
        overrides: ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            simulated_latency_ms: Some(0),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }
}
