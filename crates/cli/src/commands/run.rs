use std::sync::Arc;

use deptflow_agent::{AgentRuntime, ChatReply, ConfidenceGate, Orchestrator, OrchestratorStores};
use deptflow_core::audit::InMemoryAuditSink;
use deptflow_core::config::AppConfig;
use deptflow_core::departments::{standard_roster, AgentManager, AgentSettings};
use deptflow_core::flows::engine::ExecutorSettings;
use deptflow_core::flows::WorkflowStatus;
use deptflow_core::store::{InMemoryWorkflowStore, StudentDirectory};
use deptflow_db::{
    connect_config, migrations, CampusSeedDataset, DbPool, InMemoryCampusDirectory,
    SqlPolicyStore, SqlStudentDirectory, SqlWorkflowStore,
};

use crate::commands::{
    async_runtime, load_config, CommandResult, Failure, EXIT_DATABASE, EXIT_MIGRATION,
    EXIT_RUNTIME, EXIT_WORKFLOW,
};

pub fn run(text: &str, in_memory: bool) -> CommandResult {
    let config = match load_config("run") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    if text.trim().is_empty() {
        return CommandResult::failure("run", "invalid_input", "request text is empty", 2);
    }
    let runtime = match async_runtime("run") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let (stores, pool) = if in_memory {
            (in_memory_stores(), None)
        } else {
            let pool = prepare_database(&config).await?;
            (database_stores(&pool), Some(pool))
        };

        let reply = handle(&config, stores, text).await;
        if let Some(pool) = pool {
            pool.close().await;
        }
        reply
    });

    match result {
        Ok(reply) => render(reply),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("run", error_class, message, exit_code)
        }
    }
}

fn render(reply: ChatReply) -> CommandResult {
    let failed = reply
        .workflow
        .as_ref()
        .is_some_and(|workflow| workflow.status != WorkflowStatus::Completed);
    let message = reply.message.clone();
    if failed {
        CommandResult::failure_with("run", "workflow_failed", message, EXIT_WORKFLOW, reply)
    } else {
        CommandResult::success_with("run", message, reply)
    }
}

async fn prepare_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    CampusSeedDataset::load(&pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

fn in_memory_stores() -> OrchestratorStores {
    let campus = Arc::new(InMemoryCampusDirectory::seeded());
    OrchestratorStores {
        workflows: Arc::new(InMemoryWorkflowStore::new()),
        policies: campus.clone(),
        students: campus,
        audit: Arc::new(InMemoryAuditSink::default()),
    }
}

fn database_stores(pool: &DbPool) -> OrchestratorStores {
    OrchestratorStores {
        workflows: Arc::new(SqlWorkflowStore::new(pool.clone())),
        policies: Arc::new(SqlPolicyStore::new(pool.clone())),
        students: Arc::new(SqlStudentDirectory::new(pool.clone())),
        audit: Arc::new(InMemoryAuditSink::default()),
    }
}

async fn handle(
    config: &AppConfig,
    stores: OrchestratorStores,
    text: &str,
) -> Result<ChatReply, Failure> {
    let interns = stores
        .students
        .internship_students()
        .await
        .map_err(|error| ("student_directory", error.to_string(), EXIT_DATABASE))?;
    let settings = AgentSettings {
        latency: config.orchestrator.simulated_latency(),
        policy_mode: config.orchestrator.policy_mode(),
    };
    let agents = AgentManager::with_agents(standard_roster(settings, interns))
        .map_err(|error| ("roster", error.to_string(), EXIT_RUNTIME))?;

    let orchestrator = Orchestrator::new(
        Arc::new(agents),
        stores,
        ExecutorSettings { step_timeout: config.orchestrator.step_timeout(), initiated_by: "cli" },
    );
    let runtime = AgentRuntime::new(
        Arc::new(orchestrator),
        ConfidenceGate::new(config.orchestrator.confidence_threshold),
    );
    runtime
        .handle_message(text)
        .await
        .map_err(|error| ("orchestration", error.to_string(), EXIT_RUNTIME))
}
