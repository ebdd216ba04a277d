use deptflow_core::departments::{standard_roster, AgentManager, AgentSettings};
use deptflow_db::fixtures::seed_interns;

use crate::commands::{load_config, CommandResult, EXIT_RUNTIME};

pub fn run() -> CommandResult {
    let config = match load_config("departments") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let settings = AgentSettings {
        latency: config.orchestrator.simulated_latency(),
        policy_mode: config.orchestrator.policy_mode(),
    };
    let manager = match AgentManager::with_agents(standard_roster(settings, seed_interns())) {
        Ok(manager) => manager,
        Err(error) => {
            return CommandResult::failure("departments", "roster", error.to_string(), EXIT_RUNTIME)
        }
    };

    let summaries = manager.summaries();
    let message = format!("{} departments registered", summaries.len());
    CommandResult::success_with("departments", message, summaries)
}
