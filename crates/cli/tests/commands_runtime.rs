use std::env;
use std::sync::{Mutex, OnceLock};

use deptflow_cli::commands::{classify, config, departments, migrate, run, seed};
use serde_json::Value;

const IN_MEMORY: [(&str, &str); 2] = [
    ("DEPTFLOW_DATABASE_URL", "sqlite::memory:"),
    ("DEPTFLOW_ORCHESTRATOR_SIMULATED_LATENCY_MS", "0"),
];

const SWAP_REQUEST: &str = "Change the subjects for students going on internship this semester";

#[test]
fn classify_reports_intent_departments_and_decision() {
    with_env(&IN_MEMORY, || {
        let result = classify::run("I need to request leave for next week");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "classify");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["intent"], "leave_request");
        assert_eq!(payload["data"]["departments"], serde_json::json!(["hr"]));
        assert_eq!(payload["data"]["decision"], "delegate");
        assert_eq!(payload["data"]["synthesizes_workflow"], false);
    });
}

#[test]
fn classify_asks_for_clarification_at_the_configured_threshold() {
    with_env(
        &[
            ("DEPTFLOW_DATABASE_URL", "sqlite::memory:"),
            ("DEPTFLOW_ORCHESTRATOR_CONFIDENCE_THRESHOLD", "0.9"),
        ],
        || {
            let payload = parse_payload(&classify::run("Planning a vacation in May").output);
            assert_eq!(payload["data"]["threshold"], 0.9);
            assert_eq!(payload["data"]["decision"], "clarify");
        },
    );
}

#[test]
fn classify_rejects_invalid_configuration() {
    with_env(&[("DEPTFLOW_DATABASE_URL", "postgres://campus")], || {
        let result = classify::run("hello");
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or("").contains("database.url"));
    });
}

#[test]
fn run_in_memory_completes_the_internship_swap() {
    with_env(&IN_MEMORY, || {
        let result = run::run(SWAP_REQUEST, true);
        let payload = parse_payload(&result.output);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["data"]["gate_passed"], true);
        assert_eq!(payload["data"]["workflow"]["status"], "completed");
        assert!(payload["message"].as_str().unwrap_or("").contains("completed successfully"));
    });
}

#[test]
fn run_against_the_database_seeds_and_completes_the_swap() {
    with_env(&IN_MEMORY, || {
        let result = run::run(SWAP_REQUEST, false);
        let payload = parse_payload(&result.output);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let steps = payload["data"]["workflow"]["steps"].as_array().cloned().unwrap_or_default();
        assert_eq!(steps.len(), 6);
        assert!(steps.iter().all(|step| step["status"] == "completed"));
    });
}

#[test]
fn run_low_confidence_request_returns_clarification() {
    with_env(&IN_MEMORY, || {
        let result = run::run("Hello there", true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["gate_passed"], false);
        assert_eq!(payload["data"]["workflow"], Value::Null);
        assert!(payload["message"].as_str().unwrap_or("").contains("provide more details"));
    });
}

#[test]
fn run_rejects_blank_requests() {
    with_env(&IN_MEMORY, || {
        let result = run::run("   ", true);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn departments_lists_the_standard_roster() {
    with_env(&IN_MEMORY, || {
        let result = departments::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let ids: Vec<_> = payload["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|summary| summary["id"].as_str().map(str::to_string))
            .collect();
        assert_eq!(ids, ["hr", "finance", "academics", "tnp", "it", "admin"]);
        assert!(payload["data"].as_array().is_some_and(|all| all
            .iter()
            .all(|summary| summary["status"] == "online")));
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&IN_MEMORY, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_reports_campus_counts() {
    with_env(&IN_MEMORY, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or("").starts_with("campus seed loaded"));
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let path = env::temp_dir().join(format!("deptflow-seed-{}.db", std::process::id()));
    let url = format!("sqlite://{}", path.display());
    with_env(&[("DEPTFLOW_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        let second = seed::run();
        assert_eq!(first.exit_code, 0, "first seed: {}", first.output);
        assert_eq!(second.exit_code, 0, "second seed: {}", second.output);
        assert_eq!(
            parse_payload(&first.output)["status"],
            parse_payload(&second.output)["status"]
        );
    });
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("DEPTFLOW_LOG_LEVEL", "debug"), ("DEPTFLOW_SERVER_PORT", "9090")], || {
        let output = config::run();
        assert!(output.contains("- logging.level = debug (source: env (DEPTFLOW_LOG_LEVEL))"));
        assert!(output.contains("- server.port = 9090 (source: env (DEPTFLOW_SERVER_PORT))"));
        assert!(output.contains("- orchestrator.confidence_threshold = 0.8 (source: default)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "DEPTFLOW_DATABASE_URL",
        "DEPTFLOW_DATABASE_MAX_CONNECTIONS",
        "DEPTFLOW_DATABASE_TIMEOUT_SECS",
        "DEPTFLOW_SERVER_BIND_ADDRESS",
        "DEPTFLOW_SERVER_PORT",
        "DEPTFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DEPTFLOW_ORCHESTRATOR_CONFIDENCE_THRESHOLD",
        "DEPTFLOW_ORCHESTRATOR_STEP_TIMEOUT_SECS",
        "DEPTFLOW_ORCHESTRATOR_SIMULATED_LATENCY_MS",
        "DEPTFLOW_ORCHESTRATOR_STRICT_POLICIES",
        "DEPTFLOW_LOGGING_LEVEL",
        "DEPTFLOW_LOGGING_FORMAT",
        "DEPTFLOW_LOG_LEVEL",
        "DEPTFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
