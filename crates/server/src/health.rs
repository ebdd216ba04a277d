use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use deptflow_agent::Orchestrator;
use deptflow_core::domain::department::AgentStatus;
use deptflow_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub departments: HealthCheck,
    pub checked_at: String,
}

/// Ready when the database answers. Offline departments only degrade the report.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let departments = departments_check(&state.orchestrator);
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: match (ready, departments.status) {
            (true, "ready") => "ready",
            _ => "degraded",
        },
        database,
        departments,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn departments_check(orchestrator: &Orchestrator) -> HealthCheck {
    let departments = orchestrator.all_departments();
    let offline: Vec<_> = departments
        .iter()
        .filter(|department| department.status == AgentStatus::Offline)
        .map(|department| department.id.as_str())
        .collect();
    if offline.is_empty() {
        HealthCheck {
            status: "ready",
            detail: format!("{} departments available", departments.len()),
        }
    } else {
        HealthCheck { status: "degraded", detail: format!("offline: {}", offline.join(", ")) }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use crate::bootstrap::{bootstrap, in_memory_options};
    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let app = bootstrap(in_memory_options()).await.expect("bootstrap");
        let state = HealthState { db_pool: app.db_pool.clone(), orchestrator: app.orchestrator };

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.departments.status, "ready");
        assert_eq!(payload.status, "ready");
        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_closed() {
        let app = bootstrap(in_memory_options()).await.expect("bootstrap");
        app.db_pool.close().await;
        let state = HealthState { db_pool: app.db_pool, orchestrator: app.orchestrator };

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
    }
}
