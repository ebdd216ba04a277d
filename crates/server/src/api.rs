use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use deptflow_agent::{
    AgentRuntime, ChatMessage, ChatReply, Orchestrator, OrchestratorError, QueryInterpretation,
};
use deptflow_core::audit::{AuditEvent, InMemoryAuditSink};
use deptflow_core::domain::department::{DepartmentId, DepartmentSummary};
use deptflow_core::domain::workflow::{Workflow, WorkflowId};
use deptflow_core::errors::{ApplicationError, InterfaceError};
use deptflow_core::flows::DelegatedStepSpec;
use deptflow_db::DbPool;

use crate::health::{health, HealthState};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub runtime: Arc<AgentRuntime>,
    pub audit: Arc<InMemoryAuditSink>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<DelegatedStepSpec>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub workflow_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ApiErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: ApiState, db_pool: DbPool) -> Router {
    let health_state = HealthState { db_pool, orchestrator: Arc::clone(&state.orchestrator) };
    let api = Router::new()
        .route("/api/query", post(interpret_query))
        .route("/api/chat", get(chat_transcript).post(chat))
        .route("/api/workflows", get(list_workflows).post(submit_workflow))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/departments", get(list_departments))
        .route("/api/departments/{id}", get(get_department))
        .route("/api/audit", get(list_audit_events))
        .with_state(state);

    Router::new().route("/health", get(health)).with_state(health_state).merge(api)
}

fn interface_error(error: InterfaceError) -> ApiError {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ApiErrorBody {
        error: error.user_message().to_string(),
        detail: error.to_string(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body))
}

fn orchestrator_error(error: OrchestratorError, correlation_id: &str) -> ApiError {
    warn!(
        event_name = "api.request.rejected",
        correlation_id,
        error = %error,
        "request rejected"
    );
    interface_error(ApplicationError::from(error).into_interface(correlation_id))
}

fn bad_request(message: &str, correlation_id: &str) -> ApiError {
    interface_error(InterfaceError::BadRequest {
        message: message.to_string(),
        correlation_id: correlation_id.to_string(),
    })
}

pub async fn interpret_query(
    State(state): State<ApiState>,
    Json(body): Json<QueryRequest>,
) -> ApiResult<QueryInterpretation> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty", "query"));
    }
    let interpretation =
        state.orchestrator.interpret_query(query).map_err(|e| orchestrator_error(e, "query"))?;
    info!(
        event_name = "api.query.interpreted",
        correlation_id = interpretation
            .workflow
            .as_ref()
            .map_or("query", |workflow| workflow.id.0.as_str()),
        intent = interpretation.classification.intent.as_str(),
        confidence = interpretation.classification.confidence,
        "query interpreted"
    );
    Ok(Json(interpretation))
}

pub async fn chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> ApiResult<ChatReply> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty", "chat"));
    }
    let reply =
        state.runtime.handle_message(message).await.map_err(|e| orchestrator_error(e, "chat"))?;
    Ok(Json(reply))
}

pub async fn chat_transcript(State(state): State<ApiState>) -> Json<Vec<ChatMessage>> {
    Json(state.runtime.transcript())
}

pub async fn list_workflows(State(state): State<ApiState>) -> Json<Vec<Workflow>> {
    Json(state.orchestrator.active_workflows())
}

pub async fn submit_workflow(
    State(state): State<ApiState>,
    Json(body): Json<SubmitWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    if body.name.trim().is_empty() || body.steps.is_empty() {
        return Err(bad_request("workflow needs a name and at least one step", "submit"));
    }
    let workflow = state
        .orchestrator
        .submit_workflow(body.name.trim(), &body.description, body.steps)
        .map_err(|e| orchestrator_error(e, "submit"))?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn get_workflow(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Workflow> {
    let id = WorkflowId(id);
    state
        .orchestrator
        .workflow_status(&id)
        .map(Json)
        .ok_or_else(|| orchestrator_error(OrchestratorError::WorkflowNotFound(id.clone()), &id.0))
}

pub async fn execute_workflow(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Workflow> {
    let id = WorkflowId(id);
    let workflow =
        state.orchestrator.execute_workflow(&id).await.map_err(|e| orchestrator_error(e, &id.0))?;
    info!(
        event_name = "api.workflow.executed",
        correlation_id = %workflow.id,
        status = workflow.status.as_str(),
        "workflow executed"
    );
    Ok(Json(workflow))
}

pub async fn list_departments(State(state): State<ApiState>) -> Json<Vec<DepartmentSummary>> {
    Json(state.orchestrator.all_departments())
}

pub async fn get_department(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<DepartmentSummary> {
    let id = DepartmentId(id);
    state
        .orchestrator
        .department_status(&id)
        .map(Json)
        .ok_or_else(|| orchestrator_error(OrchestratorError::DepartmentNotFound(id.clone()), &id.0))
}

pub async fn list_audit_events(
    State(state): State<ApiState>,
    Query(filter): Query<AuditFilter>,
) -> Json<Vec<AuditEvent>> {
    match filter.workflow_id {
        Some(id) => Json(state.audit.for_workflow(&WorkflowId(id))),
        None => Json(state.audit.events()),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::{Path, Query, State},
        http::{Request, StatusCode},
        Json,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use deptflow_core::flows::WorkflowStatus;

    use super::{
        execute_workflow, get_workflow, interpret_query, list_audit_events, router,
        submit_workflow, ApiState, AuditFilter, QueryRequest, SubmitWorkflowRequest,
    };
    use crate::bootstrap::{bootstrap, in_memory_options, Application};

    async fn app() -> (Application, State<ApiState>) {
        let app = bootstrap(in_memory_options()).await.expect("bootstrap");
        let state = ApiState {
            orchestrator: app.orchestrator.clone(),
            runtime: app.runtime.clone(),
            audit: app.audit.clone(),
        };
        (app, State(state))
    }

    #[tokio::test]
    async fn query_then_execute_completes_internship_swap() {
        let (_app, state) = app().await;

        let Json(interpretation) = interpret_query(
            state.clone(),
            Json(QueryRequest {
                query: "Change the subjects for students going on internship this semester"
                    .to_string(),
            }),
        )
        .await
        .expect("interpreted");
        let workflow = interpretation.workflow.expect("workflow synthesized");
        assert_eq!(workflow.steps.len(), 6);

        let Json(finished) = execute_workflow(Path(workflow.id.0.clone()), state.clone())
            .await
            .expect("executed");
        assert_eq!(finished.status, WorkflowStatus::Completed);

        let (status, _) = execute_workflow(Path(workflow.id.0.clone()), state)
            .await
            .expect_err("second run is a conflict");
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn audit_trail_can_be_filtered_by_workflow() {
        let (_app, state) = app().await;
        let Json(interpretation) = interpret_query(
            state.clone(),
            Json(QueryRequest {
                query: "Change the subjects for students going on internship".to_string(),
            }),
        )
        .await
        .expect("interpreted");
        let id = interpretation.workflow.expect("workflow synthesized").id;
        execute_workflow(Path(id.0.clone()), state.clone()).await.expect("executed");

        let Json(events) = list_audit_events(
            state.clone(),
            Query(AuditFilter { workflow_id: Some(id.0.clone()) }),
        )
        .await;
        assert!(!events.is_empty());
        assert!(events.iter().all(|event| event.workflow_id == id));
        let step_events = events.iter().filter(|event| event.step_id.is_some()).count();
        assert_eq!(step_events, 6);

        let Json(none) = list_audit_events(
            state,
            Query(AuditFilter { workflow_id: Some("wf-missing".to_string()) }),
        )
        .await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_a_bad_request() {
        let (_app, state) = app().await;
        let (status, Json(body)) =
            interpret_query(state, Json(QueryRequest { query: "   ".to_string() }))
                .await
                .expect_err("rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.correlation_id, "query");
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let (_app, state) = app().await;
        let (status, Json(body)) =
            get_workflow(Path("wf-missing".to_string()), state).await.expect_err("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.correlation_id, "wf-missing");
    }

    #[tokio::test]
    async fn submitted_workflow_with_unknown_department_is_not_found() {
        let (_app, state) = app().await;
        let steps = serde_json::from_value(json!([
            { "id": "book", "department": "library", "capability": "reservations" }
        ]))
        .expect("steps");

        let (status, _) = submit_workflow(
            state,
            Json(SubmitWorkflowRequest {
                name: "Reserve a room".to_string(),
                description: String::new(),
                steps,
            }),
        )
        .await
        .expect_err("unknown department");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn router_serves_departments_and_submitted_workflows() {
        let (app, state) = app().await;
        let router = router(state.0, app.db_pool.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder().uri("/api/departments").body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let departments: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(departments.as_array().map(Vec::len), Some(6));

        let submit = json!({
            "name": "Expense claim",
            "steps": [
                { "id": "policy", "department": "hr", "capability": "policy_queries",
                  "params": { "policy_type": "leave_approval" } }
            ]
        });
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(submit.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let workflow: Value = serde_json::from_slice(&body).expect("json");
        let id = workflow["id"].as_str().expect("id").to_string();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/workflows/{id}/execute"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let finished: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(finished["status"], "completed");

        app.db_pool.close().await;
    }
}
