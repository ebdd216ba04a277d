//! Audit trail for workflow execution. Events are appended by the step executor and
//! the orchestrator; sinks decide where they go.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::department::DepartmentId;
use crate::domain::workflow::{StepId, WorkflowId, WorkflowStep};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Workflow,
    Agent,
    Persistence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub workflow_id: WorkflowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<DepartmentId>,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn workflow(
        workflow_id: &WorkflowId,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.clone(),
            step_id: None,
            department: None,
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            details: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Scopes the event to one step and the department that ran it.
    pub fn for_step(mut self, step: &WorkflowStep) -> Self {
        self.step_id = Some(step.id.clone());
        self.department = Some(step.department.clone());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Append-only sink kept for the lifetime of the process. Clones share the log.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    log: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.read(|log| log.to_vec())
    }

    /// Events for one workflow, in emission order.
    pub fn for_workflow(&self, workflow_id: &WorkflowId) -> Vec<AuditEvent> {
        self.read(|log| log.iter().filter(|event| &event.workflow_id == workflow_id).cloned().collect())
    }

    fn read<T>(&self, view: impl FnOnce(&[AuditEvent]) -> T) -> T {
        match self.log.lock() {
            Ok(log) => view(&log),
            Err(poisoned) => view(&poisoned.into_inner()),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        let mut log = match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log.push(event);
    }
}
