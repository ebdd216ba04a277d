//! Persistence ports consumed by the step executor and the internship workflow.
//!
//! Write operations return an affected-row count that callers only log. Adapters live in
//! `deptflow-db`; [`InMemoryWorkflowStore`] is used by tests and store-less runs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::department::DepartmentId;
use crate::domain::policy::Policy;
use crate::domain::student::InternshipStudentRecord;
use crate::domain::workflow::{StepId, Workflow, WorkflowId, WorkflowKind, WorkflowStep};
use crate::flows::states::{StepStatus, WorkflowStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub initiated_by: String,
    pub data: Value,
}

impl WorkflowRecord {
    pub fn from_workflow(workflow: &Workflow, initiated_by: impl Into<String>) -> Self {
        Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            kind: workflow.kind,
            status: workflow.status,
            initiated_by: initiated_by.into(),
            data: workflow.data.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepRecord {
    pub workflow_id: WorkflowId,
    pub step_id: StepId,
    pub step_order: u32,
    pub department: DepartmentId,
    pub action: String,
    pub status: StepStatus,
    pub data: Option<Value>,
}

impl WorkflowStepRecord {
    pub fn from_step(workflow_id: &WorkflowId, step_order: u32, step: &WorkflowStep) -> Self {
        Self {
            workflow_id: workflow_id.clone(),
            step_id: step.id.clone(),
            step_order,
            department: step.department.clone(),
            action: step.action.clone(),
            status: step.status,
            data: step.data.clone(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store decode failure: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Inserts the workflow or overwrites an existing record with the same id.
    async fn create_workflow(&self, record: &WorkflowRecord) -> Result<u64, StoreError>;
    async fn update_workflow_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<u64, StoreError>;
    async fn create_workflow_step(&self, record: &WorkflowStepRecord) -> Result<u64, StoreError>;
    async fn update_workflow_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        status: StepStatus,
        data: Option<&Value>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_policy_by_name(
        &self,
        name: &str,
        department: &DepartmentId,
    ) -> Result<Option<Policy>, StoreError>;
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn internship_students(&self) -> Result<Vec<InternshipStudentRecord>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, WorkflowRecord>>,
    steps: RwLock<HashMap<(WorkflowId, StepId), WorkflowStepRecord>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn workflow(&self, id: &WorkflowId) -> Option<WorkflowRecord> {
        self.workflows.read().await.get(id).cloned()
    }

    /// Step records of a workflow ordered by `step_order`.
    pub async fn steps(&self, workflow_id: &WorkflowId) -> Vec<WorkflowStepRecord> {
        let mut steps: Vec<_> = self
            .steps
            .read()
            .await
            .values()
            .filter(|record| &record.workflow_id == workflow_id)
            .cloned()
            .collect();
        steps.sort_by_key(|record| record.step_order);
        steps
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(&self, record: &WorkflowRecord) -> Result<u64, StoreError> {
        self.workflows.write().await.insert(record.id.clone(), record.clone());
        Ok(1)
    }

    async fn update_workflow_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<u64, StoreError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.get_mut(id).map(|record| record.status = status).map_or(0, |_| 1))
    }

    async fn create_workflow_step(&self, record: &WorkflowStepRecord) -> Result<u64, StoreError> {
        let key = (record.workflow_id.clone(), record.step_id.clone());
        self.steps.write().await.insert(key, record.clone());
        Ok(1)
    }

    async fn update_workflow_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        status: StepStatus,
        data: Option<&Value>,
    ) -> Result<u64, StoreError> {
        let mut steps = self.steps.write().await;
        let Some(record) = steps.get_mut(&(workflow_id.clone(), step_id.clone())) else {
            return Ok(0);
        };
        record.status = status;
        if let Some(data) = data {
            record.data = Some(data.clone());
        }
        Ok(1)
    }
}
