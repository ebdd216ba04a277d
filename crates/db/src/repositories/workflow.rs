use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use deptflow_core::domain::department::DepartmentId;
use deptflow_core::domain::workflow::{StepId, WorkflowId, WorkflowKind};
use deptflow_core::flows::{StepStatus, WorkflowStatus};
use deptflow_core::store::{StoreError, WorkflowRecord, WorkflowStepRecord, WorkflowStore};

use super::{decode_column, RepositoryError};
use crate::DbPool;

/// Workflow and step persistence backed by the `workflows`/`workflow_steps` tables.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_workflow(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, workflow_type, status, initiated_by, data_json
             FROM workflows WHERE id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_workflow).transpose()
    }

    /// Step rows of a workflow ordered by their position in the execution plan.
    pub async fn list_steps(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowStepRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT workflow_id, step_id, step_order, department, action, status, data_json
             FROM workflow_steps WHERE workflow_id = ?1
             ORDER BY step_order ASC",
        )
        .bind(&workflow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect()
    }
}

fn encode_json(value: &Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn decode_json(raw: &str) -> Result<Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowRecord, RepositoryError> {
    let kind: String = decode_column(row, "workflow_type")?;
    let status: String = decode_column(row, "status")?;
    let data: String = decode_column(row, "data_json")?;

    Ok(WorkflowRecord {
        id: WorkflowId(decode_column(row, "id")?),
        name: decode_column(row, "name")?,
        description: decode_column(row, "description")?,
        kind: WorkflowKind::parse(&kind)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown workflow type `{kind}`")))?,
        status: WorkflowStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown workflow status `{status}`")))?,
        initiated_by: decode_column(row, "initiated_by")?,
        data: decode_json(&data)?,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowStepRecord, RepositoryError> {
    let status: String = decode_column(row, "status")?;
    let step_order: i64 = decode_column(row, "step_order")?;
    let data: Option<String> = decode_column(row, "data_json")?;
    let department: String = decode_column(row, "department")?;

    Ok(WorkflowStepRecord {
        workflow_id: WorkflowId(decode_column(row, "workflow_id")?),
        step_id: StepId(decode_column(row, "step_id")?),
        step_order: u32::try_from(step_order)
            .map_err(|_| RepositoryError::Decode(format!("step_order out of range: {step_order}")))?,
        department: DepartmentId(department),
        action: decode_column(row, "action")?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        data: data.as_deref().map(decode_json).transpose()?,
    })
}

impl SqlWorkflowStore {
    async fn upsert_workflow(&self, record: &WorkflowRecord) -> Result<u64, RepositoryError> {
        let data = encode_json(&record.data)?;
        let result = sqlx::query(
            "INSERT INTO workflows (id, name, description, workflow_type, status, initiated_by, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 workflow_type = excluded.workflow_type,
                 status = excluded.status,
                 initiated_by = excluded.initiated_by,
                 data_json = excluded.data_json,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&record.id.0)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(&record.initiated_by)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_step(&self, record: &WorkflowStepRecord) -> Result<u64, RepositoryError> {
        let data = record.data.as_ref().map(encode_json).transpose()?;
        let result = sqlx::query(
            "INSERT INTO workflow_steps (workflow_id, step_id, step_order, department, action, status, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(workflow_id, step_id) DO UPDATE SET
                 step_order = excluded.step_order,
                 department = excluded.department,
                 action = excluded.action,
                 status = excluded.status,
                 data_json = excluded.data_json,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&record.workflow_id.0)
        .bind(&record.step_id.0)
        .bind(i64::from(record.step_order))
        .bind(record.department.as_str())
        .bind(&record.action)
        .bind(record.status.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn create_workflow(&self, record: &WorkflowRecord) -> Result<u64, StoreError> {
        let affected = self.upsert_workflow(record).await?;
        debug!(
            event_name = "db.workflow.upserted",
            correlation_id = %record.id,
            status = record.status.as_str(),
            affected,
            "workflow row written"
        );
        Ok(affected)
    }

    async fn update_workflow_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE workflows SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        )
        .bind(status.as_str())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(result.rows_affected())
    }

    async fn create_workflow_step(&self, record: &WorkflowStepRecord) -> Result<u64, StoreError> {
        Ok(self.upsert_step(record).await?)
    }

    async fn update_workflow_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        status: StepStatus,
        data: Option<&Value>,
    ) -> Result<u64, StoreError> {
        let data = data.map(encode_json).transpose()?;
        let result = sqlx::query(
            "UPDATE workflow_steps
             SET status = ?1, data_json = COALESCE(?2, data_json), updated_at = CURRENT_TIMESTAMP
             WHERE workflow_id = ?3 AND step_id = ?4",
        )
        .bind(status.as_str())
        .bind(data)
        .bind(&workflow_id.0)
        .bind(&step_id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(result.rows_affected())
    }
}
