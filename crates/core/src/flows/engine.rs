use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::departments::DelegationError;
use crate::domain::action::HandlerError;
use crate::domain::workflow::{StepId, Workflow, WorkflowId, WorkflowStep};
use crate::flows::plan::WorkflowGraphError;
use crate::flows::states::{StateTransitionError, WorkflowStatus};
use crate::store::{StoreError, WorkflowRecord, WorkflowStepRecord, WorkflowStore};

const ACTOR: &str = "step-executor";

/// Why a single step failed. Recorded on the step as its error string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error(transparent)]
    Delegation(#[from] DelegationError),
    #[error("action `{action_type}` failed: {error}")]
    ActionFailed { action_type: String, error: String },
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("policy `{name}` not found for department `{department}`")]
    PolicyNotFound { name: String, department: String },
    #[error("step `{0}` has no handler")]
    UnknownStep(String),
    #[error("department `{department}` does not offer capability `{capability}`")]
    MissingCapability { department: String, capability: String },
    #[error("dependencies of step `{0}` are not completed")]
    DependenciesIncomplete(String),
    #[error("step timed out after {0:?}")]
    TimedOut(Duration),
    #[error("workflow execution was cancelled")]
    Cancelled,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("workflow `{id}` is {status}; only pending workflows can be executed")]
    NotPending { id: WorkflowId, status: WorkflowStatus },
    #[error(transparent)]
    Graph(#[from] WorkflowGraphError),
    #[error(transparent)]
    Transition(#[from] StateTransitionError),
}

/// Executes one step on behalf of the executor.
///
/// `Context` is the per-workflow data bag; it is the only channel between steps and is
/// mirrored into `Workflow::data` after every step.
#[async_trait]
pub trait StepDispatcher: Send + Sync {
    type Context: Default + Serialize + Send;

    async fn dispatch(
        &self,
        workflow_id: &WorkflowId,
        step: &WorkflowStep,
        context: &mut Self::Context,
    ) -> Result<Value, StepError>;
}

/// Receives a snapshot after every step transition.
pub trait WorkflowObserver: Send + Sync {
    fn on_progress(&self, workflow: &Workflow);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {
    fn on_progress(&self, _workflow: &Workflow) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub step_timeout: Duration,
    pub initiated_by: &'static str,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { step_timeout: Duration::from_secs(30), initiated_by: "system" }
    }
}

/// Runs a workflow's steps sequentially in validated topological order.
///
/// Step failures, timeouts and cancellation fail the workflow and stop the pass; the
/// steps that already completed keep their records. Store write failures are logged
/// and never change the outcome.
pub struct StepExecutor<D> {
    dispatcher: D,
    store: Arc<dyn WorkflowStore>,
    audit: Arc<dyn AuditSink>,
    settings: ExecutorSettings,
}

impl<D> StepExecutor<D>
where
    D: StepDispatcher,
{
    pub fn new(
        dispatcher: D,
        store: Arc<dyn WorkflowStore>,
        audit: Arc<dyn AuditSink>,
        settings: ExecutorSettings,
    ) -> Self {
        Self { dispatcher, store, audit, settings }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        cancel: &CancellationToken,
        observer: &dyn WorkflowObserver,
    ) -> Result<WorkflowStatus, ExecutorError> {
        if workflow.status != WorkflowStatus::Pending {
            return Err(ExecutorError::NotPending {
                id: workflow.id.clone(),
                status: workflow.status,
            });
        }
        let plan = workflow.plan()?;

        workflow.transition(WorkflowStatus::Processing)?;
        info!(
            event_name = "workflow.execution.started",
            correlation_id = %workflow.id,
            workflow_kind = workflow.kind.as_str(),
            step_count = workflow.steps.len(),
            "workflow execution started"
        );
        self.persist_workflow(workflow).await;
        for (order, &position) in plan.order().iter().enumerate() {
            let record =
                WorkflowStepRecord::from_step(&workflow.id, order as u32 + 1, &workflow.steps[position]);
            let result = self.store.create_workflow_step(&record).await;
            self.log_write(&workflow.id, "create_workflow_step", result);
        }
        self.emit(workflow, "workflow.execution.started", AuditOutcome::Success, None);
        observer.on_progress(workflow);

        let mut context = D::Context::default();
        for &position in plan.order() {
            let step_id = workflow.steps[position].id.clone();
            let outcome = if cancel.is_cancelled() {
                Err(StepError::Cancelled)
            } else if !workflow.can_execute(&step_id) {
                Err(StepError::DependenciesIncomplete(step_id.0.clone()))
            } else {
                workflow.steps[position].begin()?;
                self.persist_step(workflow, position).await;
                observer.on_progress(workflow);
                debug!(
                    event_name = "workflow.step.started",
                    correlation_id = %workflow.id,
                    step_id = %step_id,
                    department = %workflow.steps[position].department,
                    "workflow step started"
                );
                self.run_step(workflow, position, &mut context, cancel).await
            };
            self.sync_context(workflow, &context);

            match outcome {
                Ok(data) => {
                    workflow.steps[position].complete(data)?;
                    self.persist_step(workflow, position).await;
                    info!(
                        event_name = "workflow.step.completed",
                        correlation_id = %workflow.id,
                        step_id = %step_id,
                        department = %workflow.steps[position].department,
                        "workflow step completed"
                    );
                    self.emit(workflow, "workflow.step.completed", AuditOutcome::Success, Some(&step_id));
                    observer.on_progress(workflow);
                }
                Err(error) => {
                    workflow.steps[position].fail(error.to_string())?;
                    self.persist_step(workflow, position).await;
                    warn!(
                        event_name = "workflow.step.failed",
                        correlation_id = %workflow.id,
                        step_id = %step_id,
                        department = %workflow.steps[position].department,
                        error = %error,
                        "workflow step failed"
                    );
                    self.emit(workflow, "workflow.step.failed", AuditOutcome::Failed, Some(&step_id));
                    return self.finish(workflow, WorkflowStatus::Failed, observer).await;
                }
            }
        }

        let status = if workflow.all_steps_completed() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        self.finish(workflow, status, observer).await
    }

    async fn run_step(
        &self,
        workflow: &Workflow,
        position: usize,
        context: &mut D::Context,
        cancel: &CancellationToken,
    ) -> Result<Value, StepError> {
        let step = &workflow.steps[position];
        let timeout = self.settings.step_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            result = tokio::time::timeout(
                timeout,
                self.dispatcher.dispatch(&workflow.id, step, context),
            ) => result.unwrap_or(Err(StepError::TimedOut(timeout))),
        }
    }

    async fn finish(
        &self,
        workflow: &mut Workflow,
        status: WorkflowStatus,
        observer: &dyn WorkflowObserver,
    ) -> Result<WorkflowStatus, ExecutorError> {
        workflow.transition(status)?;
        let result = self.store.update_workflow_status(&workflow.id, status).await;
        self.log_write(&workflow.id, "update_workflow_status", result);
        self.persist_workflow(workflow).await;

        let (event_type, outcome) = match status {
            WorkflowStatus::Completed => ("workflow.execution.completed", AuditOutcome::Success),
            _ => ("workflow.execution.failed", AuditOutcome::Failed),
        };
        info!(
            event_name = event_type,
            correlation_id = %workflow.id,
            status = %status,
            "workflow execution finished"
        );
        self.emit(workflow, event_type, outcome, None);
        observer.on_progress(workflow);
        Ok(status)
    }

    fn sync_context(&self, workflow: &mut Workflow, context: &D::Context) {
        match serde_json::to_value(context) {
            Ok(value) => workflow.data = value,
            Err(error) => warn!(
                event_name = "workflow.context.serialize_failed",
                correlation_id = %workflow.id,
                error = %error,
                "workflow data bag could not be serialized"
            ),
        }
    }

    async fn persist_workflow(&self, workflow: &Workflow) {
        let record = WorkflowRecord::from_workflow(workflow, self.settings.initiated_by);
        let result = self.store.create_workflow(&record).await;
        self.log_write(&workflow.id, "create_workflow", result);
    }

    async fn persist_step(&self, workflow: &Workflow, position: usize) {
        let step = &workflow.steps[position];
        let result = self
            .store
            .update_workflow_step(&workflow.id, &step.id, step.status, step.data.as_ref())
            .await;
        self.log_write(&workflow.id, "update_workflow_step", result);
    }

    fn log_write(&self, workflow_id: &WorkflowId, operation: &str, result: Result<u64, StoreError>) {
        match result {
            Ok(rows) => debug!(
                event_name = "workflow.store.write",
                correlation_id = %workflow_id,
                operation,
                rows,
                "workflow store write"
            ),
            Err(error) => {
                warn!(
                    event_name = "workflow.store.write_failed",
                    correlation_id = %workflow_id,
                    operation,
                    error = %error,
                    "workflow store write failed; continuing"
                );
                self.audit.emit(
                    AuditEvent::workflow(
                        workflow_id,
                        "workflow.store.write_failed",
                        AuditCategory::Persistence,
                        ACTOR,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("operation", operation)
                    .with_metadata("error", error.to_string()),
                );
            }
        }
    }

    fn emit(
        &self,
        workflow: &Workflow,
        event_type: &str,
        outcome: AuditOutcome,
        step_id: Option<&StepId>,
    ) {
        let mut event = AuditEvent::workflow(
            &workflow.id,
            event_type,
            AuditCategory::Workflow,
            ACTOR,
            outcome,
        )
        .with_metadata("status", workflow.status.as_str());
        if let Some(step) = step_id.and_then(|id| workflow.step(id)) {
            event = event.for_step(step).with_metadata("step_status", step.status.as_str());
            if let Some(error) = &step.error {
                event = event.with_metadata("error", error.clone());
            }
        }
        self.audit.emit(event);
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::test_support::halted_after_failure;
    use super::{
        ExecutorError, ExecutorSettings, NoopObserver, StepDispatcher, StepError, StepExecutor,
        WorkflowObserver,
    };
    use crate::audit::{AuditEvent, InMemoryAuditSink};
    use crate::domain::workflow::{StepId, Workflow, WorkflowId, WorkflowKind, WorkflowStep};
    use crate::flows::states::{StepStatus, WorkflowStatus};
    use crate::store::{
        InMemoryWorkflowStore, StoreError, WorkflowRecord, WorkflowStepRecord, WorkflowStore,
    };

    /// Records the order in which steps are dispatched and fails or stalls on request.
    #[derive(Default)]
    struct ScriptedDispatcher {
        fail_on: Option<&'static str>,
        stall_on: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepDispatcher for ScriptedDispatcher {
        type Context = BTreeMap<String, Value>;

        async fn dispatch(
            &self,
            _workflow_id: &WorkflowId,
            step: &WorkflowStep,
            context: &mut Self::Context,
        ) -> Result<Value, StepError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(step.id.0.clone());
            }
            if self.stall_on == Some(step.id.0.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_on == Some(step.id.0.as_str()) {
                return Err(StepError::UnknownStep(step.id.0.clone()));
            }
            let output = json!({ "step": step.id.0, "upstream": context.len() });
            context.insert(step.id.0.clone(), output.clone());
            Ok(output)
        }
    }

    /// Checks on every snapshot that no processing step has incomplete dependencies.
    #[derive(Default)]
    struct InvariantObserver {
        violations: Mutex<Vec<String>>,
    }

    impl WorkflowObserver for InvariantObserver {
        fn on_progress(&self, workflow: &Workflow) {
            for step in &workflow.steps {
                if step.status == StepStatus::Processing && !workflow.can_execute(&step.id) {
                    if let Ok(mut violations) = self.violations.lock() {
                        violations.push(step.id.0.clone());
                    }
                }
            }
        }
    }

    struct FailingStore;

    #[async_trait]
    impl WorkflowStore for FailingStore {
        async fn create_workflow(&self, _record: &WorkflowRecord) -> Result<u64, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn update_workflow_status(
            &self,
            _id: &WorkflowId,
            _status: WorkflowStatus,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn create_workflow_step(
            &self,
            _record: &WorkflowStepRecord,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn update_workflow_step(
            &self,
            _workflow_id: &WorkflowId,
            _step_id: &StepId,
            _status: StepStatus,
            _data: Option<&Value>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
    }

    fn diamond() -> Workflow {
        Workflow::new(
            WorkflowId("wf-diamond".to_string()),
            "Diamond",
            "fan out and join",
            WorkflowKind::AgentDelegation,
            vec![
                WorkflowStep::new("join", "admin", "join").depends_on(&["left", "right"]),
                WorkflowStep::new("root", "tnp", "root"),
                WorkflowStep::new("left", "academics", "left").depends_on(&["root"]),
                WorkflowStep::new("right", "hr", "right").depends_on(&["root"]),
            ],
        )
        .expect("valid diamond")
    }

    fn executor(
        dispatcher: ScriptedDispatcher,
        store: Arc<dyn WorkflowStore>,
        step_timeout: Duration,
    ) -> (StepExecutor<ScriptedDispatcher>, InMemoryAuditSink) {
        let audit = InMemoryAuditSink::default();
        let executor = StepExecutor::new(
            dispatcher,
            store,
            Arc::new(audit.clone()),
            ExecutorSettings { step_timeout, ..ExecutorSettings::default() },
        );
        (executor, audit)
    }

    fn seen(executor: &StepExecutor<ScriptedDispatcher>) -> Vec<String> {
        executor.dispatcher().seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn runs_every_step_in_dependency_order_and_completes() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let (executor, audit) =
            executor(ScriptedDispatcher::default(), store.clone(), Duration::from_secs(5));
        let observer = InvariantObserver::default();
        let mut workflow = diamond();

        let status = executor
            .execute(&mut workflow, &CancellationToken::new(), &observer)
            .await
            .expect("execution runs");

        assert_eq!(status, WorkflowStatus::Completed);
        assert!(workflow.all_steps_completed());
        assert_eq!(seen(&executor), ["root", "left", "right", "join"]);
        assert!(observer.violations.lock().map(|v| v.is_empty()).unwrap_or(false));
        assert_eq!(workflow.data["join"]["upstream"], json!(3));

        let stored = store.workflow(&workflow.id).await.expect("workflow persisted");
        assert_eq!(stored.status, WorkflowStatus::Completed);
        let steps = store.steps(&workflow.id).await;
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|step| step.status == StepStatus::Completed));
        assert_eq!(steps[0].step_id, StepId::from("root"));

        let types: Vec<String> = audit.events().into_iter().map(|e: AuditEvent| e.event_type).collect();
        assert_eq!(types.first().map(String::as_str), Some("workflow.execution.started"));
        assert_eq!(types.last().map(String::as_str), Some("workflow.execution.completed"));
    }

    #[tokio::test]
    async fn failure_halts_remaining_steps() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let dispatcher = ScriptedDispatcher { fail_on: Some("left"), ..ScriptedDispatcher::default() };
        let (executor, _audit) = executor(dispatcher, store.clone(), Duration::from_secs(5));
        let mut workflow = diamond();

        let status = executor
            .execute(&mut workflow, &CancellationToken::new(), &NoopObserver)
            .await
            .expect("execution runs");

        assert_eq!(status, WorkflowStatus::Failed);
        assert_eq!(seen(&executor), ["root", "left"]);
        let status_of = |id: &str| workflow.step(&StepId::from(id)).map(|step| step.status);
        assert_eq!(status_of("root"), Some(StepStatus::Completed));
        assert_eq!(status_of("left"), Some(StepStatus::Failed));
        assert_eq!(status_of("right"), Some(StepStatus::Pending));
        assert_eq!(status_of("join"), Some(StepStatus::Pending));
        assert!(halted_after_failure(&workflow));

        let stored = store.steps(&workflow.id).await;
        assert_eq!(stored[0].status, StepStatus::Completed);
        assert_eq!(stored[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn step_timeout_fails_the_step_and_workflow() {
        let dispatcher = ScriptedDispatcher { stall_on: Some("root"), ..ScriptedDispatcher::default() };
        let (executor, _audit) = executor(
            dispatcher,
            Arc::new(InMemoryWorkflowStore::new()),
            Duration::from_millis(20),
        );
        let mut workflow = diamond();

        let status = executor
            .execute(&mut workflow, &CancellationToken::new(), &NoopObserver)
            .await
            .expect("execution runs");

        assert_eq!(status, WorkflowStatus::Failed);
        let root = workflow.step(&StepId::from("root")).expect("root step");
        assert_eq!(root.status, StepStatus::Failed);
        assert!(root.error.as_deref().is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn cancellation_fails_the_current_step() {
        let dispatcher = ScriptedDispatcher { stall_on: Some("left"), ..ScriptedDispatcher::default() };
        let (executor, _audit) = executor(
            dispatcher,
            Arc::new(InMemoryWorkflowStore::new()),
            Duration::from_secs(60),
        );
        let mut workflow = diamond();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let status =
            executor.execute(&mut workflow, &cancel, &NoopObserver).await.expect("execution runs");

        assert_eq!(status, WorkflowStatus::Failed);
        let left = workflow.step(&StepId::from("left")).expect("left step");
        assert_eq!(left.error.as_deref(), Some("workflow execution was cancelled"));
        assert!(halted_after_failure(&workflow));
    }

    #[tokio::test]
    async fn store_failures_never_abort_execution() {
        let (executor, audit) =
            executor(ScriptedDispatcher::default(), Arc::new(FailingStore), Duration::from_secs(5));
        let mut workflow = diamond();

        let status = executor
            .execute(&mut workflow, &CancellationToken::new(), &NoopObserver)
            .await
            .expect("execution runs");

        assert_eq!(status, WorkflowStatus::Completed);
        assert!(audit
            .events()
            .iter()
            .any(|event| event.event_type == "workflow.store.write_failed"));
    }

    #[tokio::test]
    async fn finished_workflow_cannot_be_executed_again() {
        let (executor, _audit) = executor(
            ScriptedDispatcher::default(),
            Arc::new(InMemoryWorkflowStore::new()),
            Duration::from_secs(5),
        );
        let mut workflow = diamond();
        let cancel = CancellationToken::new();
        executor.execute(&mut workflow, &cancel, &NoopObserver).await.expect("first run");

        let again = executor.execute(&mut workflow, &cancel, &NoopObserver).await;
        assert_eq!(
            again,
            Err(ExecutorError::NotPending {
                id: workflow.id.clone(),
                status: WorkflowStatus::Completed
            })
        );
    }
}
