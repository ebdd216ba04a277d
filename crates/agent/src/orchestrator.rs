use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deptflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use deptflow_core::departments::AgentManager;
use deptflow_core::domain::department::{DepartmentId, DepartmentSummary};
use deptflow_core::domain::workflow::{Workflow, WorkflowId, WorkflowKind};
use deptflow_core::errors::{ApplicationError, DomainError};
use deptflow_core::flows::agent_dispatch::{delegation_workflow, AgentDispatcher, DelegatedStepSpec};
use deptflow_core::flows::engine::{ExecutorError, ExecutorSettings, StepExecutor, WorkflowObserver};
use deptflow_core::flows::internship::{internship_swap_workflow, InternshipSwapDispatcher};
use deptflow_core::flows::{WorkflowGraphError, WorkflowStatus};
use deptflow_core::store::{PolicyStore, StudentDirectory, WorkflowStore};

use crate::classifier::{Classification, IntentClassifier};

const ACTOR: &str = "orchestrator";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("workflow `{0}` not found")]
    WorkflowNotFound(WorkflowId),
    #[error("workflow `{0}` is already being executed")]
    WorkflowBusy(WorkflowId),
    #[error("department `{0}` not found")]
    DepartmentNotFound(DepartmentId),
    #[error(transparent)]
    Graph(#[from] WorkflowGraphError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl From<OrchestratorError> for ApplicationError {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::WorkflowNotFound(_) | OrchestratorError::DepartmentNotFound(_) => {
                Self::NotFound(value.to_string())
            }
            OrchestratorError::WorkflowBusy(_) => Self::Conflict(value.to_string()),
            OrchestratorError::Graph(error) => Self::Domain(DomainError::from(error)),
            OrchestratorError::Executor(ExecutorError::NotPending { .. }) => {
                Self::Conflict(value.to_string())
            }
            OrchestratorError::Executor(ExecutorError::Graph(error)) => {
                Self::Domain(DomainError::from(error))
            }
            OrchestratorError::Executor(ExecutorError::Transition(error)) => {
                Self::Domain(DomainError::from(error))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryInterpretation {
    #[serde(flatten)]
    pub classification: Classification,
    pub workflow: Option<Workflow>,
}

/// Stores injected into the orchestrator.
#[derive(Clone)]
pub struct OrchestratorStores {
    pub workflows: Arc<dyn WorkflowStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub students: Arc<dyn StudentDirectory>,
    pub audit: Arc<dyn AuditSink>,
}

type Registry = RwLock<BTreeMap<WorkflowId, Workflow>>;

/// Mirrors executor progress into the registry so status queries see live steps.
struct RegistryObserver<'a> {
    workflows: &'a Registry,
}

impl WorkflowObserver for RegistryObserver<'_> {
    fn on_progress(&self, workflow: &Workflow) {
        let mut workflows = match self.workflows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        workflows.insert(workflow.id.clone(), workflow.clone());
    }
}

/// Holds a workflow id in the running set until dropped.
struct RunClaim<'a> {
    running: &'a Mutex<HashSet<WorkflowId>>,
    id: WorkflowId,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        running.remove(&self.id);
    }
}

/// Owns the agent manager and the session's workflow registry.
pub struct Orchestrator {
    agents: Arc<AgentManager>,
    classifier: IntentClassifier,
    workflows: Registry,
    running: Mutex<HashSet<WorkflowId>>,
    internship: StepExecutor<InternshipSwapDispatcher>,
    delegation: StepExecutor<AgentDispatcher>,
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<AgentManager>,
        stores: OrchestratorStores,
        settings: ExecutorSettings,
    ) -> Self {
        let internship = StepExecutor::new(
            InternshipSwapDispatcher::new(
                Arc::clone(&stores.students),
                Arc::clone(&stores.policies),
                Arc::clone(&agents),
            ),
            Arc::clone(&stores.workflows),
            Arc::clone(&stores.audit),
            settings,
        );
        let delegation = StepExecutor::new(
            AgentDispatcher::new(Arc::clone(&agents)),
            Arc::clone(&stores.workflows),
            Arc::clone(&stores.audit),
            settings,
        );
        Self {
            agents,
            classifier: IntentClassifier::new(),
            workflows: RwLock::new(BTreeMap::new()),
            running: Mutex::new(HashSet::new()),
            internship,
            delegation,
            audit: stores.audit,
        }
    }

    pub fn agents(&self) -> &Arc<AgentManager> {
        &self.agents
    }

    /// Classifies the text and registers the synthesized workflow, if any.
    pub fn interpret_query(&self, text: &str) -> Result<QueryInterpretation, OrchestratorError> {
        let classification = self.classifier.classify(text);
        let workflow = if classification.intent.synthesizes_workflow() {
            let workflow = internship_swap_workflow(WorkflowId::generate())?;
            self.register(workflow.clone());
            Some(workflow)
        } else {
            None
        };

        info!(
            event_name = "orchestrator.query.classified",
            correlation_id = workflow.as_ref().map(|w| w.id.0.as_str()).unwrap_or("query"),
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            departments = classification.departments.len(),
            "query classified"
        );
        Ok(QueryInterpretation { classification, workflow })
    }

    /// Registers an agent-delegating workflow built from step descriptions.
    pub fn submit_workflow(
        &self,
        name: &str,
        description: &str,
        steps: Vec<DelegatedStepSpec>,
    ) -> Result<Workflow, OrchestratorError> {
        for step in &steps {
            let department = DepartmentId::from(step.department.as_str());
            if self.agents.get(&department).is_none() {
                return Err(OrchestratorError::DepartmentNotFound(department));
            }
        }
        let workflow = delegation_workflow(WorkflowId::generate(), name, description, steps)?;
        self.register(workflow.clone());
        info!(
            event_name = "orchestrator.workflow.submitted",
            correlation_id = %workflow.id,
            step_count = workflow.steps.len(),
            "delegation workflow submitted"
        );
        Ok(workflow)
    }

    pub async fn execute_workflow(&self, id: &WorkflowId) -> Result<Workflow, OrchestratorError> {
        self.execute_workflow_with_cancel(id, &CancellationToken::new()).await
    }

    /// Runs a registered workflow to a terminal status. At most one task executes a
    /// given workflow id at a time.
    pub async fn execute_workflow_with_cancel(
        &self,
        id: &WorkflowId,
        cancel: &CancellationToken,
    ) -> Result<Workflow, OrchestratorError> {
        let _claim = self.claim(id)?;
        let mut workflow =
            self.workflow_status(id).ok_or_else(|| OrchestratorError::WorkflowNotFound(id.clone()))?;

        let observer = RegistryObserver { workflows: &self.workflows };
        let outcome = match workflow.kind {
            WorkflowKind::InternshipSubjectSwap => {
                self.internship.execute(&mut workflow, cancel, &observer).await
            }
            WorkflowKind::AgentDelegation => {
                self.delegation.execute(&mut workflow, cancel, &observer).await
            }
        };
        match outcome {
            Ok(status) => {
                self.register(workflow.clone());
                let outcome = if status == WorkflowStatus::Completed {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failed
                };
                self.audit.emit(
                    AuditEvent::workflow(
                        &workflow.id,
                        "orchestrator.workflow.finished",
                        AuditCategory::Workflow,
                        ACTOR,
                        outcome,
                    )
                    .with_metadata("status", status.as_str()),
                );
                Ok(workflow)
            }
            Err(error) => {
                warn!(
                    event_name = "orchestrator.workflow.rejected",
                    correlation_id = %id,
                    error = %error,
                    "workflow execution rejected"
                );
                self.audit.emit(
                    AuditEvent::workflow(
                        id,
                        "orchestrator.workflow.rejected",
                        AuditCategory::Workflow,
                        ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    pub fn workflow_status(&self, id: &WorkflowId) -> Option<Workflow> {
        self.read_registry().get(id).cloned()
    }

    pub fn active_workflows(&self) -> Vec<Workflow> {
        self.read_registry().values().cloned().collect()
    }

    pub fn all_departments(&self) -> Vec<DepartmentSummary> {
        self.agents.summaries()
    }

    pub fn department_status(&self, id: &DepartmentId) -> Option<DepartmentSummary> {
        self.agents.get(id).map(|agent| agent.summary())
    }

    fn register(&self, workflow: Workflow) {
        let mut workflows = match self.workflows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        workflows.insert(workflow.id.clone(), workflow);
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<WorkflowId, Workflow>> {
        match self.workflows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn claim(&self, id: &WorkflowId) -> Result<RunClaim<'_>, OrchestratorError> {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !running.insert(id.clone()) {
            return Err(OrchestratorError::WorkflowBusy(id.clone()));
        }
        Ok(RunClaim { running: &self.running, id: id.clone() })
    }
}
