use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::department::DepartmentId;
use crate::flows::plan::{ExecutionPlan, WorkflowGraphError};
use crate::flows::states::{StateTransitionError, StepStatus, WorkflowStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(format!("wf-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Fixed six-step internship subject swap chain.
    InternshipSubjectSwap,
    /// Each step delegates an action to its department's agent.
    AgentDelegation,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternshipSubjectSwap => "internship_subject_swap",
            Self::AgentDelegation => "agent_delegation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "internship_subject_swap" => Some(Self::InternshipSubjectSwap),
            "agent_delegation" => Some(Self::AgentDelegation),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub department: DepartmentId,
    pub action: String,
    /// Capability delegated to the department agent, for delegating workflows.
    pub capability: Option<String>,
    pub params: Map<String, Value>,
    pub status: StepStatus,
    pub dependencies: Vec<StepId>,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl WorkflowStep {
    pub fn new(id: &str, department: &str, action: impl Into<String>) -> Self {
        Self {
            id: StepId::from(id),
            department: DepartmentId::from(department),
            action: action.into(),
            capability: None,
            params: Map::new(),
            status: StepStatus::Pending,
            dependencies: Vec::new(),
            data: None,
            error: None,
        }
    }

    pub fn depends_on(mut self, dependencies: &[&str]) -> Self {
        self.dependencies.extend(dependencies.iter().map(|id| StepId::from(*id)));
        self
    }

    pub fn delegating(mut self, capability: impl Into<String>, params: Map<String, Value>) -> Self {
        self.capability = Some(capability.into());
        self.params = params;
        self
    }

    pub fn begin(&mut self) -> Result<(), StateTransitionError> {
        self.status = self.status.transition(StepStatus::Processing)?;
        Ok(())
    }

    pub fn complete(&mut self, data: Value) -> Result<(), StateTransitionError> {
        self.status = self.status.transition(StepStatus::Completed)?;
        self.data = Some(data);
        self.error = None;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), StateTransitionError> {
        self.status = self.status.transition(StepStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub kind: WorkflowKind,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub required_approvals: Vec<String>,
    /// Shared data bag, the only channel between steps.
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Builds a pending workflow, rejecting step graphs that are not a DAG.
    pub fn new(
        id: WorkflowId,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: WorkflowKind,
        steps: Vec<WorkflowStep>,
    ) -> Result<Self, WorkflowGraphError> {
        ExecutionPlan::build(&steps)?;
        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            kind,
            steps,
            status: WorkflowStatus::Pending,
            required_approvals: Vec::new(),
            data: Value::Object(Map::new()),
            created_at: Utc::now(),
        })
    }

    pub fn with_required_approvals(mut self, roles: &[&str]) -> Self {
        self.required_approvals = roles.iter().map(|role| role.to_string()).collect();
        self
    }

    pub fn plan(&self) -> Result<ExecutionPlan, WorkflowGraphError> {
        ExecutionPlan::build(&self.steps)
    }

    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// True when every dependency of the step has completed.
    pub fn can_execute(&self, id: &StepId) -> bool {
        let Some(step) = self.step(id) else {
            return false;
        };
        step.dependencies.iter().all(|dependency| {
            self.step(dependency).is_some_and(|upstream| upstream.status == StepStatus::Completed)
        })
    }

    pub fn all_steps_completed(&self) -> bool {
        self.steps.iter().all(|step| step.status == StepStatus::Completed)
    }

    /// Every step the given step waits on, directly or through other steps.
    pub fn transitive_dependencies(&self, id: &StepId) -> BTreeSet<StepId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<StepId> =
            self.step(id).map(|step| step.dependencies.clone()).unwrap_or_default();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                if let Some(step) = self.step(&next) {
                    stack.extend(step.dependencies.iter().cloned());
                }
            }
        }
        seen
    }

    pub fn transition(&mut self, to: WorkflowStatus) -> Result<(), StateTransitionError> {
        self.status = self.status.transition(to)?;
        Ok(())
    }
}
