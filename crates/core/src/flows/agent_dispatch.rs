//! Workflows whose steps delegate an [`AgentAction`] to the owning department.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::engine::{StepDispatcher, StepError};
use crate::departments::AgentManager;
use crate::domain::action::{AgentAction, Payload};
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowKind, WorkflowStep};
use crate::flows::plan::WorkflowGraphError;

/// Key under which completed dependency outputs are handed to a delegated action.
pub const UPSTREAM_KEY: &str = "upstream";

pub struct AgentDispatcher {
    agents: Arc<AgentManager>,
}

impl AgentDispatcher {
    pub fn new(agents: Arc<AgentManager>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl StepDispatcher for AgentDispatcher {
    /// Result payload of every completed step, keyed by step id.
    type Context = BTreeMap<String, Value>;

    async fn dispatch(
        &self,
        _workflow_id: &WorkflowId,
        step: &WorkflowStep,
        context: &mut Self::Context,
    ) -> Result<Value, StepError> {
        let capability = step.capability.as_deref().unwrap_or(step.action.as_str());
        let agent = self.agents.ensure_available(&step.department)?;
        if !agent.can_handle(capability) {
            return Err(StepError::MissingCapability {
                department: step.department.0.clone(),
                capability: capability.to_string(),
            });
        }

        let mut params = Payload::from_map(step.params.clone());
        if !step.dependencies.is_empty() {
            let upstream: Map<String, Value> = step
                .dependencies
                .iter()
                .filter_map(|id| context.get(&id.0).map(|output| (id.0.clone(), output.clone())))
                .collect();
            params.insert(UPSTREAM_KEY, Value::Object(upstream));
        }

        let action = AgentAction::new(capability, params).with_description(step.action.clone());
        let action = self.agents.delegate(&step.department, action).await?;
        if !action.is_completed() {
            return Err(StepError::ActionFailed {
                action_type: action.action_type,
                error: action.error.unwrap_or_else(|| "action did not complete".to_string()),
            });
        }

        let output = action.result.into_value();
        context.insert(step.id.0.clone(), output.clone());
        Ok(output)
    }
}

/// One step of a submitted delegation workflow.
#[derive(Clone, Debug, Deserialize)]
pub struct DelegatedStepSpec {
    pub id: String,
    pub department: String,
    pub capability: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Builds an agent-delegating workflow, validating the step graph.
pub fn delegation_workflow(
    id: WorkflowId,
    name: impl Into<String>,
    description: impl Into<String>,
    steps: Vec<DelegatedStepSpec>,
) -> Result<Workflow, WorkflowGraphError> {
    let steps = steps
        .into_iter()
        .map(|spec| {
            let action = spec.action.unwrap_or_else(|| spec.capability.replace('_', " "));
            let dependencies: Vec<&str> = spec.depends_on.iter().map(String::as_str).collect();
            WorkflowStep::new(&spec.id, &spec.department, action)
                .depends_on(&dependencies)
                .delegating(spec.capability, spec.params)
        })
        .collect();
    Workflow::new(id, name, description, WorkflowKind::AgentDelegation, steps)
}
