//! Department agents: capability catalogues, per-agent policy registries, and the
//! action-processing contract shared by every department.

pub mod academics;
pub mod admin;
pub mod finance;
pub mod hr;
pub mod it;
pub mod manager;
pub mod tnp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::domain::action::{AgentAction, HandlerError, Payload};
use crate::domain::department::{
    AgentStatus, BusyGuard, Capability, DepartmentId, DepartmentSummary, StatusFlag,
};
use crate::domain::policy::{PolicyError, PolicyMode, PolicyRegistry};
use crate::domain::student::InternshipStudentRecord;

pub use academics::AcademicsAgent;
pub use admin::AdministrationAgent;
pub use finance::FinanceAgent;
pub use hr::HrAgent;
pub use it::ItSupportAgent;
pub use manager::AgentManager;
pub use tnp::TrainingPlacementAgent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DelegationError {
    #[error("agent `{0}` is not registered")]
    AgentNotFound(DepartmentId),
    #[error("agent `{0}` is offline")]
    AgentUnavailable(DepartmentId),
    #[error("agent `{0}` is already registered")]
    AlreadyRegistered(DepartmentId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentSettings {
    pub latency: Duration,
    pub policy_mode: PolicyMode,
}

/// State shared by every department agent.
#[derive(Debug)]
pub struct AgentCore {
    id: DepartmentId,
    name: String,
    capabilities: Vec<Capability>,
    policies: PolicyRegistry,
    status: StatusFlag,
    /// Held for the whole of one action; later callers queue here instead of failing.
    turn: Mutex<()>,
    settings: AgentSettings,
}

impl AgentCore {
    pub fn new(
        id: &str,
        name: impl Into<String>,
        capabilities: Vec<Capability>,
        policies: PolicyRegistry,
        settings: AgentSettings,
    ) -> Self {
        Self {
            id: DepartmentId::from(id),
            name: name.into(),
            capabilities,
            policies,
            status: StatusFlag::default(),
            turn: Mutex::new(()),
            settings,
        }
    }

    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|capability| capability.name == name)
    }

    /// Typed view of one of this agent's own rule bundles.
    pub fn rules<T: DeserializeOwned>(&self, policy: &str) -> Result<T, PolicyError> {
        self.policies.resolve(policy)?.rules_as()
    }

    pub async fn simulate_latency(&self) {
        if !self.settings.latency.is_zero() {
            tokio::time::sleep(self.settings.latency).await;
        }
    }

    /// Waits for this agent to be free and marks it `busy` until the turn is dropped.
    ///
    /// Offline agents are refused immediately; a caller that was already queued is
    /// refused if the agent went offline while it waited.
    pub async fn reserve(&self) -> Result<AgentTurn<'_>, DelegationError> {
        if self.status.load() == AgentStatus::Offline {
            return Err(DelegationError::AgentUnavailable(self.id.clone()));
        }
        let turn = match self.turn.try_lock() {
            Ok(turn) => turn,
            Err(_) => {
                debug!(
                    event_name = "agent.turn.queued",
                    department = %self.id,
                    "agent busy, waiting for its turn"
                );
                self.turn.lock().await
            }
        };
        // Only an administrative signal can hold the flag away from `online` here.
        let busy = self
            .status
            .try_claim()
            .map_err(|_| DelegationError::AgentUnavailable(self.id.clone()))?;
        Ok(AgentTurn { _busy: busy, _turn: turn })
    }
}

/// Exclusive use of one agent. Drops `busy` before letting the next caller in.
#[derive(Debug)]
pub struct AgentTurn<'a> {
    _busy: BusyGuard<'a>,
    _turn: MutexGuard<'a, ()>,
}

fn missing_required(capability: &Capability, payload: &Payload) -> Option<String> {
    capability.required_params.iter().find(|param| !payload.contains(param)).cloned()
}

#[async_trait]
pub trait DepartmentAgent: Send + Sync {
    fn core(&self) -> &AgentCore;

    /// Routes the action to the capability handler named by its type and writes the
    /// derived fields into the payload. Handlers never call other agents.
    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError>;

    fn id(&self) -> &DepartmentId {
        &self.core().id
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.core().capabilities
    }

    fn policies(&self) -> &PolicyRegistry {
        &self.core().policies
    }

    fn status(&self) -> AgentStatus {
        self.core().status.load()
    }

    /// Administrative status change. Processing never sets `offline` on its own.
    fn set_status(&self, status: AgentStatus) {
        self.core().status.store(status);
    }

    fn can_handle(&self, action_type: &str) -> bool {
        self.core().capability(action_type).is_some()
    }

    fn summary(&self) -> DepartmentSummary {
        DepartmentSummary {
            id: self.id().clone(),
            name: self.name().to_string(),
            status: self.status(),
            capabilities: self.capabilities().iter().map(|c| c.name.clone()).collect(),
            policies: self.policies().names(),
        }
    }

    fn apply_policy(
        &self,
        name: &str,
        data: Map<String, Value>,
    ) -> Result<Map<String, Value>, PolicyError> {
        let core = self.core();
        core.policies.apply(name, data, core.settings.policy_mode)
    }

    /// Attaches a policy's rules to an action payload in place.
    fn apply_policy_to(&self, name: &str, payload: &mut Payload) -> Result<(), PolicyError> {
        let enriched = self.apply_policy(name, payload.as_map().clone())?;
        payload.extend(enriched);
        Ok(())
    }

    /// Runs one action to a terminal status. Errors are recorded on the returned action;
    /// the agent is `busy` for exactly the duration of this call. Concurrent callers are
    /// served one at a time in arrival order.
    async fn process_action(&self, mut action: AgentAction) -> AgentAction {
        let core = self.core();
        let _turn = match core.reserve().await {
            Ok(turn) => turn,
            Err(error) => {
                warn!(
                    event_name = "agent.action.rejected",
                    correlation_id = %action.id,
                    department = %core.id,
                    action_type = %action.action_type,
                    error = %error,
                    "agent could not accept action"
                );
                action.fail(error.to_string());
                return action;
            }
        };

        action.start();
        core.simulate_latency().await;

        let outcome = match core.capability(&action.action_type) {
            None => Err(HandlerError::UnknownActionType(action.action_type.clone())),
            Some(capability) => match missing_required(capability, &action.result) {
                Some(param) => Err(HandlerError::MissingParameter(param)),
                None => self.handle(&mut action),
            },
        };

        match outcome {
            Ok(()) => {
                action.complete();
                info!(
                    event_name = "agent.action.completed",
                    correlation_id = %action.id,
                    department = %core.id,
                    action_type = %action.action_type,
                    "agent action completed"
                );
            }
            Err(error) => {
                action.fail(error.to_string());
                warn!(
                    event_name = "agent.action.failed",
                    correlation_id = %action.id,
                    department = %core.id,
                    action_type = %action.action_type,
                    error = %error,
                    "agent action failed"
                );
            }
        }
        action
    }
}

/// Builds the standard department roster in registration order.
pub fn standard_roster(
    settings: AgentSettings,
    interns: Vec<InternshipStudentRecord>,
) -> Vec<Arc<dyn DepartmentAgent>> {
    vec![
        Arc::new(HrAgent::new(settings)),
        Arc::new(FinanceAgent::new(settings)),
        Arc::new(AcademicsAgent::new(settings)),
        Arc::new(TrainingPlacementAgent::new(settings).with_interns(interns)),
        Arc::new(ItSupportAgent::new(settings)),
        Arc::new(AdministrationAgent::new(settings)),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use serde_json::json;

    use super::{AgentCore, AgentSettings, DepartmentAgent};
    use crate::domain::action::{AgentAction, HandlerError, Payload};
    use crate::domain::department::Capability;
    use crate::domain::policy::{Policy, PolicyMode, PolicyRegistry};

    /// Minimal agent with one echo capability and one policy.
    pub struct EchoAgent {
        core: AgentCore,
    }

    impl EchoAgent {
        pub fn new(latency: Duration, policy_mode: PolicyMode) -> Self {
            Self {
                core: AgentCore::new(
                    "echo",
                    "Echo Department",
                    vec![
                        Capability::new("echo", "Echo the message").requires(&["message"]),
                        Capability::new("explode", "Always fails"),
                        Capability::new("apply_missing", "Applies an undefined policy"),
                    ],
                    PolicyRegistry::new().with_policy(Policy::new(
                        "echo_rules",
                        "Echo rules",
                        json!({ "uppercase": true }),
                    )),
                    AgentSettings { latency, policy_mode },
                ),
            }
        }
    }

    impl DepartmentAgent for EchoAgent {
        fn core(&self) -> &AgentCore {
            &self.core
        }

        fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
            match action.action_type.as_str() {
                "echo" => {
                    let message = action.result.str_param("message")?.to_uppercase();
                    action.result.insert("echo", message);
                    self.apply_policy_to("echo_rules", &mut action.result)?;
                    Ok(())
                }
                "explode" => Err(HandlerError::Rejected("boom".to_string())),
                "apply_missing" => {
                    self.apply_policy_to("undefined_policy", &mut action.result)?;
                    Ok(())
                }
                other => Err(HandlerError::UnknownActionType(other.to_string())),
            }
        }
    }

    pub fn echo_action(message: &str) -> AgentAction {
        AgentAction::new("echo", Payload::new().with("message", message))
    }
}
