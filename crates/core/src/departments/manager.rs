use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{DelegationError, DepartmentAgent};
use crate::domain::action::AgentAction;
use crate::domain::department::{AgentStatus, DepartmentId, DepartmentSummary};

/// Registry of department agents, in registration order.
///
/// Agents are registered once during setup and live for the whole process.
#[derive(Default)]
pub struct AgentManager {
    agents: Vec<Arc<dyn DepartmentAgent>>,
    index: HashMap<DepartmentId, usize>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(
        agents: impl IntoIterator<Item = Arc<dyn DepartmentAgent>>,
    ) -> Result<Self, DelegationError> {
        let mut manager = Self::new();
        for agent in agents {
            manager.register(agent)?;
        }
        Ok(manager)
    }

    pub fn register(&mut self, agent: Arc<dyn DepartmentAgent>) -> Result<(), DelegationError> {
        let id = agent.id().clone();
        if self.index.contains_key(&id) {
            return Err(DelegationError::AlreadyRegistered(id));
        }
        self.index.insert(id, self.agents.len());
        self.agents.push(agent);
        Ok(())
    }

    pub fn get(&self, id: &DepartmentId) -> Option<Arc<dyn DepartmentAgent>> {
        self.index.get(id).map(|position| Arc::clone(&self.agents[*position]))
    }

    pub fn all(&self) -> &[Arc<dyn DepartmentAgent>] {
        &self.agents
    }

    /// Agents declaring the capability, in registration order.
    pub fn by_capability(&self, capability: &str) -> Vec<Arc<dyn DepartmentAgent>> {
        self.agents.iter().filter(|agent| agent.can_handle(capability)).cloned().collect()
    }

    pub fn summaries(&self) -> Vec<DepartmentSummary> {
        self.agents.iter().map(|agent| agent.summary()).collect()
    }

    /// Resolves an agent that can currently accept work.
    pub fn ensure_available(
        &self,
        id: &DepartmentId,
    ) -> Result<Arc<dyn DepartmentAgent>, DelegationError> {
        let agent = self.get(id).ok_or_else(|| DelegationError::AgentNotFound(id.clone()))?;
        if agent.status() == AgentStatus::Offline {
            return Err(DelegationError::AgentUnavailable(id.clone()));
        }
        Ok(agent)
    }

    /// Forwards the action to the agent and returns its result unmodified.
    pub async fn delegate(
        &self,
        id: &DepartmentId,
        action: AgentAction,
    ) -> Result<AgentAction, DelegationError> {
        let agent = match self.ensure_available(id) {
            Ok(agent) => agent,
            Err(error) => {
                warn!(
                    event_name = "agent.delegation.rejected",
                    correlation_id = %action.id,
                    department = %id,
                    action_type = %action.action_type,
                    error = %error,
                    "delegation rejected"
                );
                return Err(error);
            }
        };
        debug!(
            event_name = "agent.delegation.forwarded",
            correlation_id = %action.id,
            department = %id,
            action_type = %action.action_type,
            "forwarding action to department agent"
        );
        Ok(agent.process_action(action).await)
    }
}
