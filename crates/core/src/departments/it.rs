use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};

pub const IT_ID: &str = "it";

#[derive(Debug, Deserialize)]
struct TicketRules {
    priority_levels: Vec<String>,
    default_priority: String,
}

pub struct ItSupportAgent {
    core: AgentCore,
}

impl ItSupportAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("user_support", "Open a support ticket for a user issue")
                .requires(&["issue"])
                .accepts(&["priority", "requested_by"]),
            Capability::new("software_installation", "Schedule a software installation")
                .requires(&["software"])
                .accepts(&["machine_id"]),
        ];
        let policies = PolicyRegistry::new().with_policy(Policy::new(
            "ticket_priority",
            "Support ticket priority levels",
            json!({
                "priority_levels": ["low", "medium", "high", "critical"],
                "default_priority": "medium",
            }),
        ));

        Self { core: AgentCore::new(IT_ID, "IT Support", capabilities, policies, settings) }
    }

    fn user_support(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let rules: TicketRules = self.core.rules("ticket_priority")?;
        let priority = action
            .result
            .opt_str("priority")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| rules.default_priority.clone());
        if !rules.priority_levels.contains(&priority) {
            return Err(HandlerError::InvalidParameter {
                name: "priority".to_string(),
                reason: format!("expected one of {}", rules.priority_levels.join("|")),
            });
        }

        action.result.insert("ticket_id", format!("TKT-{}", Utc::now().timestamp_millis()));
        action.result.insert("assigned_priority", priority);
        action.result.insert("ticket_status", "open");
        Ok(())
    }

    fn software_installation(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let software = action.result.str_param("software")?.to_string();
        action.result.insert(
            "installation",
            json!({ "software": software, "status": "scheduled", "window": "next business day" }),
        );
        Ok(())
    }
}

impl DepartmentAgent for ItSupportAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "user_support" => self.user_support(action),
            "software_installation" => self.software_installation(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}
