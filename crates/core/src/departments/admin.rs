use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};

pub const ADMIN_ID: &str = "admin";

/// Signs off subject changes on behalf of the institution.
pub const ACADEMIC_AUTHORITY: &str = "Dr. Sarah Johnson, Dean of Academics";

#[derive(Debug, Deserialize)]
struct ApprovalAuthority {
    areas: Vec<String>,
}

pub struct AdministrationAgent {
    core: AgentCore,
}

impl AdministrationAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("approvals", "Approve or escalate institutional requests")
                .requires(&["request_type"])
                .accepts(&["requested_by", "details"]),
            Capability::new("policy_enforcement", "Check requests against administrative authority")
                .requires(&["area"]),
            Capability::new("reporting", "Produce administrative reports")
                .requires(&["report_type"])
                .accepts(&["period"]),
            Capability::new("coordination", "Coordinate work across departments")
                .requires(&["departments"])
                .accepts(&["topic"]),
        ];
        let policies = PolicyRegistry::new().with_policy(Policy::new(
            "approval_authority",
            "Areas the administration may approve directly",
            json!({ "areas": ["subject_changes", "policy_updates", "budget_allocations"] }),
        ));

        Self { core: AgentCore::new(ADMIN_ID, "Administration", capabilities, policies, settings) }
    }

    fn within_authority(&self, area: &str) -> Result<bool, HandlerError> {
        let authority: ApprovalAuthority = self.core.rules("approval_authority")?;
        Ok(authority.areas.iter().any(|known| known == area))
    }

    fn approvals(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let request_type = action.result.str_param("request_type")?.to_string();
        let approved = self.within_authority(&request_type)?;
        self.apply_policy_to("approval_authority", &mut action.result)?;

        if approved {
            action.result.insert("decision", "approved");
            action.result.insert("approved_by", ACADEMIC_AUTHORITY);
            action.result.insert("approval_date", Utc::now().to_rfc3339());
        } else {
            action.result.insert("decision", "escalated");
            action.result.insert("escalated_to", "Governing Council");
        }
        Ok(())
    }

    fn policy_enforcement(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let area = action.result.str_param("area")?.to_string();
        let within = self.within_authority(&area)?;
        action.result.insert("within_authority", within);
        action.result.insert("enforcement_status", if within { "enforced" } else { "out_of_scope" });
        Ok(())
    }

    fn reporting(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let report_type = action.result.str_param("report_type")?.to_string();
        let period = action.result.opt_str("period").unwrap_or("current_semester").to_string();
        let now = Utc::now();
        action.result.insert(
            "report",
            json!({
                "id": format!("RPT-{}", now.timestamp_millis()),
                "type": report_type,
                "period": period,
                "generated_at": now.to_rfc3339(),
                "status": "generated",
            }),
        );
        Ok(())
    }

    fn coordination(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let departments: Vec<String> = action.result.typed_param("departments")?;
        if departments.is_empty() {
            return Err(HandlerError::InvalidParameter {
                name: "departments".to_string(),
                reason: "at least one department is required".to_string(),
            });
        }
        let topic = action.result.opt_str("topic").unwrap_or("general").to_string();
        let assignments: Vec<Value> = departments
            .iter()
            .map(|department| json!({ "department": department, "status": "notified" }))
            .collect();
        action.result.insert("coordination_plan", json!({ "topic": topic, "assignments": assignments }));
        Ok(())
    }
}

impl DepartmentAgent for AdministrationAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "approvals" => self.approvals(action),
            "policy_enforcement" => self.policy_enforcement(action),
            "reporting" => self.reporting(action),
            "coordination" => self.coordination(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AdministrationAgent, ACADEMIC_AUTHORITY};
    use crate::departments::{AgentSettings, DepartmentAgent};
    use crate::domain::action::{ActionStatus, AgentAction, Payload};

    #[tokio::test]
    async fn subject_changes_are_approved_by_academic_authority() {
        let agent = AdministrationAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "approvals",
                Payload::new().with("request_type", "subject_changes"),
            ))
            .await;

        assert_eq!(action.status, ActionStatus::Completed);
        assert_eq!(action.result.get("decision"), Some(&json!("approved")));
        assert_eq!(action.result.get("approved_by"), Some(&json!(ACADEMIC_AUTHORITY)));
    }

    #[tokio::test]
    async fn requests_outside_authority_are_escalated() {
        let agent = AdministrationAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "approvals",
                Payload::new().with("request_type", "campus_expansion"),
            ))
            .await;

        assert_eq!(action.result.get("decision"), Some(&json!("escalated")));
        assert!(action.result.get("approved_by").is_none());
    }

    #[tokio::test]
    async fn coordination_rejects_empty_department_list() {
        let agent = AdministrationAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "coordination",
                Payload::new().with("departments", json!([])),
            ))
            .await;

        assert_eq!(action.status, ActionStatus::Failed);
        assert!(action.error.as_deref().is_some_and(|e| e.contains("departments")));
    }
}
