use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};

pub const HR_ID: &str = "hr";

#[derive(Debug, Deserialize)]
struct LeaveApprovalRules {
    max_consecutive_days: i64,
    requires_manager_approval: bool,
    blackout_periods: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LeaveDecision {
    leave_days: i64,
    approval_required: bool,
    warnings: Vec<String>,
    estimated_approval_time: &'static str,
    request_status: &'static str,
}

pub struct HrAgent {
    core: AgentCore,
}

impl HrAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("leave_request", "Process employee leave requests")
                .requires(&["employee_id", "start_date", "end_date", "leave_type"])
                .accepts(&["reason", "emergency_contact"]),
            Capability::new("employee_management", "Manage employee records and information")
                .requires(&["employee_id"])
                .accepts(&["action", "data"]),
            Capability::new("policy_queries", "Answer questions about HR policies")
                .requires(&["policy_type"]),
            Capability::new("recruitment", "Handle recruitment and hiring processes")
                .requires(&["position", "requirements"]),
        ];
        let policies = PolicyRegistry::new()
            .with_policy(Policy::new(
                "leave_approval",
                "Rules for leave approval process",
                json!({
                    "max_consecutive_days": 30,
                    "requires_manager_approval": true,
                    "minimum_notice_days": 7,
                    "blackout_periods": ["2024-12-15:2024-12-31", "2024-04-01:2024-04-15"],
                }),
            ))
            .with_policy(Policy::new(
                "employee_benefits",
                "Employee benefits and entitlements",
                json!({
                    "annual_leave": 21,
                    "sick_leave": 10,
                    "maternity_leave": 180,
                    "paternity_leave": 15,
                }),
            ));

        Self { core: AgentCore::new(HR_ID, "Human Resources", capabilities, policies, settings) }
    }

    fn leave_request(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let start: NaiveDate = action.result.typed_param("start_date")?;
        let end: NaiveDate = action.result.typed_param("end_date")?;
        if end < start {
            return Err(HandlerError::InvalidParameter {
                name: "end_date".to_string(),
                reason: format!("{end} is before start_date {start}"),
            });
        }

        let rules: LeaveApprovalRules = self.core.rules("leave_approval")?;
        let leave_days = (end - start).num_days();
        let mut warnings = Vec::new();
        let mut approval_required = rules.requires_manager_approval;

        if leave_days > rules.max_consecutive_days {
            warnings.push(format!(
                "Leave duration exceeds maximum of {} days",
                rules.max_consecutive_days
            ));
            approval_required = true;
        }

        if rules.blackout_periods.iter().any(|period| overlaps_blackout(period, start, end)) {
            warnings.push("Leave request falls within blackout period".to_string());
            approval_required = true;
        }

        self.apply_policy_to("leave_approval", &mut action.result)?;
        action.result.merge(&LeaveDecision {
            leave_days,
            approval_required,
            warnings,
            estimated_approval_time: if approval_required { "2-3 business days" } else { "Immediate" },
            request_status: if approval_required { "pending_approval" } else { "approved" },
        })
    }

    fn employee_management(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let employee_id = action.result.str_param("employee_id")?.to_string();
        let operation = action.result.opt_str("action").unwrap_or("lookup").to_string();
        action.result.insert(
            "employee_info",
            json!({
                "id": employee_id,
                "department": "Engineering",
                "position": "Software Developer",
                "operation": operation,
            }),
        );
        action.result.insert("last_updated", Utc::now().to_rfc3339());
        Ok(())
    }

    fn policy_queries(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let policy_type = action.result.str_param("policy_type")?.to_ascii_lowercase();
        let matched = self
            .core
            .policies
            .names()
            .into_iter()
            .find(|name| name.contains(&policy_type))
            .and_then(|name| self.core.policies.get(&name).cloned());
        let info = match matched {
            Some(policy) => serde_json::to_value(policy).unwrap_or(Value::Null),
            None => json!({ "message": "Policy not found" }),
        };
        action.result.insert("policy_info", info);
        Ok(())
    }

    fn recruitment(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let position = action.result.str_param("position")?.to_string();
        let requirements = action.result.get("requirements").cloned().unwrap_or(Value::Null);
        let now = Utc::now();
        action.result.insert(
            "job_posting",
            json!({
                "id": format!("JOB-{}", now.timestamp_millis()),
                "position": position,
                "requirements": requirements,
                "status": "draft",
                "created_date": now.to_rfc3339(),
            }),
        );
        action.result.insert(
            "next_steps",
            json!(["Review job description", "Post to job boards", "Schedule interviews"]),
        );
        Ok(())
    }
}

/// `period` is `start:end` in ISO dates; unparseable periods never match.
fn overlaps_blackout(period: &str, start: NaiveDate, end: NaiveDate) -> bool {
    let Some((from, to)) = period.split_once(':') else {
        return false;
    };
    match (from.parse::<NaiveDate>(), to.parse::<NaiveDate>()) {
        (Ok(from), Ok(to)) => start <= to && end >= from,
        _ => false,
    }
}

impl DepartmentAgent for HrAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "leave_request" => self.leave_request(action),
            "employee_management" => self.employee_management(action),
            "policy_queries" => self.policy_queries(action),
            "recruitment" => self.recruitment(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}
