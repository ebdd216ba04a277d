use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};

pub const FINANCE_ID: &str = "finance";

#[derive(Debug, Deserialize)]
struct ReimbursementRules {
    reimbursement_limit: f64,
    approval_required_above: f64,
}

#[derive(Debug, Serialize)]
struct ReimbursementDecision {
    claim_status: &'static str,
    approval_required: bool,
    payable_amount: f64,
}

pub struct FinanceAgent {
    core: AgentCore,
}

impl FinanceAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("expense_reimbursement", "Process expense reimbursement claims")
                .requires(&["employee_id", "amount"])
                .accepts(&["category", "description"]),
            Capability::new("budget_queries", "Answer departmental budget questions")
                .requires(&["department"]),
        ];
        let policies = PolicyRegistry::new().with_policy(Policy::new(
            "reimbursement_policy",
            "Limits for expense reimbursement",
            json!({ "reimbursement_limit": 5000, "approval_required_above": 1000 }),
        ));

        Self { core: AgentCore::new(FINANCE_ID, "Finance", capabilities, policies, settings) }
    }

    fn expense_reimbursement(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let amount = action.result.f64_param("amount")?;
        if amount <= 0.0 {
            return Err(HandlerError::InvalidParameter {
                name: "amount".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let rules: ReimbursementRules = self.core.rules("reimbursement_policy")?;
        let decision = if amount > rules.reimbursement_limit {
            ReimbursementDecision {
                claim_status: "exceeds_limit",
                approval_required: true,
                payable_amount: rules.reimbursement_limit,
            }
        } else if amount > rules.approval_required_above {
            ReimbursementDecision {
                claim_status: "pending_approval",
                approval_required: true,
                payable_amount: amount,
            }
        } else {
            ReimbursementDecision {
                claim_status: "approved",
                approval_required: false,
                payable_amount: amount,
            }
        };

        self.apply_policy_to("reimbursement_policy", &mut action.result)?;
        action.result.merge(&decision)
    }

    fn budget_queries(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let department = action.result.str_param("department")?.to_string();
        action.result.insert(
            "budget_summary",
            json!({ "department": department, "fiscal_year": "current", "status": "available" }),
        );
        Ok(())
    }
}

impl DepartmentAgent for FinanceAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "expense_reimbursement" => self.expense_reimbursement(action),
            "budget_queries" => self.budget_queries(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}
