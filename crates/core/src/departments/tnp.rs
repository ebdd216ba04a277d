use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};
use crate::domain::student::InternshipStudentRecord;

pub const TNP_ID: &str = "tnp";

#[derive(Debug, Deserialize, Serialize)]
struct InternshipEligibilityRules {
    min_cgpa: f64,
    min_completed_semesters: u32,
    max_backlogs: u32,
}

#[derive(Debug, Deserialize)]
struct TierThreshold {
    min_package: f64,
}

#[derive(Debug, Deserialize)]
struct CompanyCategories {
    tier1: TierThreshold,
    tier2: TierThreshold,
    tier3: TierThreshold,
}

#[derive(Debug, Deserialize)]
struct PlacementRules {
    eligibility_criteria: serde_json::Value,
    company_categories: CompanyCategories,
}

#[derive(Debug, Deserialize)]
struct StudentStanding {
    cgpa: f64,
    semester: u32,
    #[serde(default)]
    backlogs: u32,
}

#[derive(Debug, Serialize)]
struct EligibilityResult {
    is_eligible: bool,
    cgpa_check: bool,
    semester_check: bool,
    backlog_check: bool,
}

pub struct TrainingPlacementAgent {
    core: AgentCore,
    interns: Vec<InternshipStudentRecord>,
}

impl TrainingPlacementAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("internship_management", "Manage student internship programs")
                .requires(&["action"])
                .accepts(&["student_id", "company_id", "internship_id", "student"]),
            Capability::new("placement_coordination", "Coordinate campus placement activities")
                .requires(&["company_id", "job_role"])
                .accepts(&["requirements", "package"]),
            Capability::new("company_relations", "Manage relationships with recruiting companies")
                .requires(&["company_id"])
                .accepts(&["action", "data"]),
            Capability::new("student_tracking", "Track student placement and internship status")
                .requires(&["student_id"]),
        ];
        let policies = PolicyRegistry::new()
            .with_policy(Policy::new(
                "internship_eligibility",
                "Criteria for internship eligibility",
                json!({
                    "min_cgpa": 6.5,
                    "min_completed_semesters": 4,
                    "max_backlogs": 2,
                    "internship_duration_weeks": { "min": 8, "max": 24 },
                    "approved_companies": [
                        "TechCorp", "InnovateLab", "DataSys", "CloudTech", "AI Solutions"
                    ],
                }),
            ))
            .with_policy(Policy::new(
                "placement_policy",
                "Campus placement guidelines",
                json!({
                    "eligibility_criteria": { "min_cgpa": 7.0, "max_backlogs": 0, "final_year": true },
                    "multiple_offers": { "allowed": true, "max_offers": 2, "higher_package_rule": true },
                    "company_categories": {
                        "tier1": { "min_package": 1_000_000 },
                        "tier2": { "min_package": 600_000 },
                        "tier3": { "min_package": 300_000 },
                    },
                }),
            ));

        Self {
            core: AgentCore::new(TNP_ID, "Training & Placement", capabilities, policies, settings),
            interns: Vec::new(),
        }
    }

    /// Students reported by `get_intern_list`.
    pub fn with_interns(mut self, interns: Vec<InternshipStudentRecord>) -> Self {
        self.interns = interns;
        self
    }

    fn internship_management(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let rules: InternshipEligibilityRules = self.core.rules("internship_eligibility")?;
        let operation = action.result.str_param("action")?.to_string();
        match operation.as_str() {
            "get_intern_list" => {
                self.apply_policy_to("internship_eligibility", &mut action.result)?;
                action.result.insert("intern_students", json!(self.interns));
                action.result.insert("total_count", self.interns.len());
                action.result.insert("generated_at", Utc::now().to_rfc3339());
                Ok(())
            }
            "verify_eligibility" => {
                let student: StudentStanding = action.result.typed_param("student")?;
                let cgpa_check = student.cgpa >= rules.min_cgpa;
                let semester_check = student.semester >= rules.min_completed_semesters;
                let backlog_check = student.backlogs <= rules.max_backlogs;
                self.apply_policy_to("internship_eligibility", &mut action.result)?;
                let result = EligibilityResult {
                    is_eligible: cgpa_check && semester_check && backlog_check,
                    cgpa_check,
                    semester_check,
                    backlog_check,
                };
                action.result.merge(&json!({ "eligibility_result": result }))
            }
            other => Err(HandlerError::InvalidParameter {
                name: "action".to_string(),
                reason: format!("unsupported internship action `{other}`"),
            }),
        }
    }

    fn placement_coordination(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let company_id = action.result.str_param("company_id")?.to_string();
        let job_role = action.result.str_param("job_role")?.to_string();
        let rules: PlacementRules = self.core.rules("placement_policy")?;
        let tier = company_tier(action.result.opt_f64("package"), &rules.company_categories);
        let now = Utc::now();

        action.result.insert(
            "placement_drive",
            json!({
                "id": format!("PD-{}", now.timestamp_millis()),
                "company": company_id,
                "role": job_role,
                "scheduled_date": (now + ChronoDuration::days(7)).to_rfc3339(),
                "registration_deadline": (now + ChronoDuration::days(3)).to_rfc3339(),
                "status": "scheduled",
            }),
        );
        action.result.insert("eligibility_criteria", rules.eligibility_criteria);
        action.result.insert("company_tier", tier);
        Ok(())
    }

    fn company_relations(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let company_id = action.result.str_param("company_id")?.to_string();
        action.result.insert(
            "company_info",
            json!({ "id": company_id, "relationship": "Recruiting Partner" }),
        );
        action.result.insert("last_updated", Utc::now().to_rfc3339());
        Ok(())
    }

    fn student_tracking(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let student_id = action.result.str_param("student_id")?.to_string();
        let internship = self.interns.iter().find(|intern| intern.id.0 == student_id);
        let current_status = if internship.is_some() { "on_internship" } else { "on_campus" };
        action.result.insert(
            "student_status",
            json!({
                "id": student_id,
                "current_status": current_status,
                "internship": internship,
            }),
        );
        action.result.insert("tracking_date", Utc::now().to_rfc3339());
        Ok(())
    }
}

fn company_tier(package: Option<f64>, categories: &CompanyCategories) -> &'static str {
    match package {
        Some(amount) if amount >= categories.tier1.min_package => "tier1",
        Some(amount) if amount >= categories.tier2.min_package => "tier2",
        Some(amount) if amount >= categories.tier3.min_package => "tier3",
        _ => "unclassified",
    }
}

impl DepartmentAgent for TrainingPlacementAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "internship_management" => self.internship_management(action),
            "placement_coordination" => self.placement_coordination(action),
            "company_relations" => self.company_relations(action),
            "student_tracking" => self.student_tracking(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::TrainingPlacementAgent;
    use crate::departments::{AgentSettings, DepartmentAgent};
    use crate::domain::action::{ActionStatus, AgentAction, Payload};
    use crate::domain::student::{InternshipStudentRecord, StudentId};

    fn intern() -> InternshipStudentRecord {
        InternshipStudentRecord {
            id: StudentId("S001".to_string()),
            name: "John Doe".to_string(),
            company_name: "TechCorp Solutions".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
            duration_weeks: 12,
            cgpa: 8.5,
            semester: 6,
        }
    }

    #[tokio::test]
    async fn intern_list_reports_roster_and_rules() {
        let agent =
            TrainingPlacementAgent::new(AgentSettings::default()).with_interns(vec![intern()]);
        let action = agent
            .process_action(AgentAction::new(
                "internship_management",
                Payload::new().with("action", "get_intern_list"),
            ))
            .await;

        assert_eq!(action.status, ActionStatus::Completed);
        assert_eq!(action.result.get("total_count"), Some(&json!(1)));
        let rules = action.result.get("applied_rules").cloned().unwrap_or_default();
        assert_eq!(rules["min_cgpa"], json!(6.5));
    }

    #[tokio::test]
    async fn verify_eligibility_checks_each_criterion() {
        let agent = TrainingPlacementAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "internship_management",
                Payload::new()
                    .with("action", "verify_eligibility")
                    .with("student", json!({ "cgpa": 7.1, "semester": 6, "backlogs": 3 })),
            ))
            .await;

        assert_eq!(
            action.result.get("eligibility_result"),
            Some(&json!({
                "is_eligible": false,
                "cgpa_check": true,
                "semester_check": true,
                "backlog_check": false,
            }))
        );
    }

    #[tokio::test]
    async fn placement_tier_follows_package_thresholds() {
        let agent = TrainingPlacementAgent::new(AgentSettings::default());
        let cases = [
            (Some(1_200_000.0), "tier1"),
            (Some(650_000.0), "tier2"),
            (Some(100.0), "unclassified"),
            (None, "unclassified"),
        ];
        for (package, tier) in cases {
            let mut params = Payload::new().with("company_id", "COMP001").with("job_role", "SDE");
            if let Some(package) = package {
                params.insert("package", package);
            }
            let action =
                agent.process_action(AgentAction::new("placement_coordination", params)).await;
            assert_eq!(action.result.get("company_tier"), Some(&json!(tier)));
        }
    }

    #[tokio::test]
    async fn unsupported_internship_action_fails() {
        let agent = TrainingPlacementAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "internship_management",
                Payload::new().with("action", "cancel_everything"),
            ))
            .await;
        assert_eq!(action.status, ActionStatus::Failed);
        assert!(action.error.as_deref().is_some_and(|e| e.contains("cancel_everything")));
    }
}
