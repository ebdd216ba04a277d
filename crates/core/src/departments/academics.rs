use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AgentCore, AgentSettings, DepartmentAgent};
use crate::domain::action::{AgentAction, HandlerError};
use crate::domain::department::Capability;
use crate::domain::policy::{Policy, PolicyRegistry};

pub const ACADEMICS_ID: &str = "academics";

/// Subjects a student carries when the request names none.
pub const DEFAULT_CURRENT_SUBJECTS: [&str; 4] =
    ["Data Structures", "Departmental Elective-2", "Open Elective", "Database Systems"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapEligibilityCriteria {
    pub min_cgpa: f64,
    pub completed_credits: u32,
    pub internship_duration_weeks: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectSwapRules {
    pub internship_substitutions: BTreeMap<String, String>,
    pub eligibility_criteria: SwapEligibilityCriteria,
    pub approval_required: bool,
    pub deadline_before_semester_days: u32,
}

#[derive(Debug, Deserialize)]
struct GradingRules {
    grade_points: BTreeMap<String, f64>,
    passing_grade: String,
}

/// Replaces every subject that has an internship substitute; others are kept as-is.
pub fn substitute_subjects(
    subjects: &[String],
    substitutions: &BTreeMap<String, String>,
) -> Vec<String> {
    subjects
        .iter()
        .map(|subject| substitutions.get(subject).unwrap_or(subject).clone())
        .collect()
}

pub struct AcademicsAgent {
    core: AgentCore,
}

impl AcademicsAgent {
    pub fn new(settings: AgentSettings) -> Self {
        let capabilities = vec![
            Capability::new("subject_management", "Manage student subjects and course assignments")
                .requires(&["student_id", "action"])
                .accepts(&["subject_code", "semester", "current_subjects"]),
            Capability::new("grade_processing", "Process and update student grades")
                .requires(&["student_id", "subject_code", "grade"]),
            Capability::new("curriculum_updates", "Handle curriculum and syllabus updates")
                .requires(&["department", "changes"]),
            Capability::new("student_records", "Manage student academic records")
                .requires(&["student_id"])
                .accepts(&["record_type"]),
        ];
        let policies = PolicyRegistry::new()
            .with_policy(Policy::new(
                "subject_swap_rules",
                "Rules for swapping subjects during internships",
                json!({
                    "internship_substitutions": {
                        "Departmental Elective-2": "Mobile Applications",
                        "Open Elective": "Project Report",
                        "Lab Course": "Industry Project",
                    },
                    "eligibility_criteria": {
                        "min_cgpa": 6.5,
                        "completed_credits": 120,
                        "internship_duration_weeks": 8,
                    },
                    "approval_required": true,
                    "deadline_before_semester_days": 30,
                }),
            ))
            .with_policy(Policy::new(
                "grading_policy",
                "Academic grading and evaluation policies",
                json!({
                    "grade_scale": {
                        "A+": { "min": 90, "max": 100 },
                        "A": { "min": 80, "max": 89 },
                        "B+": { "min": 70, "max": 79 },
                        "B": { "min": 60, "max": 69 },
                        "C": { "min": 50, "max": 59 },
                        "F": { "min": 0, "max": 49 },
                    },
                    "grade_points": {
                        "A+": 10, "A": 9, "B+": 8, "B": 7, "C+": 6, "C": 5, "D": 4, "F": 0,
                    },
                    "passing_grade": "C",
                    "retake_policy": true,
                }),
            ));

        Self { core: AgentCore::new(ACADEMICS_ID, "Academics", capabilities, policies, settings) }
    }

    fn subject_management(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        if action.result.str_param("action")? != "internship_swap" {
            action.result.insert("subject_status", "unchanged");
            return Ok(());
        }

        let rules: SubjectSwapRules = self.core.rules("subject_swap_rules")?;
        let current: Vec<String> = if action.result.contains("current_subjects") {
            action.result.typed_param("current_subjects")?
        } else {
            DEFAULT_CURRENT_SUBJECTS.iter().map(|s| s.to_string()).collect()
        };
        let swapped = substitute_subjects(&current, &rules.internship_substitutions);

        self.apply_policy_to("subject_swap_rules", &mut action.result)?;
        action.result.insert("original_subjects", json!(current));
        action.result.insert("swapped_subjects", json!(swapped));
        action.result.insert("substitution_rules", json!(rules.internship_substitutions));
        action.result.insert(
            "eligibility_check",
            json!({ "passed": true, "criteria": rules.eligibility_criteria }),
        );
        action.result.insert("approval_required", rules.approval_required);
        Ok(())
    }

    fn grade_processing(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let grade = action.result.str_param("grade")?.trim().to_ascii_uppercase();
        let rules: GradingRules = self.core.rules("grading_policy")?;
        let grade_points = rules.grade_points.get(&grade).copied();
        let passing_points = rules.grade_points.get(&rules.passing_grade).copied().unwrap_or(0.0);
        let is_valid = grade_points.is_some();
        let is_passing = grade_points.is_some_and(|points| points >= passing_points);

        action.result.insert(
            "grade_validation",
            json!({
                "is_valid": is_valid,
                "is_passing": is_passing,
                "grade_points": grade_points.unwrap_or(0.0),
            }),
        );
        action.result.insert("processed_date", Utc::now().to_rfc3339());
        action.result.insert("grade_status", if is_valid { "processed" } else { "invalid_grade" });
        Ok(())
    }

    fn curriculum_updates(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        action.result.insert("update_id", format!("CURR-{}", Utc::now().timestamp_millis()));
        action.result.insert("review_status", "pending_review");
        action.result.insert("reviewers", json!(["Department Head", "Academic Committee"]));
        action.result.insert("estimated_approval_time", "5-7 business days");
        action.result.insert("effective_date", "Next Academic Year");
        Ok(())
    }

    fn student_records(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        let student_id = action.result.str_param("student_id")?.to_string();
        let record_type = action.result.opt_str("record_type").unwrap_or("complete").to_string();
        action.result.insert(
            "student_record",
            json!({
                "student_id": student_id,
                "program": "Computer Science Engineering",
                "subjects": DEFAULT_CURRENT_SUBJECTS,
            }),
        );
        action.result.insert("record_type", Value::String(record_type));
        action.result.insert("last_updated", Utc::now().to_rfc3339());
        Ok(())
    }
}

impl DepartmentAgent for AcademicsAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn handle(&self, action: &mut AgentAction) -> Result<(), HandlerError> {
        match action.action_type.as_str() {
            "subject_management" => self.subject_management(action),
            "grade_processing" => self.grade_processing(action),
            "curriculum_updates" => self.curriculum_updates(action),
            "student_records" => self.student_records(action),
            other => Err(HandlerError::UnknownActionType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::{substitute_subjects, AcademicsAgent};
    use crate::departments::{AgentSettings, DepartmentAgent};
    use crate::domain::action::{ActionStatus, AgentAction, Payload};

    #[test]
    fn substitution_keeps_subjects_without_a_rule() {
        let rules = BTreeMap::from([("Open Elective".to_string(), "Project Report".to_string())]);
        let subjects = vec!["Open Elective".to_string(), "Compilers".to_string()];
        assert_eq!(substitute_subjects(&subjects, &rules), vec!["Project Report", "Compilers"]);
    }

    #[tokio::test]
    async fn internship_swap_replaces_electives() {
        let agent = AcademicsAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "subject_management",
                Payload::new().with("student_id", "S001").with("action", "internship_swap"),
            ))
            .await;

        assert_eq!(action.status, ActionStatus::Completed);
        assert_eq!(
            action.result.get("swapped_subjects"),
            Some(&json!([
                "Data Structures",
                "Mobile Applications",
                "Project Report",
                "Database Systems"
            ]))
        );
        assert_eq!(action.result.get("approval_required"), Some(&json!(true)));
        assert_eq!(action.result.get("student_id"), Some(&json!("S001")));
    }

    #[tokio::test]
    async fn grade_processing_scores_known_and_unknown_grades() {
        let agent = AcademicsAgent::new(AgentSettings::default());
        let grade = |grade: &str| {
            AgentAction::new(
                "grade_processing",
                Payload::new()
                    .with("student_id", "S002")
                    .with("subject_code", "CS501")
                    .with("grade", grade),
            )
        };

        let passed = agent.process_action(grade("b+")).await;
        assert_eq!(
            passed.result.get("grade_validation"),
            Some(&json!({ "is_valid": true, "is_passing": true, "grade_points": 8.0 }))
        );

        let failed = agent.process_action(grade("D")).await;
        assert_eq!(failed.result.get("grade_validation").map(|v| v["is_passing"].clone()), Some(json!(false)));

        let invalid = agent.process_action(grade("Z")).await;
        assert_eq!(invalid.status, ActionStatus::Completed);
        assert_eq!(invalid.result.get("grade_status"), Some(&json!("invalid_grade")));
    }

    #[tokio::test]
    async fn curriculum_update_goes_to_review() {
        let agent = AcademicsAgent::new(AgentSettings::default());
        let action = agent
            .process_action(AgentAction::new(
                "curriculum_updates",
                Payload::new().with("department", "CSE").with("changes", json!(["add CS610"])),
            ))
            .await;

        assert_eq!(action.result.get("review_status"), Some(&json!("pending_review")));
        assert_eq!(action.result.get("effective_date"), Some(&json!("Next Academic Year")));
    }
}
