//! The internship subject swap workflow: a fixed six-step chain whose steps are
//! routed by step id and communicate only through [`InternshipWorkflowData`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::engine::{StepDispatcher, StepError};
use crate::departments::academics::{substitute_subjects, ACADEMICS_ID};
use crate::departments::admin::ACADEMIC_AUTHORITY;
use crate::departments::AgentManager;
use crate::domain::department::DepartmentId;
use crate::domain::student::StudentId;
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowKind, WorkflowStep};
use crate::flows::plan::WorkflowGraphError;
use crate::store::{PolicyStore, StudentDirectory};

pub const WORKFLOW_NAME: &str = "Internship Subject Swap Workflow";
pub const SWAP_POLICY_NAME: &str = "Internship Subject Swap Policy";

pub const MIN_CGPA: f64 = 6.5;
pub const MIN_SEMESTER: u32 = 5;
pub const MIN_INTERNSHIP_WEEKS: u32 = 8;

const SUBSTITUTION_REASON: &str =
    "Internship semester subject substitution as per university policy";
const CONFIRMATION_MESSAGE: &str = "Your subjects have been updated for the internship semester. \
     Please check your academic portal for details.";

/// Subjects assumed for a student entering the internship semester.
pub const INTERNSHIP_SEMESTER_SUBJECTS: [&str; 4] =
    ["Departmental Elective-2", "Open Elective", "Database Systems", "Software Engineering"];

/// Builds the pending six-step chain.
pub fn internship_swap_workflow(id: WorkflowId) -> Result<Workflow, WorkflowGraphError> {
    let steps = vec![
        WorkflowStep::new(
            "identify_students",
            "tnp",
            "Identify students going on internship this semester",
        ),
        WorkflowStep::new(
            "check_eligibility",
            "academics",
            "Check student eligibility for subject swap",
        )
        .depends_on(&["identify_students"]),
        WorkflowStep::new("apply_swap_rules", "academics", "Apply subject swap policy rules")
            .depends_on(&["check_eligibility"]),
        WorkflowStep::new("request_approval", "admin", "Request approval from academic authority")
            .depends_on(&["apply_swap_rules"]),
        WorkflowStep::new(
            "update_records",
            "academics",
            "Update student subject records in database",
        )
        .depends_on(&["request_approval"]),
        WorkflowStep::new("notify_students", "admin", "Send notifications to affected students")
            .depends_on(&["update_records"]),
    ];
    Ok(Workflow::new(
        id,
        WORKFLOW_NAME,
        "Process subject changes for students going on internship as per university policy",
        WorkflowKind::InternshipSubjectSwap,
        steps,
    )?
    .with_required_approvals(&["academic_dean"]))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    Eligible,
    Ineligible,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapCandidate {
    pub id: StudentId,
    pub name: String,
    pub company: String,
    pub start_date: NaiveDate,
    pub duration_weeks: u32,
    pub cgpa: f64,
    pub semester: u32,
    pub current_subjects: Vec<String>,
    pub new_subjects: Vec<String>,
    pub eligibility: EligibilityStatus,
    pub ineligibility_reasons: Vec<String>,
}

impl SwapCandidate {
    pub fn is_eligible(&self) -> bool {
        self.eligibility == EligibilityStatus::Eligible
    }

    /// Every criterion the student misses, in a fixed order.
    fn failed_criteria(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.cgpa < MIN_CGPA {
            reasons.push(format!(
                "CGPA {} is below minimum requirement of {MIN_CGPA}",
                self.cgpa
            ));
        }
        if self.semester < MIN_SEMESTER {
            reasons.push(format!(
                "Student in semester {}, minimum {MIN_SEMESTER}th semester required",
                self.semester
            ));
        }
        if self.duration_weeks < MIN_INTERNSHIP_WEEKS {
            reasons.push(format!(
                "Internship duration {} weeks is below minimum {MIN_INTERNSHIP_WEEKS} weeks",
                self.duration_weeks
            ));
        }
        reasons
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectSwapRule {
    pub original_subject: String,
    pub replacement_subject: String,
    pub credits: u32,
    pub reason: String,
}

fn replacement_credits(subject: &str) -> u32 {
    match subject {
        "Project Report" => 4,
        "Industry Project" => 6,
        _ => 3,
    }
}

/// The shared data bag threaded through the six steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternshipWorkflowData {
    pub students: Vec<SwapCandidate>,
    pub swap_rules: Vec<SubjectSwapRule>,
    pub approval_required: bool,
    pub approved_by: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for InternshipWorkflowData {
    fn default() -> Self {
        Self {
            students: Vec::new(),
            swap_rules: Vec::new(),
            approval_required: true,
            approved_by: None,
            approval_date: None,
            completed_at: None,
        }
    }
}

impl InternshipWorkflowData {
    pub fn eligible(&self) -> impl Iterator<Item = &SwapCandidate> {
        self.students.iter().filter(|student| student.is_eligible())
    }

    pub fn ineligible(&self) -> impl Iterator<Item = &SwapCandidate> {
        self.students.iter().filter(|student| !student.is_eligible())
    }
}

#[derive(Debug, Deserialize)]
struct StoredSwapPolicy {
    substitutions: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct EligibilityResult<'a> {
    student_id: &'a StudentId,
    name: &'a str,
    eligible: bool,
    reasons: &'a [String],
}

#[derive(Serialize)]
struct RecordUpdate<'a> {
    student_id: &'a StudentId,
    name: &'a str,
    original_subjects: &'a [String],
    new_subjects: &'a [String],
    update_status: &'static str,
    update_timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct Notification<'a> {
    student_id: &'a StudentId,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    sent_at: DateTime<Utc>,
}

pub struct InternshipSwapDispatcher {
    students: Arc<dyn StudentDirectory>,
    policies: Arc<dyn PolicyStore>,
    agents: Arc<AgentManager>,
}

impl InternshipSwapDispatcher {
    pub fn new(
        students: Arc<dyn StudentDirectory>,
        policies: Arc<dyn PolicyStore>,
        agents: Arc<AgentManager>,
    ) -> Self {
        Self { students, policies, agents }
    }

    async fn identify_students(&self, data: &mut InternshipWorkflowData) -> Result<Value, StepError> {
        let records = self.students.internship_students().await?;
        data.students = records
            .into_iter()
            .map(|record| SwapCandidate {
                id: record.id,
                name: record.name,
                company: record.company_name,
                start_date: record.start_date,
                duration_weeks: record.duration_weeks,
                cgpa: record.cgpa,
                semester: record.semester,
                current_subjects: INTERNSHIP_SEMESTER_SUBJECTS.iter().map(|s| s.to_string()).collect(),
                new_subjects: Vec::new(),
                eligibility: EligibilityStatus::Eligible,
                ineligibility_reasons: Vec::new(),
            })
            .collect();

        let listed: Vec<Value> = data
            .students
            .iter()
            .map(|student| {
                json!({
                    "id": student.id,
                    "name": student.name,
                    "company": student.company,
                    "start_date": student.start_date,
                })
            })
            .collect();
        Ok(json!({
            "students_found": data.students.len(),
            "students": listed,
            "message": format!(
                "Successfully identified {} students going for internship",
                data.students.len()
            ),
        }))
    }

    fn check_eligibility(&self, data: &mut InternshipWorkflowData) -> Value {
        for student in &mut data.students {
            let reasons = student.failed_criteria();
            student.eligibility = if reasons.is_empty() {
                EligibilityStatus::Eligible
            } else {
                EligibilityStatus::Ineligible
            };
            student.ineligibility_reasons = reasons;
        }

        let results: Vec<EligibilityResult<'_>> = data
            .students
            .iter()
            .map(|student| EligibilityResult {
                student_id: &student.id,
                name: &student.name,
                eligible: student.is_eligible(),
                reasons: &student.ineligibility_reasons,
            })
            .collect();
        let eligible = data.eligible().count();
        let ineligible = data.students.len() - eligible;
        json!({
            "total_students": data.students.len(),
            "eligible_students": eligible,
            "ineligible_students": ineligible,
            "eligibility_results": results,
            "message": format!(
                "Eligibility check completed: {eligible} eligible, {ineligible} ineligible"
            ),
        })
    }

    async fn apply_swap_rules(&self, data: &mut InternshipWorkflowData) -> Result<Value, StepError> {
        let department = DepartmentId::from(ACADEMICS_ID);
        let policy = self
            .policies
            .get_policy_by_name(SWAP_POLICY_NAME, &department)
            .await?
            .ok_or_else(|| StepError::PolicyNotFound {
                name: SWAP_POLICY_NAME.to_string(),
                department: department.0.clone(),
            })?;
        let rules: StoredSwapPolicy = policy
            .rules_as()
            .map_err(|error| StepError::Handler(error.into()))?;

        data.swap_rules = rules
            .substitutions
            .iter()
            .map(|(original, replacement)| SubjectSwapRule {
                original_subject: original.clone(),
                replacement_subject: replacement.clone(),
                credits: replacement_credits(replacement),
                reason: SUBSTITUTION_REASON.to_string(),
            })
            .collect();
        for student in data.students.iter_mut().filter(|student| student.is_eligible()) {
            student.new_subjects = substitute_subjects(&student.current_subjects, &rules.substitutions);
        }

        let affected = data.eligible().count();
        Ok(json!({
            "swap_rules_applied": data.swap_rules.len(),
            "affected_students": affected,
            "swap_rules": data.swap_rules,
            "policy_reference": policy.name,
            "message": format!(
                "Applied {} subject swap rules to {affected} eligible students",
                data.swap_rules.len()
            ),
        }))
    }

    fn request_approval(&self, workflow_id: &WorkflowId, data: &mut InternshipWorkflowData) -> Value {
        let now = Utc::now();
        let request = json!({
            "workflow_id": workflow_id,
            "request_type": "subject_swap_approval",
            "students_affected": data.eligible().count(),
            "swap_rules": data.swap_rules,
            "requested_by": "Training & Placement Cell",
            "request_date": now,
            "urgency": "normal",
        });
        let response = json!({
            "status": "approved",
            "approved_by": ACADEMIC_AUTHORITY,
            "approval_date": now,
            "approval_comments": "Approved as per university internship policy. \
                Subject swaps are valid for internship semester.",
            "approval_reference": format!("APPROVAL-{}", now.timestamp_millis()),
        });
        data.approved_by = Some(ACADEMIC_AUTHORITY.to_string());
        data.approval_date = Some(now);

        json!({
            "approval_request": request,
            "approval_response": response,
            "message": format!("Approval received from {ACADEMIC_AUTHORITY}"),
        })
    }

    fn update_records(&self, data: &mut InternshipWorkflowData) -> Value {
        let now = Utc::now();
        let updates: Vec<RecordUpdate<'_>> = data
            .eligible()
            .map(|student| RecordUpdate {
                student_id: &student.id,
                name: &student.name,
                original_subjects: &student.current_subjects,
                new_subjects: &student.new_subjects,
                update_status: "success",
                update_timestamp: now,
            })
            .collect();
        json!({
            "records_updated": updates.len(),
            "update_results": updates,
            "message": format!(
                "Successfully updated academic records for {} students",
                updates.len()
            ),
        })
    }

    fn notify_students(&self, data: &mut InternshipWorkflowData) -> Value {
        let now = Utc::now();
        let confirmations = data.eligible().map(|student| Notification {
            student_id: &student.id,
            name: &student.name,
            kind: "subject_swap_confirmation",
            message: CONFIRMATION_MESSAGE.to_string(),
            sent_at: now,
        });
        let notices = data.ineligible().map(|student| Notification {
            student_id: &student.id,
            name: &student.name,
            kind: "eligibility_notice",
            message: format!(
                "Subject swap not applicable. Reasons: {}",
                student.ineligibility_reasons.join(", ")
            ),
            sent_at: now,
        });
        let notifications: Vec<Notification<'_>> = confirmations.chain(notices).collect();
        let eligible = data.eligible().count();
        let output = json!({
            "notifications_sent": notifications.len(),
            "eligible_notifications": eligible,
            "ineligible_notifications": notifications.len() - eligible,
            "notifications": notifications,
            "message": format!("Sent {} notifications to students", notifications.len()),
        });
        data.completed_at = Some(now);
        output
    }
}

#[async_trait]
impl StepDispatcher for InternshipSwapDispatcher {
    type Context = InternshipWorkflowData;

    async fn dispatch(
        &self,
        workflow_id: &WorkflowId,
        step: &WorkflowStep,
        data: &mut Self::Context,
    ) -> Result<Value, StepError> {
        let agent = self.agents.ensure_available(&step.department)?;
        let _turn = agent.core().reserve().await?;
        agent.core().simulate_latency().await;
        debug!(
            event_name = "workflow.internship.dispatch",
            correlation_id = %workflow_id,
            step_id = %step.id,
            department = %agent.id(),
            "routing internship step"
        );
        match step.id.0.as_str() {
            "identify_students" => self.identify_students(data).await,
            "check_eligibility" => Ok(self.check_eligibility(data)),
            "apply_swap_rules" => self.apply_swap_rules(data).await,
            "request_approval" => Ok(self.request_approval(workflow_id, data)),
            "update_records" => Ok(self.update_records(data)),
            "notify_students" => Ok(self.notify_students(data)),
            other => Err(StepError::UnknownStep(other.to_string())),
        }
    }
}
