use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use deptflow_core::domain::workflow::{Workflow, WorkflowId};
use deptflow_core::flows::WorkflowStatus;

use crate::classifier::{Classification, Intent};
use crate::gate::{ConfidenceGate, GateDecision};
use crate::orchestrator::{Orchestrator, OrchestratorError};

const WELCOME: &str = "Welcome! I coordinate cross-departmental tasks. I can help with \
     internships, leave requests, expense reimbursements, IT support, and more.";
const WORKFLOW_COMPLETED: &str = " The workflow has been completed successfully.";
const WORKFLOW_FAILED: &str = " However, I encountered an issue while processing the workflow. \
     Please try again or contact support.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub sequence: usize,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: Option<WorkflowId>,
    pub workflow_status: Option<WorkflowStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatReply {
    pub classification: Classification,
    /// The confidence gate accepted the request. Only internship requests also run a
    /// workflow; see `workflow`.
    pub gate_passed: bool,
    pub message: String,
    pub workflow: Option<Workflow>,
}

fn intent_reply(intent: Intent) -> &'static str {
    match intent {
        Intent::InternshipSubjectSwap => {
            "I'll help you process the internship subject swap workflow. Let me coordinate with \
             Training & Placement and Academics departments to handle this request according to \
             university policy."
        }
        Intent::LeaveRequest => {
            "I'll help you with your leave request. Let me check with HR department for the \
             approval process and policy requirements."
        }
        Intent::ExpenseReimbursement => {
            "I'll assist you with expense reimbursement. Let me coordinate with Finance and HR \
             departments to process your request."
        }
        Intent::ItSupport => {
            "I'll connect you with IT Support to resolve your technical issue. Let me create a \
             support ticket for you."
        }
        Intent::GeneralInquiry => {
            "I understand your request. Let me process this and coordinate with the relevant \
             departments to help you."
        }
    }
}

/// Chat front end over the orchestrator. Keeps the session transcript.
pub struct AgentRuntime {
    orchestrator: Arc<Orchestrator>,
    gate: ConfidenceGate,
    transcript: Mutex<Vec<ChatMessage>>,
}

impl AgentRuntime {
    pub fn new(orchestrator: Arc<Orchestrator>, gate: ConfidenceGate) -> Self {
        let runtime = Self { orchestrator, gate, transcript: Mutex::new(Vec::new()) };
        runtime.record(ChatRole::System, WELCOME.to_string(), None);
        runtime
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn handle_message(&self, text: &str) -> Result<ChatReply, OrchestratorError> {
        self.record(ChatRole::User, text.to_string(), None);
        let interpretation = self.orchestrator.interpret_query(text)?;

        let classification = interpretation.classification;
        if let GateDecision::Clarify { reason_code, user_message } =
            self.gate.evaluate(&classification)
        {
            info!(
                event_name = "agent.runtime.clarify",
                correlation_id = "chat",
                reason_code,
                confidence = classification.confidence,
                threshold = self.gate.threshold(),
                "asking for clarification"
            );
            self.record(ChatRole::Assistant, user_message.clone(), None);
            return Ok(ChatReply {
                classification,
                gate_passed: false,
                message: user_message,
                workflow: None,
            });
        }

        let mut message = intent_reply(classification.intent).to_string();
        let workflow = match interpretation.workflow {
            Some(workflow) => match self.orchestrator.execute_workflow(&workflow.id).await {
                Ok(finished) => {
                    message.push_str(if finished.status == WorkflowStatus::Completed {
                        WORKFLOW_COMPLETED
                    } else {
                        WORKFLOW_FAILED
                    });
                    Some(finished)
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.runtime.workflow_failed",
                        correlation_id = %workflow.id,
                        error = %error,
                        "workflow could not be executed"
                    );
                    message.push_str(WORKFLOW_FAILED);
                    self.orchestrator.workflow_status(&workflow.id)
                }
            },
            None => None,
        };

        self.record(ChatRole::Assistant, message.clone(), workflow.as_ref());
        Ok(ChatReply { classification, gate_passed: true, message, workflow })
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        match self.transcript.lock() {
            Ok(transcript) => transcript.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, role: ChatRole, content: String, workflow: Option<&Workflow>) {
        let mut transcript = match self.transcript.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sequence = transcript.len();
        transcript.push(ChatMessage {
            sequence,
            role,
            content,
            timestamp: Utc::now(),
            workflow_id: workflow.map(|w| w.id.clone()),
            workflow_status: workflow.map(|w| w.status),
        });
    }
}
