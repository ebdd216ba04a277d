use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

macro_rules! status_labels {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    Self::Pending => "pending",
                    Self::Processing => "processing",
                    Self::Completed => "completed",
                    Self::Failed => "failed",
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value.trim().to_ascii_lowercase().as_str() {
                    "pending" => Some(Self::Pending),
                    "processing" => Some(Self::Processing),
                    "completed" => Some(Self::Completed),
                    "failed" => Some(Self::Failed),
                    _ => None,
                }
            }

            pub fn is_terminal(&self) -> bool {
                matches!(self, Self::Completed | Self::Failed)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_labels!(WorkflowStatus);
status_labels!(StepStatus);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("invalid step transition from {from} to {to}")]
    Step { from: StepStatus, to: StepStatus },
    #[error("invalid workflow transition from {from} to {to}")]
    Workflow { from: WorkflowStatus, to: WorkflowStatus },
}

impl StepStatus {
    /// A step that never started may still fail, e.g. when execution is cancelled just
    /// before it would have been dispatched.
    pub fn transition(self, to: StepStatus) -> Result<StepStatus, StateTransitionError> {
        use StepStatus::{Completed, Failed, Pending, Processing};

        match (self, to) {
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
            | (Pending, Failed) => Ok(to),
            (from, to) => Err(StateTransitionError::Step { from, to }),
        }
    }
}

impl WorkflowStatus {
    pub fn transition(self, to: WorkflowStatus) -> Result<WorkflowStatus, StateTransitionError> {
        use WorkflowStatus::{Completed, Failed, Pending, Processing};

        match (self, to) {
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) => Ok(to),
            (from, to) => Err(StateTransitionError::Workflow { from, to }),
        }
    }
}
