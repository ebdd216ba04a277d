use crate::classifier::Classification;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

const CLARIFICATION_PROMPT: &str = "I'm not entirely sure about your request. Could you please \
     provide more details? I can help with internships, leave requests, expenses, IT support, and \
     other departmental tasks.";

#[derive(Clone, Debug, PartialEq)]
pub enum GateDecision {
    Proceed,
    Clarify { reason_code: &'static str, user_message: String },
}

impl GateDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Blocks delegation for classifications at or below the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self { threshold: DEFAULT_CONFIDENCE_THRESHOLD }
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, classification: &Classification) -> GateDecision {
        if classification.confidence > self.threshold {
            GateDecision::Proceed
        } else {
            GateDecision::Clarify {
                reason_code: "low_confidence",
                user_message: CLARIFICATION_PROMPT.to_string(),
            }
        }
    }
}
