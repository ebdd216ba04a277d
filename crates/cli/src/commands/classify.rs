use serde::Serialize;

use deptflow_agent::{Classification, ConfidenceGate, GateDecision, IntentClassifier};

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    #[serde(flatten)]
    classification: Classification,
    threshold: f64,
    decision: &'static str,
    synthesizes_workflow: bool,
}

pub fn run(text: &str) -> CommandResult {
    let config = match load_config("classify") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    if text.trim().is_empty() {
        return CommandResult::failure("classify", "invalid_input", "request text is empty", 2);
    }

    let classification = IntentClassifier::new().classify(text);
    let gate = ConfidenceGate::new(config.orchestrator.confidence_threshold);
    let decision = match gate.evaluate(&classification) {
        GateDecision::Proceed => "delegate",
        GateDecision::Clarify { .. } => "clarify",
    };

    let message = format!(
        "classified as {} ({:.2}), {}",
        classification.intent.as_str(),
        classification.confidence,
        decision
    );
    let output = ClassifyOutput {
        synthesizes_workflow: classification.intent.synthesizes_workflow(),
        classification,
        threshold: gate.threshold(),
        decision,
    };
    CommandResult::success_with("classify", message, output)
}
