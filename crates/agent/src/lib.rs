//! Orchestration layer for department workflows.
//!
//! Free text goes through a constrained loop:
//! 1. **Classification** (`classifier`) - ordered keyword rules produce an intent,
//!    the implicated departments and a fixed confidence.
//! 2. **Gating** (`gate`) - low-confidence requests stop and ask for clarification.
//! 3. **Orchestration** (`orchestrator`) - synthesized workflows are registered and
//!    driven through the step executor, one task per workflow id.
//! 4. **Reply** (`runtime`) - the chat runtime turns the outcome into a message and
//!    records the transcript.
//!
//! The classifier never delegates work itself; delegation only happens through
//! workflows the orchestrator executes.

pub mod classifier;
pub mod gate;
pub mod orchestrator;
pub mod runtime;

pub use classifier::{Classification, Intent, IntentClassifier};
pub use gate::{ConfidenceGate, GateDecision};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorStores, QueryInterpretation};
pub use runtime::{AgentRuntime, ChatMessage, ChatReply, ChatRole};
