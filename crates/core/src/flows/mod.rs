pub mod agent_dispatch;
pub mod engine;
pub mod internship;
pub mod plan;
pub mod states;

pub use agent_dispatch::{delegation_workflow, AgentDispatcher, DelegatedStepSpec};
pub use engine::{
    ExecutorError, ExecutorSettings, NoopObserver, StepDispatcher, StepError, StepExecutor,
    WorkflowObserver,
};
pub use internship::{internship_swap_workflow, InternshipSwapDispatcher, InternshipWorkflowData};
pub use plan::{ExecutionPlan, WorkflowGraphError};
pub use states::{StateTransitionError, StepStatus, WorkflowStatus};
