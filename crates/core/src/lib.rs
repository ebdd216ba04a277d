pub mod audit;
pub mod config;
pub mod departments;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod store;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use departments::{AgentManager, AgentSettings, DelegationError, DepartmentAgent};
pub use domain::action::{ActionStatus, AgentAction, HandlerError, Payload};
pub use domain::department::{AgentStatus, Capability, DepartmentId, DepartmentSummary};
pub use domain::policy::{Policy, PolicyError, PolicyMode, PolicyRegistry};
pub use domain::student::{InternshipStudentRecord, StudentId};
pub use domain::workflow::{StepId, Workflow, WorkflowId, WorkflowKind, WorkflowStep};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{StepStatus, WorkflowStatus};
pub use store::{PolicyStore, StoreError, StudentDirectory, WorkflowStore};
