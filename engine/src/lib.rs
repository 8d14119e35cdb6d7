//! Coordination engine for the team orchestrator.
//!
//! Ties the durable store, the event bus and the fairness controllers
//! into the services workers actually talk to:
//!
//! - [`state`] - task lifecycle, claims, cascade, team operations
//! - [`workflow`] - graph instantiation and execution monitoring
//! - [`governance`] - phase gates, approvals, audit trail
//! - [`fairness`] - cooling-off, weight adjustment, adaptive thresholds
//! - [`adapters`] - external tracker/wiki contracts and registry

pub mod adapters;
pub mod fairness;
pub mod governance;
pub mod state;
pub mod workflow;

pub use adapters::{AdapterRegistry, AdapterResult, DocumentAdapter, TaskAdapter};
pub use fairness::{FairnessConfig, FairnessEngine};
pub use governance::{
    AuditAction, AuditEntry, CheckStatus, GateCheckResult, GovernanceService, PhaseGate,
    DEFAULT_APPROVAL_EXPIRY_HOURS,
};
pub use state::{StateRepositories, StateService};
pub use workflow::{ExecutorStatus, WorkflowEngine};
