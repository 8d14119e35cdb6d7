//! Team Orchestration Core
//!
//! Foundational domain models, the workflow graph, error handling and the
//! repository interfaces for the multi-agent team orchestrator. All other
//! crates depend on the types defined here.
//!
//! # Architecture
//!
//! - [`models`] - Domain models (Task, Message, TeamMembership, ...)
//! - [`dag`] - Workflow graph with cycle detection and topological sort
//! - [`events`] - Event payload shape and channel naming
//! - [`error`] - Error types and result handling
//! - [`repository`] - Repository traits for persistence backends

pub mod dag;
pub mod error;
pub mod events;
pub mod models;
pub mod repository;
pub mod retry;

// Re-export commonly used types at the crate root for convenience
pub use dag::{GraphBuilder, GraphNode, NodeKind, TaskGraph};
pub use error::{CoreError, Result};
pub use events::EventEnvelope;
pub use models::{
    Approval, Artifact, DecisionProposal, DecisionStatus, Handoff, HandoffChecklist,
    HandoffStatus, KnowledgeItem, MembershipState, MemberPerformance, Message, MessageKind,
    NewArtifact, NewMessage, NewTask, RoleAssignment, Task, TaskFilter, TaskStatus,
    TeamMembership, Vote, WorkerState, WorkerStatus, WorkflowRecord, WorkflowStatus,
};
pub use retry::RetryPolicy;

/// Generate a new string id (UUID v4)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_re_exports() {
        let status = TaskStatus::Ready;
        assert_eq!(status.as_str(), "ready");

        let error = CoreError::task_not_found("x");
        assert!(error.is_not_found());
    }
}
