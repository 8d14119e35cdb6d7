use thiserror::Error;

use crate::models::TaskStatus;

/// Result type alias for orchestrator core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error types for the team orchestration core.
///
/// Expected control flow never goes through errors: a lost claim race is
/// `Ok(None)`, a failed governance gate is a result with `passed=false`.
/// These variants cover validation failures, missing records, storage
/// problems and the few genuinely fatal conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Record not found by the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid task state transition attempted
    #[error("Invalid state transition from {0} to {1}")]
    InvalidStateTransition(TaskStatus, TaskStatus),

    /// Validation error with details (cycles, duplicate ids, bad input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// Event bus error. Callers treat this as advisory: the store is
    /// authoritative and observers reconcile on their next poll.
    #[error("Bus error: {0}")]
    Bus(String),

    /// Lock acquisition failed or timed out
    #[error("Lock error: {0}")]
    Lock(String),

    /// Serialization / deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a not found error for a task id
    pub fn task_not_found(id: &str) -> Self {
        Self::NotFound(format!("Task {id} not found"))
    }

    /// Create a not found error for a workflow id
    pub fn workflow_not_found(id: &str) -> Self {
        Self::NotFound(format!("Workflow {id} not found"))
    }

    /// Create a not found error for a team member
    pub fn member_not_found(team_id: &str, worker_id: &str) -> Self {
        Self::NotFound(format!("Member {worker_id} not found in team {team_id}"))
    }

    /// Create a validation error for an empty field
    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("Field '{field}' cannot be empty"))
    }

    /// Create a state transition error
    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidStateTransition(from, to)
    }

    /// Check if this error indicates a not found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }

    /// Check if this error indicates a validation problem
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::InvalidStateTransition(_, _)
        )
    }

    /// Check if this error indicates a database problem
    pub fn is_database(&self) -> bool {
        matches!(self, CoreError::Database(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let error = CoreError::task_not_found("t-42");
        assert_eq!(error, CoreError::NotFound("Task t-42 not found".to_string()));
        assert!(error.is_not_found());

        let error = CoreError::empty_field("title");
        assert!(error.is_validation());

        let error = CoreError::invalid_transition(TaskStatus::Pending, TaskStatus::Success);
        assert!(error.is_validation());
        assert_eq!(
            format!("{error}"),
            "Invalid state transition from pending to success"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(CoreError::Database("boom".to_string()).is_database());
        assert!(!CoreError::Bus("boom".to_string()).is_database());
        assert!(!CoreError::Validation("bad".to_string()).is_not_found());
    }
}
