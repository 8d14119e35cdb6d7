//! Repository traits for durable state.
//!
//! These traits define the persistence interface used by the coordination
//! services. Implementations must be thread-safe and support concurrent
//! access; multi-row writes (task creation with dependencies, claims,
//! workflow instantiation) must be transactional.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    Approval, Artifact, DecisionProposal, Handoff, HandoffChecklist, HandoffStatus,
    KnowledgeItem, MembershipState, Message, NewArtifact, NewMessage, NewTask, RoleAssignment,
    Task, TaskFilter, TaskStatus, TeamMembership, Vote, WorkerState, WorkerStatus,
    WorkflowRecord, WorkflowStatus,
};

/// Persistence for tasks and their dependency edges.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task in `Pending` state, inserting its dependency edges in
    /// the same transaction. Referenced dependency ids must exist.
    async fn create(&self, task: NewTask) -> Result<Task>;

    /// Create a batch of tasks and all their dependency edges in one
    /// transaction. Dependencies may reference ids of tasks earlier in
    /// the batch (supply `NewTask.id` for those).
    async fn create_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>>;

    async fn get(&self, id: &str) -> Result<Option<Task>>;

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Transition a task, validating against the state machine. Stamps
    /// `completed_at` when the new status is terminal.
    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task>;

    /// Atomically claim a task for a worker.
    ///
    /// Inside a single transaction this re-checks that the task is still
    /// unassigned, `Ready`, and that every dependency is `Success`.
    /// Returns `Ok(None)` when the claim is lost — not an error.
    async fn try_claim(&self, id: &str, worker_id: &str) -> Result<Option<Task>>;

    /// Complete a running task, storing the result.
    /// Fails unless the current status is `Running`.
    async fn complete(&self, id: &str, result: Option<Value>) -> Result<Task>;

    /// Fail a running task, storing the error.
    async fn fail(&self, id: &str, error: &str) -> Result<Task>;

    /// Tasks ready for dispatch: `Ready`, unassigned, and matching the
    /// role (tasks with no required role match every worker). Ordered by
    /// priority descending, then creation time ascending.
    async fn ready_tasks(&self, team_id: &str, role: Option<&str>, limit: u32)
        -> Result<Vec<Task>>;

    /// Whether every dependency of the task is `Success`
    async fn dependencies_satisfied(&self, id: &str) -> Result<bool>;

    /// Tasks directly depending on the given task
    async fn dependents_of(&self, id: &str) -> Result<Vec<Task>>;

    /// Cancel every still-pending task of a workflow; returns the count
    async fn cancel_pending(&self, workflow_id: &str) -> Result<u64>;
}

/// Persistence for team messages (append-only)
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: NewMessage) -> Result<Message>;

    /// Messages visible to a worker: direct, sent, and broadcasts.
    /// With no worker, all team messages. Newest first.
    async fn list(
        &self,
        team_id: &str,
        worker_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        thread_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Message>>;
}

/// Versioned knowledge store keyed by `(team, key)`
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Insert or overwrite; an existing key gets its version bumped
    #[allow(clippy::too_many_arguments)]
    async fn upsert(
        &self,
        team_id: &str,
        key: &str,
        value: &str,
        category: Option<&str>,
        source_worker: &str,
        metadata: Value,
        tags: Vec<String>,
    ) -> Result<KnowledgeItem>;

    async fn list(
        &self,
        team_id: &str,
        key: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<KnowledgeItem>>;
}

/// Artifact metadata records
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn insert(&self, artifact: NewArtifact) -> Result<Artifact>;

    async fn list(
        &self,
        team_id: &str,
        artifact_type: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<Vec<Artifact>>;
}

/// Worker snapshots and counters, keyed by `(team, worker)`
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Insert or update the worker's snapshot
    #[allow(clippy::too_many_arguments)]
    async fn upsert_status(
        &self,
        team_id: &str,
        worker_id: &str,
        role: &str,
        status: WorkerStatus,
        current_task_id: Option<&str>,
        message: Option<&str>,
        metadata: Value,
    ) -> Result<WorkerState>;

    async fn get(&self, team_id: &str, worker_id: &str) -> Result<Option<WorkerState>>;

    async fn list(&self, team_id: &str) -> Result<Vec<WorkerState>>;

    async fn increment_completed(&self, team_id: &str, worker_id: &str) -> Result<()>;

    async fn increment_failed(&self, team_id: &str, worker_id: &str) -> Result<()>;
}

/// Decision proposals and votes
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn insert(&self, proposal: DecisionProposal) -> Result<DecisionProposal>;

    async fn get(&self, id: &str) -> Result<Option<DecisionProposal>>;

    /// Record a vote and return the updated proposal; finalization is the
    /// caller's policy.
    async fn record_vote(&self, id: &str, worker_id: &str, vote: Vote)
        -> Result<DecisionProposal>;

    async fn set_status(
        &self,
        id: &str,
        status: crate::models::DecisionStatus,
    ) -> Result<DecisionProposal>;

    async fn list(&self, team_id: &str) -> Result<Vec<DecisionProposal>>;
}

/// Workflow definitions
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert(&self, workflow: WorkflowRecord) -> Result<WorkflowRecord>;

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>>;

    async fn set_status(&self, id: &str, status: WorkflowStatus) -> Result<WorkflowRecord>;

    async fn list(&self, team_id: &str) -> Result<Vec<WorkflowRecord>>;
}

/// Team memberships, keyed by `(team, worker)`
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn insert(&self, membership: TeamMembership) -> Result<TeamMembership>;

    async fn get(&self, team_id: &str, worker_id: &str) -> Result<Option<TeamMembership>>;

    async fn list(
        &self,
        team_id: &str,
        state: Option<MembershipState>,
        persona_id: Option<&str>,
    ) -> Result<Vec<TeamMembership>>;

    /// Apply a state change (history append, lifecycle stamps) atomically
    async fn update_state(
        &self,
        team_id: &str,
        worker_id: &str,
        new_state: MembershipState,
        reason: Option<&str>,
    ) -> Result<TeamMembership>;

    async fn update_performance(
        &self,
        team_id: &str,
        worker_id: &str,
        performance_score: Option<i64>,
        task_completion_rate: Option<i64>,
        average_task_duration_hours: Option<f64>,
        collaboration_score: Option<i64>,
    ) -> Result<TeamMembership>;
}

/// Role assignments, keyed by `(team, role)`
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Create the role if missing; returns the stored assignment
    async fn ensure_role(
        &self,
        team_id: &str,
        role_id: &str,
        description: Option<&str>,
        is_required: bool,
        priority: i64,
    ) -> Result<RoleAssignment>;

    /// Assign a worker to the role, appending to the assignment history
    async fn assign(
        &self,
        team_id: &str,
        role_id: &str,
        worker_id: &str,
        assigned_by: &str,
        reason: Option<&str>,
    ) -> Result<RoleAssignment>;

    async fn get(&self, team_id: &str, role_id: &str) -> Result<Option<RoleAssignment>>;

    async fn list(&self, team_id: &str, active_only: bool) -> Result<Vec<RoleAssignment>>;
}

/// Knowledge handoffs for retiring members
#[async_trait]
pub trait HandoffRepository: Send + Sync {
    async fn insert(&self, handoff: Handoff) -> Result<Handoff>;

    async fn get(&self, id: &str) -> Result<Option<Handoff>>;

    /// Update checklist flags and captured content
    #[allow(clippy::too_many_arguments)]
    async fn update_content(
        &self,
        id: &str,
        checklist: Option<HandoffChecklist>,
        lessons: Option<String>,
        open_questions: Option<Vec<String>>,
        recommendations: Option<Vec<String>>,
        key_decisions: Option<Vec<String>>,
        artifacts_list: Option<Vec<String>>,
    ) -> Result<Handoff>;

    async fn set_status(
        &self,
        id: &str,
        status: HandoffStatus,
        completed_by: Option<&str>,
    ) -> Result<Handoff>;

    async fn list(&self, team_id: &str, worker_id: Option<&str>) -> Result<Vec<Handoff>>;
}

/// Phase-gate approvals
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn insert(&self, approval: Approval) -> Result<Approval>;

    /// Non-expired approvals for a workflow phase as of `now`
    async fn valid_for(
        &self,
        workflow_id: &str,
        phase: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Approval>>;

    /// Remove approvals for a role on a phase; true if any were removed
    async fn revoke(&self, workflow_id: &str, phase: &str, role: &str) -> Result<bool>;
}
