use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Task lifecycle states.
///
/// The state machine is monotonic with a single exception: `Ready` and
/// `Blocked` may alternate until the task is claimed. Once a task reaches
/// `Success`, `Failed` or `Cancelled` it never changes again.
///
/// Typical flow: `Pending` -> `Ready` -> `Running` -> `Success`.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, dependencies not yet evaluated or not yet satisfied
    Pending,
    /// All dependencies satisfied, waiting for a claim
    Ready,
    /// Claimed by a worker and in progress
    Running,
    /// Completed successfully
    Success,
    /// Completed with an error
    Failed,
    /// A dependency failed; cannot proceed until it is resolved
    Blocked,
    /// Finished work waiting for a review verdict
    AwaitingReview,
    /// Cancelled before completion
    Cancelled,
}

impl TaskStatus {
    /// Stable lowercase name used in storage and event payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::AwaitingReview => "awaiting_review",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status name
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "ready" => Some(TaskStatus::Ready),
            "running" => Some(TaskStatus::Running),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            "blocked" => Some(TaskStatus::Blocked),
            "awaiting_review" => Some(TaskStatus::AwaitingReview),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work dispatched to workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub team_id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Higher values are dispatched first
    pub priority: i64,
    /// Restrict dispatch to workers holding this role
    pub required_role: Option<String>,
    pub assignee: Option<String>,
    /// Role the task was dispatched under, when role-based
    pub assignee_role: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parent_task_id: Option<String>,
    pub workflow_id: Option<String>,
    /// Ids of tasks that must reach `Success` before this one is ready
    pub depends_on: Vec<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    /// Check whether the task may move to the given state.
    ///
    /// `Ready` and `Blocked` may alternate; terminal states are frozen.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self.status, new_status) {
            (current, new) if current == new => false,
            (Pending, Ready | Blocked | Cancelled) => true,
            (Ready, Running | Blocked | Cancelled) => true,
            (Blocked, Ready | Cancelled) => true,
            (Running, Success | Failed | AwaitingReview | Cancelled) => true,
            (AwaitingReview, Success | Failed) => true,
            _ => false,
        }
    }
}

/// Data for creating a new task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Caller-supplied id; generated when absent. Supplying ids lets
    /// batch creation wire up dependencies between new tasks.
    #[serde(default)]
    pub id: Option<String>,
    pub team_id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub required_role: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub parent_task_id: Option<String>,
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTask {
    pub fn new(team_id: &str, title: &str, description: &str, created_by: &str) -> Self {
        Self {
            id: None,
            team_id: team_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            created_by: created_by.to_string(),
            required_role: None,
            priority: 0,
            parent_task_id: None,
            workflow_id: None,
            depends_on: Vec::new(),
            metadata: Value::Null,
            tags: Vec::new(),
        }
    }
}

/// Filter criteria for querying tasks.
///
/// Fields combine with AND logic; unset fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub team_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub workflow_id: Option<String>,
    pub required_role: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Kinds of team messages
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Info,
    Question,
    Response,
    Alert,
    Status,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Info => "info",
            MessageKind::Question => "question",
            MessageKind::Response => "response",
            MessageKind::Alert => "alert",
            MessageKind::Status => "status",
            MessageKind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<MessageKind> {
        match s {
            "info" => Some(MessageKind::Info),
            "question" => Some(MessageKind::Question),
            "response" => Some(MessageKind::Response),
            "alert" => Some(MessageKind::Alert),
            "status" => Some(MessageKind::Status),
            "error" => Some(MessageKind::Error),
            _ => None,
        }
    }
}

/// A message between workers. Immutable after insert; `to = None` is a
/// team-wide broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub team_id: String,
    pub from_worker: String,
    pub to_worker: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
    pub thread_id: Option<String>,
}

/// Data for posting a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub team_id: String,
    pub from_worker: String,
    pub to_worker: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    pub metadata: Value,
    pub thread_id: Option<String>,
}

/// Versioned shared knowledge. `(team_id, key)` is unique; writes bump
/// `version` and overwrite the value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub id: String,
    pub team_id: String,
    pub key: String,
    pub value: String,
    pub category: Option<String>,
    pub source_worker: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Artifact metadata. Content lives at `storage_path` in an external
/// object store; this record only describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub artifact_type: String,
    pub description: String,
    pub storage_backend: String,
    pub storage_path: String,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub task_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Data for registering a new artifact
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub team_id: String,
    pub name: String,
    pub artifact_type: String,
    pub description: String,
    pub storage_backend: String,
    pub storage_path: String,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub created_by: String,
    pub task_id: Option<String>,
    pub metadata: Value,
    pub tags: Vec<String>,
}

/// Live worker status
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Waiting,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Working => "working",
            WorkerStatus::Waiting => "waiting",
            WorkerStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<WorkerStatus> {
        match s {
            "idle" => Some(WorkerStatus::Idle),
            "working" => Some(WorkerStatus::Working),
            "waiting" => Some(WorkerStatus::Waiting),
            "error" => Some(WorkerStatus::Error),
            _ => None,
        }
    }
}

/// Worker snapshot with task counters. `(team_id, worker_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerState {
    pub team_id: String,
    pub worker_id: String,
    pub role: String,
    pub status: WorkerStatus,
    pub current_task_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
}

/// A vote cast on a decision proposal
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Approve,
    Reject,
    Abstain,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Approve => "approve",
            Vote::Reject => "reject",
            Vote::Abstain => "abstain",
        }
    }

    pub fn parse(s: &str) -> Option<Vote> {
        match s {
            "approve" => Some(Vote::Approve),
            "reject" => Some(Vote::Reject),
            "abstain" => Some(Vote::Abstain),
            _ => None,
        }
    }
}

/// Status of a decision proposal
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<DecisionStatus> {
        match s {
            "pending" => Some(DecisionStatus::Pending),
            "approved" => Some(DecisionStatus::Approved),
            "rejected" => Some(DecisionStatus::Rejected),
            _ => None,
        }
    }
}

/// A governance-level proposal put to a team vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionProposal {
    pub id: String,
    pub team_id: String,
    pub statement: String,
    pub rationale: String,
    pub proposed_by: String,
    pub proposed_at: DateTime<Utc>,
    /// worker id -> vote
    #[serde(default)]
    pub votes: BTreeMap<String, Vote>,
    pub status: DecisionStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub task_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Workflow definition status
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<WorkflowStatus> {
        match s {
            "pending" => Some(WorkflowStatus::Pending),
            "running" => Some(WorkflowStatus::Running),
            "paused" => Some(WorkflowStatus::Paused),
            "completed" => Some(WorkflowStatus::Completed),
            "failed" => Some(WorkflowStatus::Failed),
            "cancelled" => Some(WorkflowStatus::Cancelled),
            _ => None,
        }
    }
}

/// A persisted workflow definition. The serialized graph is the sole
/// source of truth for structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRecord {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub description: String,
    /// JSON-serialized task graph
    pub graph: Value,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub metadata: Value,
}

/// Team membership lifecycle state
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    /// Being onboarded
    Initializing,
    /// Actively working on tasks
    Active,
    /// Available but not actively working
    OnStandby,
    /// Gracefully removed after handoff
    Retired,
    /// Temporarily suspended
    Suspended,
    /// Moved to another team
    Reassigned,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Initializing => "initializing",
            MembershipState::Active => "active",
            MembershipState::OnStandby => "on_standby",
            MembershipState::Retired => "retired",
            MembershipState::Suspended => "suspended",
            MembershipState::Reassigned => "reassigned",
        }
    }

    pub fn parse(s: &str) -> Option<MembershipState> {
        match s {
            "initializing" => Some(MembershipState::Initializing),
            "active" => Some(MembershipState::Active),
            "on_standby" => Some(MembershipState::OnStandby),
            "retired" => Some(MembershipState::Retired),
            "suspended" => Some(MembershipState::Suspended),
            "reassigned" => Some(MembershipState::Reassigned),
            _ => None,
        }
    }
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded membership state change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Tracks a worker's lifecycle within a team. `(team_id, worker_id)` is
/// unique; the state history is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamMembership {
    pub team_id: String,
    pub worker_id: String,
    pub persona_id: String,
    pub role_id: String,
    pub state: MembershipState,
    pub joined_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state_history: Vec<StateTransition>,
    /// 0-100
    pub performance_score: i64,
    /// Percentage 0-100
    pub task_completion_rate: i64,
    pub average_task_duration_hours: Option<f64>,
    /// 0-100, based on message engagement
    pub collaboration_score: i64,
    pub added_by: String,
    pub added_reason: Option<String>,
    pub retirement_reason: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl TeamMembership {
    /// Apply a state change, recording it in the history and stamping
    /// lifecycle timestamps.
    pub fn apply_state(&mut self, new_state: MembershipState, reason: Option<&str>, now: DateTime<Utc>) {
        let old_state = self.state;
        self.state = new_state;
        self.state_history.push(StateTransition {
            from_state: old_state.as_str().to_string(),
            to_state: new_state.as_str().to_string(),
            timestamp: now,
            reason: reason.map(|r| r.to_string()),
        });

        if new_state == MembershipState::Active && self.activated_at.is_none() {
            self.activated_at = Some(now);
        } else if new_state == MembershipState::Retired && self.retired_at.is_none() {
            self.retired_at = Some(now);
            if let Some(r) = reason {
                self.retirement_reason = Some(r.to_string());
            }
        }
    }
}

/// Live performance metrics for a team member, computed on demand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberPerformance {
    pub worker_id: String,
    pub persona_id: String,
    pub state: MembershipState,
    pub performance_score: i64,
    pub task_completion_rate: i64,
    pub average_task_duration_hours: Option<f64>,
    pub collaboration_score: i64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
}

/// One historical role assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentEntry {
    pub from_worker: Option<String>,
    pub to_worker: String,
    pub assigned_by: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Role-based assignment: tasks name roles, roles resolve to workers.
/// `(team_id, role_id)` is unique; the assignment history is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAssignment {
    pub team_id: String,
    pub role_id: String,
    pub description: Option<String>,
    pub current_worker_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by: Option<String>,
    #[serde(default)]
    pub assignment_history: Vec<AssignmentEntry>,
    pub is_required: bool,
    pub is_active: bool,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Handoff lifecycle status
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Initiated,
    InProgress,
    Completed,
    Skipped,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::Initiated => "initiated",
            HandoffStatus::InProgress => "in_progress",
            HandoffStatus::Completed => "completed",
            HandoffStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<HandoffStatus> {
        match s {
            "initiated" => Some(HandoffStatus::Initiated),
            "in_progress" => Some(HandoffStatus::InProgress),
            "completed" => Some(HandoffStatus::Completed),
            "skipped" => Some(HandoffStatus::Skipped),
            _ => None,
        }
    }
}

/// Checklist that must be fully ticked before a handoff completes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HandoffChecklist {
    pub artifacts_verified: bool,
    pub documentation_complete: bool,
    pub lessons_captured: bool,
}

impl HandoffChecklist {
    pub fn is_complete(&self) -> bool {
        self.artifacts_verified && self.documentation_complete && self.lessons_captured
    }
}

/// Knowledge handoff captured before a member retires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handoff {
    pub id: String,
    pub team_id: String,
    pub worker_id: String,
    pub persona_id: String,
    pub status: HandoffStatus,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub checklist: HandoffChecklist,
    pub lessons: Option<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub artifacts_list: Vec<String>,
    pub initiated_by: String,
    pub completed_by: Option<String>,
}

/// A recorded phase-gate approval. Non-expired approvals satisfy gate
/// requirements for their role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Approval {
    pub id: String,
    pub team_id: String,
    pub workflow_id: String,
    pub phase: String,
    pub role: String,
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_id;

    fn sample_task(status: TaskStatus) -> Task {
        Task {
            id: new_id(),
            team_id: "t1".to_string(),
            title: "Sample".to_string(),
            description: "A sample task".to_string(),
            status,
            priority: 0,
            required_role: None,
            assignee: None,
            assignee_role: None,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            parent_task_id: None,
            workflow_id: None,
            depends_on: vec![],
            result: None,
            error: None,
            metadata: Value::Null,
            tags: vec![],
        }
    }

    #[test]
    fn test_task_transitions() {
        let task = sample_task(TaskStatus::Pending);
        assert!(task.can_transition_to(TaskStatus::Ready));
        assert!(task.can_transition_to(TaskStatus::Blocked));
        assert!(!task.can_transition_to(TaskStatus::Running));
        assert!(!task.can_transition_to(TaskStatus::Success));

        let task = sample_task(TaskStatus::Ready);
        assert!(task.can_transition_to(TaskStatus::Running));
        assert!(task.can_transition_to(TaskStatus::Blocked));
        assert!(!task.can_transition_to(TaskStatus::Success));

        let task = sample_task(TaskStatus::Blocked);
        assert!(task.can_transition_to(TaskStatus::Ready));
        assert!(!task.can_transition_to(TaskStatus::Running));

        let task = sample_task(TaskStatus::Running);
        assert!(task.can_transition_to(TaskStatus::Success));
        assert!(task.can_transition_to(TaskStatus::Failed));
        assert!(task.can_transition_to(TaskStatus::AwaitingReview));
        assert!(!task.can_transition_to(TaskStatus::Ready));
    }

    #[test]
    fn test_terminal_states_frozen() {
        for terminal in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Cancelled] {
            let task = sample_task(terminal);
            assert!(terminal.is_terminal());
            for target in [
                TaskStatus::Pending,
                TaskStatus::Ready,
                TaskStatus::Running,
                TaskStatus::Success,
                TaskStatus::Failed,
                TaskStatus::Blocked,
                TaskStatus::AwaitingReview,
                TaskStatus::Cancelled,
            ] {
                assert!(!task.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Ready,
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
            TaskStatus::Blocked,
            TaskStatus::AwaitingReview,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn test_membership_state_history() {
        let now = Utc::now();
        let mut membership = TeamMembership {
            team_id: "t1".to_string(),
            worker_id: "w1".to_string(),
            persona_id: "analyst".to_string(),
            role_id: "analyst".to_string(),
            state: MembershipState::Initializing,
            joined_at: now,
            activated_at: None,
            retired_at: None,
            state_history: vec![],
            performance_score: 100,
            task_completion_rate: 0,
            average_task_duration_hours: None,
            collaboration_score: 50,
            added_by: "admin".to_string(),
            added_reason: None,
            retirement_reason: None,
            metadata: Value::Null,
        };

        membership.apply_state(MembershipState::Active, Some("onboarded"), now);
        assert_eq!(membership.state, MembershipState::Active);
        assert!(membership.activated_at.is_some());
        assert_eq!(membership.state_history.len(), 1);
        assert_eq!(membership.state_history[0].from_state, "initializing");

        membership.apply_state(MembershipState::Retired, Some("project done"), now);
        assert!(membership.retired_at.is_some());
        assert_eq!(
            membership.retirement_reason.as_deref(),
            Some("project done")
        );
        assert_eq!(membership.state_history.len(), 2);
    }

    #[test]
    fn test_handoff_checklist() {
        let mut checklist = HandoffChecklist::default();
        assert!(!checklist.is_complete());
        checklist.artifacts_verified = true;
        checklist.documentation_complete = true;
        assert!(!checklist.is_complete());
        checklist.lessons_captured = true;
        assert!(checklist.is_complete());
    }
}
