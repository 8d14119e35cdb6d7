//! State service: task lifecycle, claims, cascade, team coordination.
//!
//! Every mutation writes the durable store first, then publishes its
//! event. Events are advisory; a failed delivery never rolls anything
//! back and subscribers reconcile by polling ready tasks.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use bus::{CacheStore, EventBus, LockRegistry};
use team_core::{
    error::{CoreError, Result},
    events::{cache_keys, channels, kinds, EventEnvelope},
    retry::RetryPolicy,
    models::{
        Artifact, DecisionProposal, DecisionStatus, Handoff, HandoffChecklist, HandoffStatus,
        KnowledgeItem, MembershipState, MemberPerformance, Message, MessageKind, NewArtifact,
        NewMessage, NewTask, RoleAssignment, Task, TaskFilter, TaskStatus, TeamMembership, Vote,
        WorkerState, WorkerStatus,
    },
    repository::{
        ArtifactRepository, DecisionRepository, HandoffRepository, KnowledgeRepository,
        MembershipRepository, MessageRepository, RoleRepository, TaskRepository, WorkerRepository,
    },
};

use crate::fairness::FairnessEngine;

/// TTL on the claim lock; a crashed worker's lock expires after this
const CLAIM_LOCK_TTL: Duration = Duration::from_secs(30);

/// Cache lifetime for hot aggregates
const CACHE_TTL: Duration = Duration::from_secs(300);

/// The repository bundle the state service operates on
#[derive(Clone)]
pub struct StateRepositories {
    pub tasks: Arc<dyn TaskRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub decisions: Arc<dyn DecisionRepository>,
    pub memberships: Arc<dyn MembershipRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub handoffs: Arc<dyn HandoffRepository>,
}

impl StateRepositories {
    /// Build the bundle from one store implementing every repository
    pub fn from_store<S>(store: S) -> Self
    where
        S: TaskRepository
            + MessageRepository
            + KnowledgeRepository
            + ArtifactRepository
            + WorkerRepository
            + DecisionRepository
            + MembershipRepository
            + RoleRepository
            + HandoffRepository
            + Clone
            + Send
            + Sync
            + 'static,
    {
        Self {
            tasks: Arc::new(store.clone()),
            messages: Arc::new(store.clone()),
            knowledge: Arc::new(store.clone()),
            artifacts: Arc::new(store.clone()),
            workers: Arc::new(store.clone()),
            decisions: Arc::new(store.clone()),
            memberships: Arc::new(store.clone()),
            roles: Arc::new(store.clone()),
            handoffs: Arc::new(store),
        }
    }
}

/// Coordination service binding store, bus, locks and fairness together
pub struct StateService {
    repos: StateRepositories,
    bus: Arc<EventBus>,
    cache: Arc<CacheStore>,
    locks: LockRegistry,
    fairness: Arc<FairnessEngine>,
    retry: RetryPolicy,
}

impl StateService {
    pub fn new(
        repos: StateRepositories,
        bus: Arc<EventBus>,
        cache: Arc<CacheStore>,
        locks: LockRegistry,
        fairness: Arc<FairnessEngine>,
    ) -> Self {
        Self {
            repos,
            bus,
            cache,
            locks,
            fairness,
            retry: RetryPolicy::default(),
        }
    }

    /// Retry transient read failures with bounded backoff; permanent
    /// errors and exhausted attempts surface to the caller.
    async fn with_retries<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    tracing::warn!(
                        operation = %operation,
                        attempt = attempt,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn fairness(&self) -> Arc<FairnessEngine> {
        Arc::clone(&self.fairness)
    }

    pub fn tasks(&self) -> Arc<dyn TaskRepository> {
        Arc::clone(&self.repos.tasks)
    }

    fn publish(&self, team_id: &str, kind: &str, data: Value) {
        let envelope = EventEnvelope::new(kind, data);
        let delivered = self.bus.publish(&channels::event(team_id, kind), &envelope);
        tracing::trace!(team = %team_id, kind = %kind, delivered = delivered, "Event published");
    }

    fn task_event_data(task: &Task) -> Value {
        json!({
            "task_id": task.id,
            "title": task.title,
            "workflow_id": task.workflow_id,
            "node": task.metadata.get("node").cloned().unwrap_or(Value::Null),
            "required_role": task.required_role,
            "priority": task.priority,
            "assignee": task.assignee,
        })
    }

    // =====================================================================
    // Tasks
    // =====================================================================

    /// Create a task; entry tasks (no unmet dependencies) become ready
    /// immediately.
    pub async fn create_task(&self, task: NewTask) -> Result<Task> {
        let created = self.repos.tasks.create(task).await?;
        let task = self.promote_if_ready(created).await?;
        self.publish(
            &task.team_id,
            kinds::TASK_CREATED,
            Self::task_event_data(&task),
        );
        Ok(task)
    }

    /// Create a batch of tasks transactionally (used by workflow
    /// instantiation); readiness and events follow for each.
    pub async fn create_tasks(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        let created = self.repos.tasks.create_many(tasks).await?;
        let mut out = Vec::with_capacity(created.len());
        for task in created {
            let task = self.promote_if_ready(task).await?;
            self.publish(
                &task.team_id,
                kinds::TASK_CREATED,
                Self::task_event_data(&task),
            );
            out.push(task);
        }
        Ok(out)
    }

    async fn promote_if_ready(&self, task: Task) -> Result<Task> {
        if task.status != TaskStatus::Pending {
            return Ok(task);
        }
        let satisfied =
            task.depends_on.is_empty() || self.repos.tasks.dependencies_satisfied(&task.id).await?;
        if satisfied {
            return self.repos.tasks.set_status(&task.id, TaskStatus::Ready).await;
        }
        Ok(task)
    }

    /// Claim a ready task for a worker.
    ///
    /// Serialized by a named lock, then re-checked inside the store
    /// transaction; a lost race returns `Ok(None)`. The lock only narrows
    /// contention, the transaction is what makes the claim exclusive.
    pub async fn claim_task(&self, task_id: &str, worker_id: &str) -> Result<Option<Task>> {
        let lock_name = format!("task_lock:{task_id}");
        let Some(_guard) = self.locks.acquire(&lock_name, CLAIM_LOCK_TTL, None).await else {
            return Ok(None);
        };

        let claimed = self.repos.tasks.try_claim(task_id, worker_id).await?;

        if let Some(ref task) = claimed {
            self.fairness.record_assignment(worker_id);
            let mut data = Self::task_event_data(task);
            data["worker_id"] = json!(worker_id);
            self.publish(&task.team_id, kinds::TASK_CLAIMED, data);
        }
        Ok(claimed)
    }

    /// Complete a running task and cascade readiness to its dependents
    pub async fn complete_task(&self, task_id: &str, result: Option<Value>) -> Result<Task> {
        let task = self.repos.tasks.complete(task_id, result.clone()).await?;

        if let Some(ref worker) = task.assignee {
            self.repos
                .workers
                .increment_completed(&task.team_id, worker)
                .await?;
        }

        // Cascade: only the direct dependents need re-evaluation
        let dependents = self.repos.tasks.dependents_of(task_id).await?;
        for dependent in dependents {
            if !matches!(dependent.status, TaskStatus::Pending | TaskStatus::Blocked) {
                continue;
            }
            if self.repos.tasks.dependencies_satisfied(&dependent.id).await? {
                self.repos
                    .tasks
                    .set_status(&dependent.id, TaskStatus::Ready)
                    .await?;
            }
        }

        let mut data = Self::task_event_data(&task);
        data["result"] = result.unwrap_or(Value::Null);
        self.publish(&task.team_id, kinds::TASK_COMPLETED, data);
        Ok(task)
    }

    /// Fail a running task; direct dependents become blocked
    pub async fn fail_task(&self, task_id: &str, error: &str) -> Result<Task> {
        let task = self.repos.tasks.fail(task_id, error).await?;

        if let Some(ref worker) = task.assignee {
            self.repos
                .workers
                .increment_failed(&task.team_id, worker)
                .await?;
        }

        let dependents = self.repos.tasks.dependents_of(task_id).await?;
        for dependent in dependents {
            if matches!(dependent.status, TaskStatus::Pending | TaskStatus::Ready) {
                self.repos
                    .tasks
                    .set_status(&dependent.id, TaskStatus::Blocked)
                    .await?;
            }
        }

        let mut data = Self::task_event_data(&task);
        data["error"] = json!(error);
        self.publish(&task.team_id, kinds::TASK_FAILED, data);
        Ok(task)
    }

    /// Ready tasks dispatchable to a worker, priority-ordered.
    ///
    /// A worker in cooling-off gets an empty list; fairness trumps
    /// throughput here.
    pub async fn get_ready_tasks(
        &self,
        team_id: &str,
        worker_id: Option<&str>,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Task>> {
        if let Some(worker) = worker_id {
            if self.fairness.is_cooling_off(worker) {
                tracing::debug!(worker = %worker, "Worker cooling off, withholding tasks");
                return Ok(Vec::new());
            }
        }
        self.with_retries("ready_tasks", || {
            self.repos.tasks.ready_tasks(team_id, role, limit)
        })
        .await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_retries("get_task", || self.repos.tasks.get(task_id))
            .await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.repos.tasks.list(filter).await
    }

    /// Cancel the not-yet-running tasks of a workflow
    pub async fn cancel_workflow_tasks(&self, workflow_id: &str) -> Result<u64> {
        self.repos.tasks.cancel_pending(workflow_id).await
    }

    // =====================================================================
    // Messages
    // =====================================================================

    pub async fn post_message(&self, message: NewMessage) -> Result<Message> {
        let team_id = message.team_id.clone();
        let posted = self.repos.messages.insert(message).await?;

        let cache_key = cache_keys::recent_messages(&team_id);
        if let Ok(serialized) = serde_json::to_string(&posted) {
            self.cache.lpush(&cache_key, &serialized);
            self.cache.expire(&cache_key, CACHE_TTL);
        }

        self.publish(
            &team_id,
            kinds::MESSAGE_POSTED,
            json!({
                "message_id": posted.id,
                "from": posted.from_worker,
                "to": posted.to_worker,
                "kind": posted.kind.as_str(),
            }),
        );
        Ok(posted)
    }

    pub async fn get_messages(
        &self,
        team_id: &str,
        worker_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        thread_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        self.repos
            .messages
            .list(team_id, worker_id, since, thread_id, limit)
            .await
    }

    // =====================================================================
    // Knowledge and artifacts
    // =====================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn share_knowledge(
        &self,
        team_id: &str,
        key: &str,
        value: &str,
        source_worker: &str,
        category: Option<&str>,
        metadata: Value,
        tags: Vec<String>,
    ) -> Result<KnowledgeItem> {
        let item = self
            .repos
            .knowledge
            .upsert(team_id, key, value, category, source_worker, metadata, tags)
            .await?;

        self.publish(
            team_id,
            kinds::KNOWLEDGE_SHARED,
            json!({"key": key, "category": category, "agent": source_worker, "version": item.version}),
        );
        Ok(item)
    }

    pub async fn get_knowledge(
        &self,
        team_id: &str,
        key: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<KnowledgeItem>> {
        self.repos.knowledge.list(team_id, key, category).await
    }

    pub async fn register_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        self.repos.artifacts.insert(artifact).await
    }

    pub async fn list_artifacts(
        &self,
        team_id: &str,
        artifact_type: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<Vec<Artifact>> {
        self.repos.artifacts.list(team_id, artifact_type, task_id).await
    }

    // =====================================================================
    // Workers
    // =====================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn update_worker_status(
        &self,
        team_id: &str,
        worker_id: &str,
        role: &str,
        status: WorkerStatus,
        current_task_id: Option<&str>,
        message: Option<&str>,
        metadata: Value,
    ) -> Result<WorkerState> {
        let state = self
            .repos
            .workers
            .upsert_status(team_id, worker_id, role, status, current_task_id, message, metadata)
            .await?;

        if let Ok(snapshot) = serde_json::to_value(&state) {
            self.cache.set_json(
                &cache_keys::worker_state(team_id, worker_id),
                &snapshot,
                Some(CACHE_TTL),
            );
        }

        self.publish(
            team_id,
            kinds::AGENT_STATUS,
            json!({"agent_id": worker_id, "status": status.as_str()}),
        );
        Ok(state)
    }

    pub async fn get_team_status(&self, team_id: &str) -> Result<Vec<WorkerState>> {
        self.repos.workers.list(team_id).await
    }

    // =====================================================================
    // Decisions
    // =====================================================================

    pub async fn propose_decision(
        &self,
        team_id: &str,
        statement: &str,
        rationale: &str,
        proposed_by: &str,
        task_id: Option<&str>,
    ) -> Result<DecisionProposal> {
        let proposal = DecisionProposal {
            id: team_core::new_id(),
            team_id: team_id.to_string(),
            statement: statement.to_string(),
            rationale: rationale.to_string(),
            proposed_by: proposed_by.to_string(),
            proposed_at: Utc::now(),
            votes: Default::default(),
            status: DecisionStatus::Pending,
            finalized_at: None,
            task_id: task_id.map(|t| t.to_string()),
            metadata: Value::Null,
        };
        let stored = self.repos.decisions.insert(proposal).await?;

        self.publish(
            team_id,
            kinds::DECISION_PROPOSED,
            json!({"decision_id": stored.id, "statement": statement, "proposed_by": proposed_by}),
        );
        Ok(stored)
    }

    pub async fn record_vote(
        &self,
        decision_id: &str,
        worker_id: &str,
        vote: Vote,
    ) -> Result<DecisionProposal> {
        self.repos.decisions.record_vote(decision_id, worker_id, vote).await
    }

    /// Tally the cast votes: strictly more approvals than rejections
    /// approves, anything else rejects.
    pub async fn finalize_decision(&self, decision_id: &str) -> Result<DecisionProposal> {
        let proposal = self
            .repos
            .decisions
            .get(decision_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Decision {decision_id} not found")))?;

        let approvals = proposal.votes.values().filter(|v| **v == Vote::Approve).count();
        let rejections = proposal.votes.values().filter(|v| **v == Vote::Reject).count();
        let status = if approvals > rejections {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Rejected
        };
        self.repos.decisions.set_status(decision_id, status).await
    }

    pub async fn list_decisions(&self, team_id: &str) -> Result<Vec<DecisionProposal>> {
        self.repos.decisions.list(team_id).await
    }

    // =====================================================================
    // Membership and roles
    // =====================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn add_member(
        &self,
        team_id: &str,
        worker_id: &str,
        persona_id: &str,
        role_id: &str,
        added_by: &str,
        reason: Option<&str>,
        initial_state: Option<MembershipState>,
    ) -> Result<TeamMembership> {
        let membership = TeamMembership {
            team_id: team_id.to_string(),
            worker_id: worker_id.to_string(),
            persona_id: persona_id.to_string(),
            role_id: role_id.to_string(),
            state: initial_state.unwrap_or(MembershipState::Initializing),
            joined_at: Utc::now(),
            activated_at: None,
            retired_at: None,
            state_history: Vec::new(),
            performance_score: 100,
            task_completion_rate: 0,
            average_task_duration_hours: None,
            collaboration_score: 50,
            added_by: added_by.to_string(),
            added_reason: reason.map(|r| r.to_string()),
            retirement_reason: None,
            metadata: Value::Null,
        };
        let stored = self.repos.memberships.insert(membership).await?;

        self.publish(
            team_id,
            kinds::MEMBER_ADDED,
            json!({
                "agent_id": worker_id,
                "persona_id": persona_id,
                "role_id": role_id,
                "added_by": added_by,
            }),
        );
        Ok(stored)
    }

    pub async fn update_member_state(
        &self,
        team_id: &str,
        worker_id: &str,
        new_state: MembershipState,
        reason: Option<&str>,
    ) -> Result<TeamMembership> {
        let membership = self
            .repos
            .memberships
            .update_state(team_id, worker_id, new_state, reason)
            .await?;

        self.publish(
            team_id,
            kinds::MEMBER_STATE_CHANGED,
            json!({
                "agent_id": worker_id,
                "new_state": new_state.as_str(),
                "reason": reason,
            }),
        );
        Ok(membership)
    }

    /// Retire a member. Only legal once a completed handoff exists; the
    /// captured knowledge must not leave with the worker.
    pub async fn retire_member(
        &self,
        team_id: &str,
        worker_id: &str,
        reason: &str,
    ) -> Result<TeamMembership> {
        let handoffs = self.repos.handoffs.list(team_id, Some(worker_id)).await?;
        let completed = handoffs.iter().any(|h| h.status == HandoffStatus::Completed);
        if !completed {
            return Err(CoreError::Validation(format!(
                "Cannot retire {worker_id}: no completed handoff"
            )));
        }
        self.update_member_state(team_id, worker_id, MembershipState::Retired, Some(reason))
            .await
    }

    pub async fn get_members(
        &self,
        team_id: &str,
        state: Option<MembershipState>,
        persona_id: Option<&str>,
    ) -> Result<Vec<TeamMembership>> {
        self.repos.memberships.list(team_id, state, persona_id).await
    }

    /// Live performance metrics joined from membership, worker counters
    /// and task history. Never cached.
    pub async fn member_performance(
        &self,
        team_id: &str,
        worker_id: &str,
    ) -> Result<Option<MemberPerformance>> {
        let Some(membership) = self.repos.memberships.get(team_id, worker_id).await? else {
            return Ok(None);
        };

        let tasks = self
            .repos
            .tasks
            .list(&TaskFilter {
                team_id: Some(team_id.to_string()),
                assignee: Some(worker_id.to_string()),
                ..Default::default()
            })
            .await?;

        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Success).count() as u64;
        let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count() as u64;
        let in_flight = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Running | TaskStatus::Ready))
            .count() as u64;

        let denominator = completed + failed + in_flight;
        let completion_rate = if denominator > 0 {
            (completed * 100 / denominator) as i64
        } else {
            0
        };

        let durations: Vec<f64> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Success)
            .filter_map(|t| match (t.claimed_at, t.completed_at) {
                (Some(claimed), Some(done)) => {
                    Some((done - claimed).num_milliseconds() as f64 / 3_600_000.0)
                }
                _ => None,
            })
            .collect();
        let avg_duration = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Ok(Some(MemberPerformance {
            worker_id: worker_id.to_string(),
            persona_id: membership.persona_id.clone(),
            state: membership.state,
            performance_score: membership.performance_score,
            task_completion_rate: completion_rate,
            average_task_duration_hours: avg_duration,
            collaboration_score: membership.collaboration_score,
            total_tasks: tasks.len() as u64,
            completed_tasks: completed,
            failed_tasks: failed,
        }))
    }

    pub async fn update_member_performance(
        &self,
        team_id: &str,
        worker_id: &str,
        performance_score: Option<i64>,
        task_completion_rate: Option<i64>,
        average_task_duration_hours: Option<f64>,
        collaboration_score: Option<i64>,
    ) -> Result<TeamMembership> {
        self.repos
            .memberships
            .update_performance(
                team_id,
                worker_id,
                performance_score,
                task_completion_rate,
                average_task_duration_hours,
                collaboration_score,
            )
            .await
    }

    pub async fn ensure_role(
        &self,
        team_id: &str,
        role_id: &str,
        description: Option<&str>,
        is_required: bool,
        priority: i64,
    ) -> Result<RoleAssignment> {
        self.repos
            .roles
            .ensure_role(team_id, role_id, description, is_required, priority)
            .await
    }

    pub async fn assign_role(
        &self,
        team_id: &str,
        role_id: &str,
        worker_id: &str,
        assigned_by: &str,
        reason: Option<&str>,
    ) -> Result<RoleAssignment> {
        self.repos
            .roles
            .assign(team_id, role_id, worker_id, assigned_by, reason)
            .await
    }

    /// Resolve a role to its currently assigned worker
    pub async fn resolve_role(&self, team_id: &str, role_id: &str) -> Result<Option<String>> {
        Ok(self
            .repos
            .roles
            .get(team_id, role_id)
            .await?
            .filter(|role| role.is_active)
            .and_then(|role| role.current_worker_id))
    }

    pub async fn list_roles(&self, team_id: &str, active_only: bool) -> Result<Vec<RoleAssignment>> {
        self.repos.roles.list(team_id, active_only).await
    }

    // =====================================================================
    // Handoffs
    // =====================================================================

    pub async fn initiate_handoff(
        &self,
        team_id: &str,
        worker_id: &str,
        persona_id: &str,
        initiated_by: &str,
    ) -> Result<Handoff> {
        let handoff = Handoff {
            id: team_core::new_id(),
            team_id: team_id.to_string(),
            worker_id: worker_id.to_string(),
            persona_id: persona_id.to_string(),
            status: HandoffStatus::Initiated,
            initiated_at: Utc::now(),
            completed_at: None,
            checklist: HandoffChecklist::default(),
            lessons: None,
            open_questions: Vec::new(),
            recommendations: Vec::new(),
            key_decisions: Vec::new(),
            artifacts_list: Vec::new(),
            initiated_by: initiated_by.to_string(),
            completed_by: None,
        };
        self.repos.handoffs.insert(handoff).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_handoff(
        &self,
        handoff_id: &str,
        checklist: Option<HandoffChecklist>,
        lessons: Option<String>,
        open_questions: Option<Vec<String>>,
        recommendations: Option<Vec<String>>,
        key_decisions: Option<Vec<String>>,
        artifacts_list: Option<Vec<String>>,
    ) -> Result<Handoff> {
        self.repos
            .handoffs
            .update_content(
                handoff_id,
                checklist,
                lessons,
                open_questions,
                recommendations,
                key_decisions,
                artifacts_list,
            )
            .await
    }

    /// Complete a handoff; the checklist must be fully ticked
    pub async fn complete_handoff(&self, handoff_id: &str, completed_by: &str) -> Result<Handoff> {
        let handoff = self
            .repos
            .handoffs
            .get(handoff_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Handoff {handoff_id} not found")))?;

        if !handoff.checklist.is_complete() {
            return Err(CoreError::Validation(
                "Handoff checklist is not complete".to_string(),
            ));
        }
        self.repos
            .handoffs
            .set_status(handoff_id, HandoffStatus::Completed, Some(completed_by))
            .await
    }

    pub async fn list_handoffs(&self, team_id: &str, worker_id: Option<&str>) -> Result<Vec<Handoff>> {
        self.repos.handoffs.list(team_id, worker_id).await
    }

    // =====================================================================
    // Snapshot
    // =====================================================================

    /// Coarse counts of everything a team owns
    pub async fn workspace_snapshot(&self, team_id: &str) -> Result<Value> {
        let messages = self
            .repos
            .messages
            .list(team_id, None, None, None, u32::MAX)
            .await?;
        let tasks = self
            .repos
            .tasks
            .list(&TaskFilter {
                team_id: Some(team_id.to_string()),
                ..Default::default()
            })
            .await?;
        let knowledge = self.repos.knowledge.list(team_id, None, None).await?;
        let decisions = self.repos.decisions.list(team_id).await?;

        let mut task_counts = serde_json::Map::new();
        for task in &tasks {
            let entry = task_counts
                .entry(task.status.as_str().to_string())
                .or_insert(json!(0));
            *entry = json!(entry.as_i64().unwrap_or(0) + 1);
        }

        Ok(json!({
            "messages": messages.len(),
            "tasks": Value::Object(task_counts),
            "knowledge_items": knowledge.len(),
            "decisions": decisions.len(),
        }))
    }
}

/// Convenience constructor used by helpers and tests
pub fn default_message(team_id: &str, from_worker: &str, content: &str) -> NewMessage {
    NewMessage {
        team_id: team_id.to_string(),
        from_worker: from_worker.to_string(),
        to_worker: None,
        kind: MessageKind::Info,
        content: content.to_string(),
        metadata: Value::Null,
        thread_id: None,
    }
}
