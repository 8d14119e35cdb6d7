use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};
use team_core::{
    error::{CoreError, Result},
    models::{
        Approval, Artifact, DecisionProposal, DecisionStatus, Handoff, HandoffChecklist,
        HandoffStatus, KnowledgeItem, MembershipState, Message, MessageKind, RoleAssignment,
        Task, TaskStatus, TeamMembership, Vote, WorkerState, WorkerStatus, WorkflowRecord,
        WorkflowStatus,
    },
};

/// Convert a SQLx error into the core error type
pub fn sqlx_error_to_core_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                CoreError::Validation(format!("Unique constraint violated: {message}"))
            } else {
                CoreError::Database(format!("Database constraint error: {message}"))
            }
        }
        sqlx::Error::PoolTimedOut => CoreError::Database("Connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => CoreError::Database(format!("Database I/O error: {io_err}")),
        _ => CoreError::Database(format!("Database operation failed: {err}")),
    }
}

/// Parse a status column, failing loudly on unknown values
pub fn parse_task_status(s: &str) -> Result<TaskStatus> {
    TaskStatus::parse(s)
        .ok_or_else(|| CoreError::Database(format!("Invalid task status in database: {s}")))
}

pub fn parse_workflow_status(s: &str) -> Result<WorkflowStatus> {
    WorkflowStatus::parse(s)
        .ok_or_else(|| CoreError::Database(format!("Invalid workflow status in database: {s}")))
}

pub fn parse_membership_state(s: &str) -> Result<MembershipState> {
    MembershipState::parse(s)
        .ok_or_else(|| CoreError::Database(format!("Invalid membership state in database: {s}")))
}

pub fn parse_handoff_status(s: &str) -> Result<HandoffStatus> {
    HandoffStatus::parse(s)
        .ok_or_else(|| CoreError::Database(format!("Invalid handoff status in database: {s}")))
}

/// Decode an optional JSON text column; absent or malformed becomes Null
pub fn json_column(row: &SqliteRow, column: &str) -> Value {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

/// Decode a JSON string-array column
pub fn string_list_column(row: &SqliteRow, column: &str) -> Vec<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Encode a JSON value for storage; Null stores as SQL NULL
pub fn json_text(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn list_text(list: &[String]) -> Option<String> {
    if list.is_empty() {
        None
    } else {
        serde_json::to_string(list).ok()
    }
}

/// Map a task row to the model; dependency ids are loaded separately
pub fn row_to_task(row: &SqliteRow, depends_on: Vec<String>) -> Result<Task> {
    let status: String = row.get("status");

    Ok(Task {
        id: row.get("id"),
        team_id: row.get("team_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: parse_task_status(&status)?,
        priority: row.get("priority"),
        required_role: row.get("required_role"),
        assignee: row.get("assignee"),
        assignee_role: row.get("assignee_role"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        claimed_at: row.get("claimed_at"),
        completed_at: row.get("completed_at"),
        parent_task_id: row.get("parent_task_id"),
        workflow_id: row.get("workflow_id"),
        depends_on,
        result: row
            .try_get::<Option<String>, _>("result")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get("error"),
        metadata: json_column(row, "metadata"),
        tags: string_list_column(row, "tags"),
    })
}

pub fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let kind: String = row.get("kind");
    Ok(Message {
        id: row.get("id"),
        team_id: row.get("team_id"),
        from_worker: row.get("from_worker"),
        to_worker: row.get("to_worker"),
        kind: MessageKind::parse(&kind)
            .ok_or_else(|| CoreError::Database(format!("Invalid message kind: {kind}")))?,
        content: row.get("content"),
        metadata: json_column(row, "metadata"),
        timestamp: row.get("timestamp"),
        thread_id: row.get("thread_id"),
    })
}

pub fn row_to_knowledge(row: &SqliteRow) -> Result<KnowledgeItem> {
    Ok(KnowledgeItem {
        id: row.get("id"),
        team_id: row.get("team_id"),
        key: row.get("key"),
        value: row.get("value"),
        category: row.get("category"),
        source_worker: row.get("source_worker"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
        metadata: json_column(row, "metadata"),
        tags: string_list_column(row, "tags"),
    })
}

pub fn row_to_artifact(row: &SqliteRow) -> Result<Artifact> {
    Ok(Artifact {
        id: row.get("id"),
        team_id: row.get("team_id"),
        name: row.get("name"),
        artifact_type: row.get("artifact_type"),
        description: row.get("description"),
        storage_backend: row.get("storage_backend"),
        storage_path: row.get("storage_path"),
        size_bytes: row.get("size_bytes"),
        mime_type: row.get("mime_type"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        task_id: row.get("task_id"),
        metadata: json_column(row, "metadata"),
        tags: string_list_column(row, "tags"),
    })
}

pub fn row_to_worker(row: &SqliteRow) -> Result<WorkerState> {
    let status: String = row.get("status");
    Ok(WorkerState {
        team_id: row.get("team_id"),
        worker_id: row.get("worker_id"),
        role: row.get("role"),
        status: WorkerStatus::parse(&status)
            .ok_or_else(|| CoreError::Database(format!("Invalid worker status: {status}")))?,
        current_task_id: row.get("current_task_id"),
        message: row.get("message"),
        metadata: json_column(row, "metadata"),
        updated_at: row.get("updated_at"),
        tasks_completed: row.get("tasks_completed"),
        tasks_failed: row.get("tasks_failed"),
    })
}

pub fn row_to_decision(row: &SqliteRow) -> Result<DecisionProposal> {
    let status: String = row.get("status");
    let votes_text: Option<String> = row.get("votes");
    let votes = votes_text
        .and_then(|s| serde_json::from_str::<std::collections::BTreeMap<String, String>>(&s).ok())
        .map(|raw| {
            raw.into_iter()
                .filter_map(|(worker, vote)| Vote::parse(&vote).map(|v| (worker, v)))
                .collect()
        })
        .unwrap_or_default();

    Ok(DecisionProposal {
        id: row.get("id"),
        team_id: row.get("team_id"),
        statement: row.get("statement"),
        rationale: row.get("rationale"),
        proposed_by: row.get("proposed_by"),
        proposed_at: row.get("proposed_at"),
        votes,
        status: DecisionStatus::parse(&status)
            .ok_or_else(|| CoreError::Database(format!("Invalid decision status: {status}")))?,
        finalized_at: row.get("finalized_at"),
        task_id: row.get("task_id"),
        metadata: json_column(row, "metadata"),
    })
}

pub fn row_to_workflow(row: &SqliteRow) -> Result<WorkflowRecord> {
    let status: String = row.get("status");
    let graph_text: String = row.get("graph");
    Ok(WorkflowRecord {
        id: row.get("id"),
        team_id: row.get("team_id"),
        name: row.get("name"),
        description: row.get("description"),
        graph: serde_json::from_str(&graph_text)
            .map_err(|e| CoreError::Database(format!("Corrupted workflow graph: {e}")))?,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        status: parse_workflow_status(&status)?,
        metadata: json_column(row, "metadata"),
    })
}

pub fn row_to_membership(row: &SqliteRow) -> Result<TeamMembership> {
    let state: String = row.get("state");
    let history_text: Option<String> = row.get("state_history");
    Ok(TeamMembership {
        team_id: row.get("team_id"),
        worker_id: row.get("worker_id"),
        persona_id: row.get("persona_id"),
        role_id: row.get("role_id"),
        state: parse_membership_state(&state)?,
        joined_at: row.get("joined_at"),
        activated_at: row.get("activated_at"),
        retired_at: row.get("retired_at"),
        state_history: history_text
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        performance_score: row.get("performance_score"),
        task_completion_rate: row.get("task_completion_rate"),
        average_task_duration_hours: row.get("average_task_duration_hours"),
        collaboration_score: row.get("collaboration_score"),
        added_by: row.get("added_by"),
        added_reason: row.get("added_reason"),
        retirement_reason: row.get("retirement_reason"),
        metadata: json_column(row, "metadata"),
    })
}

pub fn row_to_role(row: &SqliteRow) -> Result<RoleAssignment> {
    let history_text: Option<String> = row.get("assignment_history");
    Ok(RoleAssignment {
        team_id: row.get("team_id"),
        role_id: row.get("role_id"),
        description: row.get("description"),
        current_worker_id: row.get("current_worker_id"),
        assigned_at: row.get("assigned_at"),
        assigned_by: row.get("assigned_by"),
        assignment_history: history_text
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        is_required: row.get::<i64, _>("is_required") != 0,
        is_active: row.get::<i64, _>("is_active") != 0,
        priority: row.get("priority"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub fn row_to_handoff(row: &SqliteRow) -> Result<Handoff> {
    let status: String = row.get("status");
    Ok(Handoff {
        id: row.get("id"),
        team_id: row.get("team_id"),
        worker_id: row.get("worker_id"),
        persona_id: row.get("persona_id"),
        status: parse_handoff_status(&status)?,
        initiated_at: row.get("initiated_at"),
        completed_at: row.get("completed_at"),
        checklist: HandoffChecklist {
            artifacts_verified: row.get::<i64, _>("artifacts_verified") != 0,
            documentation_complete: row.get::<i64, _>("documentation_complete") != 0,
            lessons_captured: row.get::<i64, _>("lessons_captured") != 0,
        },
        lessons: row.get("lessons"),
        open_questions: string_list_column(row, "open_questions"),
        recommendations: string_list_column(row, "recommendations"),
        key_decisions: string_list_column(row, "key_decisions"),
        artifacts_list: string_list_column(row, "artifacts_list"),
        initiated_by: row.get("initiated_by"),
        completed_by: row.get("completed_by"),
    })
}

pub fn row_to_approval(row: &SqliteRow) -> Result<Approval> {
    Ok(Approval {
        id: row.get("id"),
        team_id: row.get("team_id"),
        workflow_id: row.get("workflow_id"),
        phase: row.get("phase"),
        role: row.get("role"),
        approver: row.get("approver"),
        approved_at: row.get("approved_at"),
        expires_at: row.get("expires_at"),
        notes: row.get("notes"),
    })
}

/// Build the dynamic task list query from a filter
pub fn build_task_filter_query(
    filter: &team_core::models::TaskFilter,
) -> sqlx::QueryBuilder<'_, sqlx::Sqlite> {
    let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
        sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");

    if let Some(ref team_id) = filter.team_id {
        builder.push(" AND team_id = ");
        builder.push_bind(team_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(ref assignee) = filter.assignee {
        builder.push(" AND assignee = ");
        builder.push_bind(assignee);
    }
    if let Some(ref workflow_id) = filter.workflow_id {
        builder.push(" AND workflow_id = ");
        builder.push_bind(workflow_id);
    }
    if let Some(ref role) = filter.required_role {
        builder.push(" AND required_role = ");
        builder.push_bind(role);
    }
    if let Some(after) = filter.created_after {
        builder.push(" AND created_at >= ");
        builder.push_bind(after);
    }
    if let Some(before) = filter.created_before {
        builder.push(" AND created_at <= ");
        builder.push_bind(before);
    }

    builder.push(" ORDER BY created_at DESC");

    if let Some(limit) = filter.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }
    if let Some(offset) = filter.offset {
        builder.push(" OFFSET ");
        builder.push_bind(offset as i64);
    }

    builder
}

/// Stamp for terminal transitions
pub fn completion_stamp(status: TaskStatus) -> Option<DateTime<Utc>> {
    if status.is_terminal() {
        Some(Utc::now())
    } else {
        None
    }
}
