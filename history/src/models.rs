//! Data models for execution tracking and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of a tracked execution. Created `Running`, transitions once to
/// a terminal value.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Partial,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Partial => "partial",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<ExecutionStatus> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            "partial" => Some(ExecutionStatus::Partial),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            "timeout" => Some(ExecutionStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of decisions a worker can log during a run
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ToolSelection,
    StrategyChoice,
    ParameterSetting,
    Routing,
    Retry,
    Fallback,
    QualityGate,
    OutputSelection,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::ToolSelection => "tool_selection",
            DecisionKind::StrategyChoice => "strategy_choice",
            DecisionKind::ParameterSetting => "parameter_setting",
            DecisionKind::Routing => "routing",
            DecisionKind::Retry => "retry",
            DecisionKind::Fallback => "fallback",
            DecisionKind::QualityGate => "quality_gate",
            DecisionKind::OutputSelection => "output_selection",
        }
    }
}

/// A decision made during execution: what was chosen, why, and what the
/// alternatives were.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedDecision {
    pub id: Uuid,
    pub kind: DecisionKind,
    pub timestamp: DateTime<Utc>,
    pub choice: String,
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// 0.0 - 1.0
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Value,
}

impl TrackedDecision {
    pub fn new(kind: DecisionKind, choice: &str, reasoning: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            choice: choice.to_string(),
            reasoning: reasoning.to_string(),
            alternatives: Vec::new(),
            confidence: 1.0,
            metadata: Value::Null,
        }
    }
}

/// Kinds of streamed execution events
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEventKind {
    ExecutionStarted,
    ContextLoaded,
    DecisionMade,
    ToolInvoked,
    ToolCompleted,
    ProgressUpdate,
    OutputGenerated,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
}

impl ExecutionEventKind {
    /// Terminal events end subscriptions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEventKind::ExecutionCompleted
                | ExecutionEventKind::ExecutionFailed
                | ExecutionEventKind::ExecutionCancelled
        )
    }
}

/// An event emitted during execution for real-time observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionEvent {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub kind: ExecutionEventKind,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub data: Value,
}

impl ExecutionEvent {
    pub fn new(execution_id: Uuid, kind: ExecutionEventKind, message: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            kind,
            timestamp: Utc::now(),
            message: message.to_string(),
            progress_percent: None,
            data: Value::Null,
        }
    }
}

/// Complete context of a run: everything needed to understand or replay it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceContext {
    pub persona_id: String,
    pub persona_version: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub environment: Value,
    #[serde(default)]
    pub configuration: Value,
    pub parent_execution_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TraceContext {
    pub fn for_persona(persona_id: &str) -> Self {
        Self {
            persona_id: persona_id.to_string(),
            ..Default::default()
        }
    }
}

/// Live record of one persona run.
///
/// Owned by the tracker while the run is active; on completion it is
/// converted into an [`ExecutionRecord`] and persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedExecution {
    pub id: Uuid,
    pub trace_context: TraceContext,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub outcome: ExecutionStatus,
    #[serde(default)]
    pub decisions: Vec<TrackedDecision>,
    #[serde(default)]
    pub events: Vec<ExecutionEvent>,
    #[serde(default)]
    pub output_data: Value,
    #[serde(default)]
    pub output_summary: String,
    pub error_message: Option<String>,
    pub error_details: Option<Value>,
    pub token_count: Option<i64>,
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub metadata: Value,
}

impl TrackedExecution {
    pub fn new(trace_context: TraceContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            trace_context,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            outcome: ExecutionStatus::Running,
            decisions: Vec::new(),
            events: Vec::new(),
            output_data: Value::Null,
            output_summary: String::new(),
            error_message: None,
            error_details: None,
            token_count: None,
            cost_usd: None,
            metadata: Value::Null,
        }
    }

    fn stamp_completion(&mut self) {
        let completed = Utc::now();
        self.duration_ms = Some((completed - self.started_at).num_milliseconds());
        self.completed_at = Some(completed);
    }

    pub fn mark_completed(&mut self, outcome: ExecutionStatus, output_data: Value, output_summary: &str) {
        self.outcome = outcome;
        self.stamp_completion();
        if !output_data.is_null() {
            self.output_data = output_data;
        }
        if !output_summary.is_empty() {
            self.output_summary = output_summary.to_string();
        }
    }

    pub fn mark_failed(&mut self, error_message: &str, error_details: Option<Value>) {
        self.outcome = ExecutionStatus::Failed;
        self.stamp_completion();
        self.error_message = Some(error_message.to_string());
        self.error_details = error_details;
    }

    pub fn mark_cancelled(&mut self, reason: &str) {
        self.outcome = ExecutionStatus::Cancelled;
        self.stamp_completion();
        self.error_message = Some(reason.to_string());
    }

    pub fn add_decision(&mut self, decision: TrackedDecision) {
        self.decisions.push(decision);
    }

    pub fn add_event(&mut self, mut event: ExecutionEvent) {
        event.execution_id = self.id;
        self.events.push(event);
    }

    /// Convert to the durable record form
    pub fn to_record(&self, input_embedding: Option<Vec<f32>>) -> ExecutionRecord {
        ExecutionRecord {
            id: self.id,
            persona_id: self.trace_context.persona_id.clone(),
            persona_version: self.trace_context.persona_version.clone(),
            created_at: self.started_at,
            updated_at: Utc::now(),
            completed_at: self.completed_at,
            status: self.outcome,
            input_text: match &self.trace_context.input {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
            input_embedding,
            input_metadata: serde_json::json!({
                "environment": self.trace_context.environment,
                "configuration": self.trace_context.configuration,
                "session_id": self.trace_context.session_id,
            }),
            decisions: self.decisions.clone(),
            output_summary: self.output_summary.clone(),
            output_data: self.output_data.clone(),
            failure_reason: self.error_message.clone(),
            error_details: self.error_details.clone(),
            token_count: self.token_count,
            cost_usd: self.cost_usd,
            correlation_id: self.trace_context.correlation_id.clone(),
            user_id: self.trace_context.user_id.clone(),
            tags: self.trace_context.tags.clone(),
            parent_execution_id: self.trace_context.parent_execution_id,
            duration_ms: self.duration_ms,
        }
    }
}

/// Durable, append-only record of one execution, with an optional input
/// embedding for similarity retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub persona_id: String,
    pub persona_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub input_text: String,
    pub input_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub input_metadata: Value,
    #[serde(default)]
    pub decisions: Vec<TrackedDecision>,
    #[serde(default)]
    pub output_summary: String,
    #[serde(default)]
    pub output_data: Value,
    pub failure_reason: Option<String>,
    pub error_details: Option<Value>,
    pub token_count: Option<i64>,
    pub cost_usd: Option<f64>,
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub parent_execution_id: Option<Uuid>,
    pub duration_ms: Option<i64>,
}

impl ExecutionRecord {
    /// Minimal record for tests and backfills
    pub fn for_persona(persona_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona_id: persona_id.to_string(),
            persona_version: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Pending,
            input_text: String::new(),
            input_embedding: None,
            input_metadata: Value::Null,
            decisions: Vec::new(),
            output_summary: String::new(),
            output_data: Value::Null,
            failure_reason: None,
            error_details: None,
            token_count: None,
            cost_usd: None,
            correlation_id: None,
            user_id: None,
            tags: Vec::new(),
            parent_execution_id: None,
            duration_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_lifecycle() {
        let mut execution = TrackedExecution::new(TraceContext::for_persona("code-reviewer"));
        assert_eq!(execution.outcome, ExecutionStatus::Running);
        assert!(execution.completed_at.is_none());

        execution.add_decision(TrackedDecision::new(
            DecisionKind::ToolSelection,
            "static_analysis",
            "review requires static analysis",
        ));
        execution.mark_completed(ExecutionStatus::Success, json!({"score": 85}), "done");

        assert_eq!(execution.outcome, ExecutionStatus::Success);
        assert!(execution.completed_at.is_some());
        assert!(execution.duration_ms.is_some());
        assert_eq!(execution.decisions.len(), 1);
    }

    #[test]
    fn test_failed_execution_captures_error() {
        let mut execution = TrackedExecution::new(TraceContext::for_persona("p"));
        execution.mark_failed("boom", Some(json!({"kind": "io"})));
        assert_eq!(execution.outcome, ExecutionStatus::Failed);
        assert_eq!(execution.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_to_record_carries_context() {
        let mut ctx = TraceContext::for_persona("planner");
        ctx.input = json!("plan the sprint");
        ctx.correlation_id = Some("corr-1".to_string());
        ctx.tags = vec!["sprint".to_string()];

        let mut execution = TrackedExecution::new(ctx);
        execution.mark_completed(ExecutionStatus::Success, Value::Null, "");

        let record = execution.to_record(Some(vec![0.1, 0.2]));
        assert_eq!(record.persona_id, "planner");
        assert_eq!(record.input_text, "plan the sprint");
        assert_eq!(record.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(record.input_embedding.as_deref(), Some(&[0.1f32, 0.2][..]));
        assert_eq!(record.status, ExecutionStatus::Success);
    }

    #[test]
    fn test_terminal_event_kinds() {
        assert!(ExecutionEventKind::ExecutionCompleted.is_terminal());
        assert!(ExecutionEventKind::ExecutionFailed.is_terminal());
        assert!(ExecutionEventKind::ExecutionCancelled.is_terminal());
        assert!(!ExecutionEventKind::ProgressUpdate.is_terminal());
        assert!(!ExecutionEventKind::ToolInvoked.is_terminal());
    }
}
