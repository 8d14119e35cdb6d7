//! Execution tracker: record every run, stream progress, persist history.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::models::{
    DecisionKind, ExecutionEvent, ExecutionEventKind, ExecutionStatus, TrackedDecision,
    TrackedExecution, TraceContext,
};
use crate::query::QueryService;
use crate::store::HistoryStore;
use crate::stream::{EventSubscription, StreamPublisher};

/// Tracks persona executions from start to terminal outcome.
///
/// Workers start an execution, log decisions and progress against it, and
/// finish it exactly once; the completed record is persisted to the
/// history store. With tracking disabled every call is an inert no-op.
pub struct ExecutionTracker {
    config: TrackerConfig,
    store: Option<Arc<dyn HistoryStore>>,
    active: Mutex<HashMap<Uuid, TrackedExecution>>,
    embeddings: Mutex<HashMap<Uuid, Vec<f32>>>,
    publisher: Arc<StreamPublisher>,
    query: Arc<QueryService>,
}

impl ExecutionTracker {
    pub fn new(config: TrackerConfig, store: Option<Arc<dyn HistoryStore>>) -> Self {
        let publisher = Arc::new(StreamPublisher::new(config.stream_buffer_size));
        tracing::info!(enabled = config.enabled, "Execution tracker initialized");
        Self {
            config,
            store,
            active: Mutex::new(HashMap::new()),
            embeddings: Mutex::new(HashMap::new()),
            publisher,
            query: Arc::new(QueryService::new()),
        }
    }

    pub fn query_service(&self) -> Arc<QueryService> {
        Arc::clone(&self.query)
    }

    /// Begin tracking a run. Returns a snapshot of the new execution;
    /// with tracking disabled, a stub with no side effects.
    pub fn start_execution(&self, mut context: TraceContext) -> TrackedExecution {
        if !self.config.enabled {
            return TrackedExecution::new(context);
        }

        if !self.config.capture_input {
            context.input = Value::Null;
        }
        if !self.config.capture_context {
            context.environment = Value::Null;
            context.configuration = Value::Null;
        }

        let persona = context.persona_id.clone();
        let execution = TrackedExecution::new(context);
        self.active.lock().insert(execution.id, execution.clone());
        self.query.cache_execution(execution.clone());

        if self.config.stream_events {
            self.publish_event(
                execution.id,
                ExecutionEventKind::ExecutionStarted,
                &format!("Execution started for persona {persona}"),
                None,
                Value::Null,
            );
        }

        tracing::info!(execution = %execution.id, persona = %persona, "Started execution");
        execution
    }

    /// Attach the input embedding used for later similarity retrieval
    pub fn attach_embedding(&self, execution_id: Uuid, embedding: Vec<f32>) {
        if self.config.enabled {
            self.embeddings.lock().insert(execution_id, embedding);
        }
    }

    /// Log a decision; returns `None` when disabled, unknown, or over the
    /// per-execution cap.
    #[allow(clippy::too_many_arguments)]
    pub fn log_decision(
        &self,
        execution_id: Uuid,
        kind: DecisionKind,
        choice: &str,
        reasoning: &str,
        alternatives: Vec<String>,
        confidence: f64,
        metadata: Value,
    ) -> Option<TrackedDecision> {
        if !self.config.enabled || !self.config.store_decisions {
            return None;
        }

        let decision = {
            let mut active = self.active.lock();
            let execution = match active.get_mut(&execution_id) {
                Some(execution) => execution,
                None => {
                    tracing::warn!(execution = %execution_id, "No active execution for decision");
                    return None;
                }
            };

            if execution.decisions.len() >= self.config.decision_limit {
                tracing::warn!(
                    execution = %execution_id,
                    limit = self.config.decision_limit,
                    "Decision limit reached, dropping decision"
                );
                return None;
            }

            let mut decision = TrackedDecision::new(kind, choice, reasoning);
            decision.alternatives = alternatives;
            decision.confidence = confidence.clamp(0.0, 1.0);
            decision.metadata = metadata;
            execution.add_decision(decision.clone());
            decision
        };

        if self.config.stream_events {
            self.publish_event(
                execution_id,
                ExecutionEventKind::DecisionMade,
                &format!("Decision: {} -> {}", kind.as_str(), choice),
                None,
                json!({"decision": decision}),
            );
        }

        Some(decision)
    }

    /// Publish a progress update without touching stored decisions
    pub fn update_progress(&self, execution_id: Uuid, percent: f64, message: &str, data: Value) {
        if !self.config.enabled || !self.config.stream_events {
            return;
        }
        self.publish_event(
            execution_id,
            ExecutionEventKind::ProgressUpdate,
            message,
            Some(percent),
            data,
        );
    }

    pub fn log_tool_invocation(&self, execution_id: Uuid, tool_name: &str, tool_input: Value) {
        if !self.config.enabled {
            return;
        }
        self.publish_event(
            execution_id,
            ExecutionEventKind::ToolInvoked,
            &format!("Invoking tool: {tool_name}"),
            None,
            json!({"tool_name": tool_name, "input": tool_input}),
        );
    }

    pub fn log_tool_completion(
        &self,
        execution_id: Uuid,
        tool_name: &str,
        tool_output: Value,
        success: bool,
    ) {
        if !self.config.enabled {
            return;
        }
        let verdict = if success { "success" } else { "failed" };
        self.publish_event(
            execution_id,
            ExecutionEventKind::ToolCompleted,
            &format!("Tool completed: {tool_name} ({verdict})"),
            None,
            json!({"tool_name": tool_name, "output": tool_output, "success": success}),
        );
    }

    /// Complete a run. A second call for the same execution is a no-op
    /// returning `Ok(None)`.
    pub async fn complete_execution(
        &self,
        execution_id: Uuid,
        outcome: ExecutionStatus,
        output_data: Value,
        output_summary: &str,
        token_count: Option<i64>,
        cost_usd: Option<f64>,
    ) -> Result<Option<TrackedExecution>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let execution = {
            let mut active = self.active.lock();
            let Some(mut execution) = active.remove(&execution_id) else {
                return Ok(None);
            };
            let output = if self.config.capture_output {
                output_data
            } else {
                Value::Null
            };
            execution.mark_completed(outcome, output, output_summary);
            execution.token_count = token_count;
            execution.cost_usd = cost_usd;
            execution
        };

        self.persist(&execution).await;

        if self.config.stream_events {
            self.publish_event(
                execution_id,
                ExecutionEventKind::ExecutionCompleted,
                &format!("Execution completed: {}", outcome.as_str()),
                None,
                json!({"outcome": outcome.as_str(), "duration_ms": execution.duration_ms}),
            );
        }

        self.query.cache_execution(execution.clone());
        tracing::info!(
            execution = %execution_id,
            outcome = %outcome,
            duration_ms = execution.duration_ms,
            "Completed execution"
        );
        Ok(Some(execution))
    }

    /// Mark a run failed. Idempotent like completion.
    pub async fn fail_execution(
        &self,
        execution_id: Uuid,
        error_message: &str,
        error_details: Option<Value>,
    ) -> Result<Option<TrackedExecution>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let execution = {
            let mut active = self.active.lock();
            let Some(mut execution) = active.remove(&execution_id) else {
                return Ok(None);
            };
            execution.mark_failed(error_message, error_details.clone());
            execution
        };

        self.persist(&execution).await;

        if self.config.stream_events {
            self.publish_event(
                execution_id,
                ExecutionEventKind::ExecutionFailed,
                &format!("Execution failed: {error_message}"),
                None,
                json!({"error": error_message, "details": error_details}),
            );
        }

        self.query.cache_execution(execution.clone());
        tracing::error!(execution = %execution_id, error = %error_message, "Execution failed");
        Ok(Some(execution))
    }

    pub async fn cancel_execution(
        &self,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<Option<TrackedExecution>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let execution = {
            let mut active = self.active.lock();
            let Some(mut execution) = active.remove(&execution_id) else {
                return Ok(None);
            };
            execution.mark_cancelled(reason);
            execution
        };

        self.persist(&execution).await;

        if self.config.stream_events {
            self.publish_event(
                execution_id,
                ExecutionEventKind::ExecutionCancelled,
                reason,
                None,
                Value::Null,
            );
        }

        self.query.cache_execution(execution.clone());
        Ok(Some(execution))
    }

    /// Run a closure under tracking: completes on `Ok`, fails on `Err`
    /// (then returns the error unchanged).
    pub async fn track<F, Fut, T, E>(
        &self,
        context: TraceContext,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(TrackedExecution) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let execution = self.start_execution(context);
        let execution_id = execution.id;

        match f(execution).await {
            Ok(value) => {
                if let Err(e) = self
                    .complete_execution(
                        execution_id,
                        ExecutionStatus::Success,
                        Value::Null,
                        "",
                        None,
                        None,
                    )
                    .await
                {
                    tracing::error!(execution = %execution_id, error = %e, "Completion failed");
                }
                Ok(value)
            }
            Err(error) => {
                if let Err(e) = self
                    .fail_execution(execution_id, &error.to_string(), None)
                    .await
                {
                    tracing::error!(execution = %execution_id, error = %e, "Failure record failed");
                }
                Err(error)
            }
        }
    }

    /// Subscribe to one execution's event stream
    pub fn stream_events(
        &self,
        execution_id: Uuid,
        kinds: Option<Vec<ExecutionEventKind>>,
    ) -> EventSubscription {
        self.publisher.subscribe(execution_id, kinds)
    }

    pub fn get_execution(&self, execution_id: Uuid) -> Option<TrackedExecution> {
        self.active.lock().get(&execution_id).cloned()
    }

    pub fn list_active(&self) -> Vec<TrackedExecution> {
        self.active.lock().values().cloned().collect()
    }

    fn publish_event(
        &self,
        execution_id: Uuid,
        kind: ExecutionEventKind,
        message: &str,
        progress_percent: Option<f64>,
        data: Value,
    ) {
        let mut event = ExecutionEvent::new(execution_id, kind, message);
        event.progress_percent = progress_percent;
        event.data = data;

        if let Some(execution) = self.active.lock().get_mut(&execution_id) {
            execution.add_event(event.clone());
        }
        self.publisher.publish(&event);
    }

    async fn persist(&self, execution: &TrackedExecution) {
        let Some(ref store) = self.store else {
            tracing::debug!("No history store configured, skipping persistence");
            return;
        };

        let embedding = self.embeddings.lock().remove(&execution.id);
        let record = execution.to_record(embedding);
        if let Err(e) = store.store_execution(record).await {
            tracing::error!(execution = %execution.id, error = %e, "Failed to persist execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryHistoryStore, RecordQuery};

    fn tracker_with_store() -> (ExecutionTracker, Arc<MemoryHistoryStore>) {
        let store = Arc::new(MemoryHistoryStore::new());
        let tracker = ExecutionTracker::new(TrackerConfig::default(), Some(store.clone()));
        (tracker, store)
    }

    #[tokio::test]
    async fn test_complete_persists_to_store() {
        let (tracker, store) = tracker_with_store();
        let execution = tracker.start_execution(TraceContext::for_persona("reviewer"));

        tracker.log_decision(
            execution.id,
            DecisionKind::ToolSelection,
            "linter",
            "fast feedback",
            vec!["full-build".to_string()],
            0.9,
            Value::Null,
        );

        let completed = tracker
            .complete_execution(
                execution.id,
                ExecutionStatus::Success,
                json!({"score": 80}),
                "reviewed",
                Some(1200),
                Some(0.02),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.outcome, ExecutionStatus::Success);
        assert_eq!(completed.decisions.len(), 1);

        let stored = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert_eq!(stored.decisions.len(), 1);
        assert_eq!(stored.token_count, Some(1200));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let (tracker, _store) = tracker_with_store();
        let execution = tracker.start_execution(TraceContext::for_persona("p"));

        let first = tracker
            .complete_execution(execution.id, ExecutionStatus::Success, Value::Null, "", None, None)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = tracker
            .complete_execution(execution.id, ExecutionStatus::Success, Value::Null, "", None, None)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_decision_limit_enforced() {
        let store = Arc::new(MemoryHistoryStore::new());
        let config = TrackerConfig {
            decision_limit: 2,
            ..Default::default()
        };
        let tracker = ExecutionTracker::new(config, Some(store));
        let execution = tracker.start_execution(TraceContext::for_persona("p"));

        for i in 0..4 {
            tracker.log_decision(
                execution.id,
                DecisionKind::Retry,
                &format!("attempt-{i}"),
                "",
                vec![],
                1.0,
                Value::Null,
            );
        }

        let active = tracker.get_execution(execution.id).unwrap();
        assert_eq!(active.decisions.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_tracker_is_inert() {
        let tracker = ExecutionTracker::new(TrackerConfig::disabled(), None);
        let execution = tracker.start_execution(TraceContext::for_persona("p"));

        assert!(tracker.get_execution(execution.id).is_none());
        assert!(tracker
            .log_decision(
                execution.id,
                DecisionKind::Routing,
                "x",
                "",
                vec![],
                1.0,
                Value::Null
            )
            .is_none());
        assert!(tracker
            .complete_execution(execution.id, ExecutionStatus::Success, Value::Null, "", None, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_track_scope_completes_and_fails() {
        let (tracker, store) = tracker_with_store();

        let ok: std::result::Result<i32, String> = tracker
            .track(TraceContext::for_persona("p"), |_execution| async { Ok(42) })
            .await;
        assert_eq!(ok.unwrap(), 42);

        let err: std::result::Result<i32, String> = tracker
            .track(TraceContext::for_persona("p"), |_execution| async {
                Err("worker blew up".to_string())
            })
            .await;
        assert_eq!(err.unwrap_err(), "worker blew up");

        let all = store.list_records(&RecordQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        let failed: Vec<_> = all
            .iter()
            .filter(|r| r.status == ExecutionStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failure_reason.as_deref(), Some("worker blew up"));
    }

    #[tokio::test]
    async fn test_stream_receives_lifecycle_events() {
        let (tracker, _store) = tracker_with_store();
        let execution = tracker.start_execution(TraceContext::for_persona("p"));
        let mut sub = tracker.stream_events(execution.id, None);

        tracker.update_progress(execution.id, 50.0, "halfway", Value::Null);
        tracker
            .complete_execution(execution.id, ExecutionStatus::Success, Value::Null, "", None, None)
            .await
            .unwrap();

        let progress = sub.next().await.unwrap();
        assert_eq!(progress.kind, ExecutionEventKind::ProgressUpdate);
        assert_eq!(progress.progress_percent, Some(50.0));
        let done = sub.next().await.unwrap();
        assert_eq!(done.kind, ExecutionEventKind::ExecutionCompleted);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_embedding_attached_to_record() {
        let (tracker, store) = tracker_with_store();
        let execution = tracker.start_execution(TraceContext::for_persona("p"));
        tracker.attach_embedding(execution.id, vec![1.0, 0.0, 0.0]);

        tracker
            .complete_execution(execution.id, ExecutionStatus::Success, Value::Null, "", None, None)
            .await
            .unwrap();

        let stored = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(stored.input_embedding, Some(vec![1.0, 0.0, 0.0]));
    }
}
