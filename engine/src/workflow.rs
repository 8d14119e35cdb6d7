//! Workflow engine: instantiate graphs as tasks, monitor execution.
//!
//! The executor watches the team's task events, keeps completed/failed
//! node sets for its workflow, and settles the definition's final status.
//! Pausing stops evaluation; already-claimed tasks keep running.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use team_core::{
    dag::TaskGraph,
    error::{CoreError, Result},
    events::{channels, kinds},
    models::{NewTask, TaskFilter, TaskStatus, WorkflowRecord, WorkflowStatus},
    repository::WorkflowRepository,
};

use crate::state::StateService;

/// Poll interval for the executor's event loop
const EXECUTOR_POLL: Duration = Duration::from_millis(200);

/// Callback invoked when a node's task completes: `(node_id, event data)`
pub type CompletionCallback = Box<dyn Fn(&str, &Value) + Send + Sync>;

/// Observable snapshot of a running workflow
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorStatus {
    pub workflow_id: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub ready_node_ids: Vec<String>,
    pub progress_percent: f64,
    pub paused: bool,
    pub cancelled: bool,
    pub finished: bool,
}

struct ExecutorShared {
    workflow_id: String,
    team_id: String,
    graph: TaskGraph,
    completed: Mutex<HashSet<String>>,
    failed: Mutex<HashSet<String>>,
    paused: AtomicBool,
    cancelled: AtomicBool,
    finished: AtomicBool,
    callbacks: Mutex<HashMap<String, Vec<CompletionCallback>>>,
}

impl ExecutorShared {
    fn status(&self) -> ExecutorStatus {
        let completed = self.completed.lock().clone();
        let failed = self.failed.lock();
        let total = self.graph.nodes.len();
        let ready: Vec<String> = self
            .graph
            .ready_nodes(&completed)
            .iter()
            .map(|n| n.id.clone())
            .collect();

        ExecutorStatus {
            workflow_id: self.workflow_id.clone(),
            total_tasks: total,
            completed_tasks: completed.len(),
            failed_tasks: failed.len(),
            ready_node_ids: ready,
            progress_percent: if total == 0 {
                100.0
            } else {
                completed.len() as f64 / total as f64 * 100.0
            },
            paused: self.paused.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
            finished: self.finished.load(Ordering::SeqCst),
        }
    }
}

struct ExecutorHandle {
    shared: Arc<ExecutorShared>,
    join: tokio::task::JoinHandle<()>,
}

/// Manages workflow definitions and their executors
pub struct WorkflowEngine {
    state: Arc<StateService>,
    workflows: Arc<dyn WorkflowRepository>,
    active: Mutex<HashMap<String, ExecutorHandle>>,
}

impl WorkflowEngine {
    pub fn new(state: Arc<StateService>, workflows: Arc<dyn WorkflowRepository>) -> Self {
        Self {
            state,
            workflows,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a graph, persist its definition and create every node as
    /// a task (one transaction). Entry tasks become ready immediately.
    ///
    /// Node ids become task metadata (`node`) and dependency edges are
    /// rewritten onto the generated task ids.
    pub async fn create_workflow(
        &self,
        team_id: &str,
        graph: &TaskGraph,
        created_by: &str,
        metadata: Value,
    ) -> Result<String> {
        graph.validate()?;

        let now = Utc::now();
        let record = WorkflowRecord {
            id: graph.workflow_id.clone(),
            team_id: team_id.to_string(),
            name: graph.name.clone(),
            description: graph.description.clone(),
            graph: graph.to_value()?,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            status: WorkflowStatus::Pending,
            metadata,
        };
        self.workflows.insert(record).await?;

        // Topological order guarantees dependencies precede dependents
        let sorted = graph.topological_sort()?;
        let mut task_ids: HashMap<String, String> = HashMap::new();
        let mut new_tasks = Vec::with_capacity(sorted.len());

        for node in sorted {
            let task_id = team_core::new_id();
            task_ids.insert(node.id.clone(), task_id.clone());

            let mut task_metadata = match &node.metadata {
                Value::Object(map) => Value::Object(map.clone()),
                _ => json!({}),
            };
            task_metadata["node"] = json!(node.id);

            new_tasks.push(NewTask {
                id: Some(task_id),
                team_id: team_id.to_string(),
                title: node.title.clone(),
                description: node.description.clone(),
                created_by: created_by.to_string(),
                required_role: node.required_role.clone(),
                priority: node.priority,
                parent_task_id: None,
                workflow_id: Some(graph.workflow_id.clone()),
                depends_on: node
                    .depends_on
                    .iter()
                    .filter_map(|dep| task_ids.get(dep).cloned())
                    .collect(),
                metadata: task_metadata,
                tags: node.tags.clone(),
            });
        }

        self.state.create_tasks(new_tasks).await?;
        tracing::info!(workflow = %graph.workflow_id, team = %team_id, "Workflow created");
        Ok(graph.workflow_id.clone())
    }

    /// Start a workflow: mark it running and spawn its executor
    pub async fn start_workflow(&self, workflow_id: &str) -> Result<()> {
        let record = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
        let graph = TaskGraph::from_value(&record.graph)?;

        self.workflows
            .set_status(workflow_id, WorkflowStatus::Running)
            .await?;

        let shared = Arc::new(ExecutorShared {
            workflow_id: workflow_id.to_string(),
            team_id: record.team_id.clone(),
            graph,
            completed: Mutex::new(HashSet::new()),
            failed: Mutex::new(HashSet::new()),
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            callbacks: Mutex::new(HashMap::new()),
        });

        let join = tokio::spawn(run_executor(
            Arc::clone(&shared),
            Arc::clone(&self.state),
            Arc::clone(&self.workflows),
        ));

        self.active.lock().insert(
            workflow_id.to_string(),
            ExecutorHandle { shared, join },
        );
        tracing::info!(workflow = %workflow_id, "Workflow started");
        Ok(())
    }

    /// Pause: completion events stop driving evaluation; running tasks
    /// continue.
    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<()> {
        let found = {
            let active = self.active.lock();
            if let Some(handle) = active.get(workflow_id) {
                handle.shared.paused.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        };
        if !found {
            return Err(CoreError::workflow_not_found(workflow_id));
        }
        self.workflows
            .set_status(workflow_id, WorkflowStatus::Paused)
            .await?;
        Ok(())
    }

    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<()> {
        let found = {
            let active = self.active.lock();
            if let Some(handle) = active.get(workflow_id) {
                handle.shared.paused.store(false, Ordering::SeqCst);
                true
            } else {
                false
            }
        };
        if !found {
            return Err(CoreError::workflow_not_found(workflow_id));
        }
        self.workflows
            .set_status(workflow_id, WorkflowStatus::Running)
            .await?;
        Ok(())
    }

    /// Cancel: the executor stops handling events; pending tasks are
    /// swept to cancelled, running tasks are left to finish.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        if let Some(handle) = self.active.lock().get(workflow_id) {
            handle.shared.cancelled.store(true, Ordering::SeqCst);
        }
        self.workflows
            .set_status(workflow_id, WorkflowStatus::Cancelled)
            .await?;
        let swept = self.state.cancel_workflow_tasks(workflow_id).await?;
        tracing::info!(workflow = %workflow_id, cancelled_tasks = swept, "Workflow cancelled");
        Ok(())
    }

    /// Live executor status, or a store-derived summary for inactive
    /// workflows.
    pub async fn workflow_status(&self, workflow_id: &str) -> Result<ExecutorStatus> {
        if let Some(handle) = self.active.lock().get(workflow_id) {
            return Ok(handle.shared.status());
        }

        let record = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
        let graph = TaskGraph::from_value(&record.graph)?;
        let tasks = self
            .state
            .list_tasks(&TaskFilter {
                workflow_id: Some(workflow_id.to_string()),
                ..Default::default()
            })
            .await?;

        let node_of = |task: &team_core::models::Task| -> Option<String> {
            task.metadata
                .get("node")
                .and_then(|n| n.as_str())
                .map(|s| s.to_string())
        };
        let completed: HashSet<String> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Success)
            .filter_map(node_of)
            .collect();
        let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
        let total = graph.nodes.len();

        Ok(ExecutorStatus {
            workflow_id: workflow_id.to_string(),
            total_tasks: total,
            completed_tasks: completed.len(),
            failed_tasks: failed,
            ready_node_ids: graph
                .ready_nodes(&completed)
                .iter()
                .map(|n| n.id.clone())
                .collect(),
            progress_percent: if total == 0 {
                100.0
            } else {
                completed.len() as f64 / total as f64 * 100.0
            },
            paused: record.status == WorkflowStatus::Paused,
            cancelled: record.status == WorkflowStatus::Cancelled,
            finished: matches!(
                record.status,
                WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
            ),
        })
    }

    /// Critical path of a workflow's graph
    pub async fn critical_path(&self, workflow_id: &str) -> Result<Vec<String>> {
        if let Some(handle) = self.active.lock().get(workflow_id) {
            return handle.shared.graph.critical_path();
        }
        let record = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
        TaskGraph::from_value(&record.graph)?.critical_path()
    }

    /// Register a callback for one node's completion
    pub fn on_node_complete(
        &self,
        workflow_id: &str,
        node_id: &str,
        callback: CompletionCallback,
    ) -> bool {
        let active = self.active.lock();
        match active.get(workflow_id) {
            Some(handle) => {
                handle
                    .shared
                    .callbacks
                    .lock()
                    .entry(node_id.to_string())
                    .or_default()
                    .push(callback);
                true
            }
            None => false,
        }
    }

    /// Wait for a workflow's executor to settle (tests and shutdown)
    pub async fn wait_for_completion(&self, workflow_id: &str) -> Result<()> {
        let join = {
            let mut active = self.active.lock();
            active.remove(workflow_id).map(|handle| handle.join)
        };
        if let Some(join) = join {
            join.await
                .map_err(|e| CoreError::Internal(format!("Executor join error: {e}")))?;
        }
        Ok(())
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowRecord>> {
        self.workflows.get(workflow_id).await
    }
}

/// Event loop of one workflow executor
async fn run_executor(
    shared: Arc<ExecutorShared>,
    state: Arc<StateService>,
    workflows: Arc<dyn WorkflowRepository>,
) {
    let bus = state.bus();
    let mut subscription = bus.subscribe(&channels::task_events(&shared.team_id));

    let outcome = loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            break WorkflowStatus::Cancelled;
        }

        // Drain whatever arrived, then evaluate
        match tokio::time::timeout(EXECUTOR_POLL, subscription.recv()).await {
            Ok(Some((_, envelope))) => {
                handle_event(&shared, &envelope.kind, &envelope.data);
                while let Some((_, envelope)) = subscription.try_recv() {
                    handle_event(&shared, &envelope.kind, &envelope.data);
                }
            }
            Ok(None) => {
                tracing::warn!(workflow = %shared.workflow_id, "Event bus closed, executor stopping");
                break WorkflowStatus::Failed;
            }
            Err(_) => {}
        }

        if shared.paused.load(Ordering::SeqCst) {
            continue;
        }

        let completed_count = shared.completed.lock().len();
        if completed_count == shared.graph.nodes.len() {
            break WorkflowStatus::Completed;
        }

        if !shared.failed.lock().is_empty() {
            // Failed only once nothing is still in flight or dispatchable
            let in_flight = count_in_flight(&state, &shared.workflow_id).await;
            if in_flight == 0 {
                break WorkflowStatus::Failed;
            }
        }
    };

    if let Err(e) = workflows.set_status(&shared.workflow_id, outcome).await {
        tracing::error!(workflow = %shared.workflow_id, error = %e, "Failed to settle workflow status");
    }
    shared.finished.store(true, Ordering::SeqCst);
    tracing::info!(workflow = %shared.workflow_id, outcome = ?outcome, "Workflow executor finished");
}

fn handle_event(shared: &ExecutorShared, kind: &str, data: &Value) {
    let Some(workflow_id) = data.get("workflow_id").and_then(|w| w.as_str()) else {
        return;
    };
    if workflow_id != shared.workflow_id {
        return;
    }
    let Some(node_id) = data.get("node").and_then(|n| n.as_str()) else {
        return;
    };
    if !shared.graph.nodes.contains_key(node_id) {
        return;
    }

    match kind {
        kinds::TASK_COMPLETED => {
            shared.completed.lock().insert(node_id.to_string());
            let callbacks = shared.callbacks.lock();
            if let Some(registered) = callbacks.get(node_id) {
                for callback in registered {
                    callback(node_id, data);
                }
            }
        }
        kinds::TASK_FAILED => {
            shared.failed.lock().insert(node_id.to_string());
        }
        _ => {}
    }
}

async fn count_in_flight(state: &StateService, workflow_id: &str) -> usize {
    let mut in_flight = 0;
    for status in [TaskStatus::Running, TaskStatus::Ready] {
        match state
            .list_tasks(&TaskFilter {
                workflow_id: Some(workflow_id.to_string()),
                status: Some(status),
                ..Default::default()
            })
            .await
        {
            Ok(tasks) => in_flight += tasks.len(),
            Err(e) => {
                tracing::error!(workflow = %workflow_id, error = %e, "In-flight query failed");
                // Treat the store being unreachable as still in flight
                in_flight += 1;
            }
        }
    }
    in_flight
}
