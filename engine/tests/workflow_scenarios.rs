//! End-to-end coordination scenarios on an in-memory SQLite store.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bus::{CacheStore, EventBus, LockRegistry};
use database::SqliteStore;
use engine::{
    FairnessConfig, FairnessEngine, GovernanceService, StateRepositories, StateService,
    WorkflowEngine,
};
use team_core::{
    dag::{GraphNode, TaskGraph},
    events::{channels, kinds},
    models::{Task, TaskFilter, TaskStatus, WorkflowStatus},
};

async fn setup() -> (Arc<StateService>, Arc<WorkflowEngine>, SqliteStore, Arc<EventBus>) {
    let store = SqliteStore::new(":memory:").await.expect("store");
    store.migrate().await.expect("migrate");

    let bus = Arc::new(EventBus::new());
    let state = Arc::new(StateService::new(
        StateRepositories::from_store(store.clone()),
        Arc::clone(&bus),
        Arc::new(CacheStore::new()),
        LockRegistry::new(),
        Arc::new(FairnessEngine::new(FairnessConfig::default())),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&state),
        Arc::new(store.clone()),
    ));
    (state, engine, store, bus)
}

fn node(id: &str, priority: i64) -> GraphNode {
    let mut n = GraphNode::new(id, id, &format!("{id} task"));
    n.priority = priority;
    n
}

async fn tasks_by_node(state: &StateService, workflow_id: &str) -> HashMap<String, Task> {
    let tasks = state
        .list_tasks(&TaskFilter {
            workflow_id: Some(workflow_id.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    tasks
        .into_iter()
        .filter_map(|t| {
            let node = t.metadata.get("node")?.as_str()?.to_string();
            Some((node, t))
        })
        .collect()
}

async fn refresh(state: &StateService, task: &Task) -> Task {
    state.get_task(&task.id).await.unwrap().unwrap()
}

async fn claim_and_complete(state: &StateService, task: &Task, worker: &str, result: serde_json::Value) {
    let claimed = state.claim_task(&task.id, worker).await.unwrap();
    assert!(claimed.is_some(), "claim of {} should win", task.title);
    state.complete_task(&task.id, Some(result)).await.unwrap();
}

#[tokio::test]
async fn test_linear_workflow_runs_to_completion() {
    let (state, engine, _store, bus) = setup().await;

    let mut graph = TaskGraph::new("W1", "Linear", "");
    for id in ["A", "B", "C"] {
        graph.add_node(node(id, 10)).unwrap();
    }
    graph.add_edge("A", "B").unwrap();
    graph.add_edge("B", "C").unwrap();

    let mut completions = bus.subscribe(&channels::event("T1", kinds::TASK_COMPLETED));

    engine
        .create_workflow("T1", &graph, "planner", json!({}))
        .await
        .unwrap();
    engine.start_workflow("W1").await.unwrap();

    let tasks = tasks_by_node(&state, "W1").await;
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks["A"].status, TaskStatus::Ready);
    assert_eq!(tasks["B"].status, TaskStatus::Pending);
    assert_eq!(tasks["C"].status, TaskStatus::Pending);

    claim_and_complete(&state, &tasks["A"], "w1", json!({"k": 1})).await;
    assert_eq!(refresh(&state, &tasks["A"]).await.status, TaskStatus::Success);
    assert_eq!(refresh(&state, &tasks["B"]).await.status, TaskStatus::Ready);
    assert_eq!(refresh(&state, &tasks["C"]).await.status, TaskStatus::Pending);

    claim_and_complete(&state, &tasks["B"], "w1", json!({})).await;
    assert_eq!(refresh(&state, &tasks["C"]).await.status, TaskStatus::Ready);

    claim_and_complete(&state, &tasks["C"], "w1", json!({})).await;

    tokio::time::timeout(Duration::from_secs(5), engine.wait_for_completion("W1"))
        .await
        .expect("executor should settle")
        .unwrap();

    let record = engine.get_workflow("W1").await.unwrap().unwrap();
    assert_eq!(record.status, WorkflowStatus::Completed);

    let status = engine.workflow_status("W1").await.unwrap();
    assert_eq!(status.completed_tasks, 3);
    assert!((status.progress_percent - 100.0).abs() < 1e-9);

    // The subscriber observed all three completions, in dependency order
    let mut seen = Vec::new();
    for _ in 0..3 {
        let (_, envelope) = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .expect("completion event")
            .unwrap();
        seen.push(envelope.data["node"].as_str().unwrap().to_string());
    }
    assert_eq!(seen, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_fan_out_fan_in() {
    let (state, engine, _store, _bus) = setup().await;

    let mut graph = TaskGraph::new("W2", "Diamond", "");
    for id in ["design", "fe", "be", "tests", "review"] {
        graph.add_node(node(id, 5)).unwrap();
    }
    graph.add_edge("design", "fe").unwrap();
    graph.add_edge("design", "be").unwrap();
    graph.add_edge("fe", "tests").unwrap();
    graph.add_edge("be", "tests").unwrap();
    graph.add_edge("tests", "review").unwrap();

    engine
        .create_workflow("T1", &graph, "planner", json!({}))
        .await
        .unwrap();

    let tasks = tasks_by_node(&state, "W2").await;
    claim_and_complete(&state, &tasks["design"], "w1", json!({})).await;

    // Fan-out: both branches ready at once
    assert_eq!(refresh(&state, &tasks["fe"]).await.status, TaskStatus::Ready);
    assert_eq!(refresh(&state, &tasks["be"]).await.status, TaskStatus::Ready);

    // Two workers claim the branches concurrently; both succeed
    let (fe_claim, be_claim) = tokio::join!(
        state.claim_task(&tasks["fe"].id, "w1"),
        state.claim_task(&tasks["be"].id, "w2"),
    );
    assert!(fe_claim.unwrap().is_some());
    assert!(be_claim.unwrap().is_some());

    // Fan-in: tests waits for both branches
    state.complete_task(&tasks["fe"].id, None).await.unwrap();
    let tests_task = refresh(&state, &tasks["tests"]).await;
    assert_ne!(tests_task.status, TaskStatus::Ready);
    assert!(state.claim_task(&tests_task.id, "w3").await.unwrap().is_none());

    state.complete_task(&tasks["be"].id, None).await.unwrap();
    assert_eq!(refresh(&state, &tasks["tests"]).await.status, TaskStatus::Ready);
}

#[tokio::test]
async fn test_claim_contention_single_winner() {
    let (state, _engine, _store, _bus) = setup().await;

    let task = state
        .create_task(team_core::models::NewTask::new("T1", "contended", "", "planner"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Ready);

    let (first, second) = tokio::join!(
        state.claim_task(&task.id, "w1"),
        state.claim_task(&task.id, "w2"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // Exactly one winner, and the store agrees with it
    assert!(first.is_some() != second.is_some());
    let winner = first.or(second).unwrap();
    let stored = state.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.assignee, winner.assignee);
    assert_eq!(stored.status, TaskStatus::Running);
}

#[tokio::test]
async fn test_failure_blocks_dependents_and_fails_workflow() {
    let (state, engine, _store, _bus) = setup().await;

    let mut graph = TaskGraph::new("W3", "Fragile", "");
    graph.add_node(node("build", 5)).unwrap();
    graph.add_node(node("deploy", 5)).unwrap();
    graph.add_edge("build", "deploy").unwrap();

    engine
        .create_workflow("T1", &graph, "planner", json!({}))
        .await
        .unwrap();
    engine.start_workflow("W3").await.unwrap();

    let tasks = tasks_by_node(&state, "W3").await;
    state.claim_task(&tasks["build"].id, "w1").await.unwrap().unwrap();
    state.fail_task(&tasks["build"].id, "compile error").await.unwrap();

    let build = refresh(&state, &tasks["build"]).await;
    assert_eq!(build.status, TaskStatus::Failed);
    assert_eq!(build.error.as_deref(), Some("compile error"));
    assert_eq!(refresh(&state, &tasks["deploy"]).await.status, TaskStatus::Blocked);

    tokio::time::timeout(Duration::from_secs(5), engine.wait_for_completion("W3"))
        .await
        .expect("executor should settle")
        .unwrap();
    let record = engine.get_workflow("W3").await.unwrap().unwrap();
    assert_eq!(record.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_event_ordering_per_task() {
    let (state, _engine, _store, bus) = setup().await;
    let mut events = bus.subscribe(&channels::task_events("T1"));

    let task = state
        .create_task(team_core::models::NewTask::new("T1", "observable", "", "planner"))
        .await
        .unwrap();
    state.claim_task(&task.id, "w1").await.unwrap().unwrap();
    state.complete_task(&task.id, Some(json!({"done": true}))).await.unwrap();

    let mut kinds_seen = Vec::new();
    for _ in 0..3 {
        let (_, envelope) = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event")
            .unwrap();
        assert_eq!(envelope.data["task_id"].as_str().unwrap(), task.id);
        kinds_seen.push(envelope.kind);
    }
    assert_eq!(
        kinds_seen,
        vec![
            kinds::TASK_CREATED.to_string(),
            kinds::TASK_CLAIMED.to_string(),
            kinds::TASK_COMPLETED.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_pause_and_cancel_workflow() {
    let (state, engine, _store, _bus) = setup().await;

    let mut graph = TaskGraph::new("W4", "Pausable", "");
    graph.add_node(node("a", 5)).unwrap();
    graph.add_node(node("b", 5)).unwrap();
    graph.add_edge("a", "b").unwrap();

    engine
        .create_workflow("T1", &graph, "planner", json!({}))
        .await
        .unwrap();
    engine.start_workflow("W4").await.unwrap();

    engine.pause_workflow("W4").await.unwrap();
    assert_eq!(
        engine.get_workflow("W4").await.unwrap().unwrap().status,
        WorkflowStatus::Paused
    );
    let status = engine.workflow_status("W4").await.unwrap();
    assert!(status.paused);

    engine.resume_workflow("W4").await.unwrap();
    assert_eq!(
        engine.get_workflow("W4").await.unwrap().unwrap().status,
        WorkflowStatus::Running
    );

    engine.cancel_workflow("W4").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), engine.wait_for_completion("W4"))
        .await
        .expect("executor should stop")
        .unwrap();

    assert_eq!(
        engine.get_workflow("W4").await.unwrap().unwrap().status,
        WorkflowStatus::Cancelled
    );
    // Pending tasks were swept to cancelled
    let tasks = tasks_by_node(&state, "W4").await;
    assert!(tasks
        .values()
        .all(|t| t.status == TaskStatus::Cancelled));
}

#[tokio::test]
async fn test_governance_gate_scenario() {
    let (_state, _engine, store, _bus) = setup().await;

    let governance = GovernanceService::new(Arc::new(store.clone()), 72);
    governance.load_catalog_str(
        r#"{
            "phases": {
                "design_review": {
                    "display_name": "Design Review",
                    "required_documents": [
                        {"doc_type": "architecture", "name": "architecture"}
                    ],
                    "required_approvals": [
                        {"role": "architect"}
                    ]
                }
            }
        }"#,
    )
    .unwrap();

    let empty = governance
        .check_phase_gate("W1", "design_review", &json!({}), "system")
        .await
        .unwrap();
    assert!(!empty.passed);
    assert!(empty
        .errors
        .contains(&"Missing required document: architecture".to_string()));
    assert!(empty
        .errors
        .contains(&"Missing approval from: architect".to_string()));

    governance
        .record_approval("T1", "W1", "design_review", "architect", "alice", "ship it")
        .await
        .unwrap();
    let context = json!({"documents": {"architecture": {"path": "docs/architecture.md"}}});
    let passing = governance
        .check_phase_gate("W1", "design_review", &context, "system")
        .await
        .unwrap();
    assert!(passing.passed);

    // Two gate checks in the audit trail (plus the approval entry)
    let checks = governance
        .audit_trail(Some("W1"), Some("design_review"), 100)
        .into_iter()
        .filter(|e| e.action == engine::AuditAction::Check)
        .count();
    assert_eq!(checks, 2);
}

#[tokio::test]
async fn test_cooling_off_withholds_dispatch() {
    let store = SqliteStore::new(":memory:").await.unwrap();
    store.migrate().await.unwrap();

    let fairness = Arc::new(FairnessEngine::new(FairnessConfig {
        assignment_threshold: 1,
        ..Default::default()
    }));
    let state = StateService::new(
        StateRepositories::from_store(store.clone()),
        Arc::new(EventBus::new()),
        Arc::new(CacheStore::new()),
        LockRegistry::new(),
        Arc::clone(&fairness),
    );

    let first = state
        .create_task(team_core::models::NewTask::new("T1", "one", "", "planner"))
        .await
        .unwrap();
    state
        .create_task(team_core::models::NewTask::new("T1", "two", "", "planner"))
        .await
        .unwrap();

    assert_eq!(state.get_ready_tasks("T1", Some("w1"), None, 10).await.unwrap().len(), 2);

    // One claim crosses the threshold of 1; the worker is resting now
    state.claim_task(&first.id, "w1").await.unwrap().unwrap();
    assert!(fairness.is_cooling_off("w1"));
    assert!(state
        .get_ready_tasks("T1", Some("w1"), None, 10)
        .await
        .unwrap()
        .is_empty());

    // Another worker still sees the remaining task
    assert_eq!(state.get_ready_tasks("T1", Some("w2"), None, 10).await.unwrap().len(), 1);
}
