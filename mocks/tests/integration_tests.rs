//! Integration tests for the mocks crate
//!
//! Exercises the mock repository and fixture utilities end to end to
//! ensure they provide the testing capabilities the other crates rely
//! on: realistic lifecycle behavior, error injection and call tracking.

use mocks::{sample_new_task, MockTaskRepository, TaskBuilder};
use serde_json::json;
use team_core::{
    error::CoreError,
    models::{NewTask, TaskFilter, TaskStatus},
    repository::TaskRepository,
};

#[tokio::test]
async fn test_mock_repository_basic_operations() {
    let repo = MockTaskRepository::new();

    // Creation starts the lifecycle at pending
    let task = repo.create(sample_new_task("T1")).await.unwrap();
    assert_eq!(task.team_id, "T1");
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.assignee.is_none());

    repo.assert_called("create");

    // Retrieval round-trips the stored task
    let retrieved = repo.get(&task.id).await.unwrap().unwrap();
    assert_eq!(retrieved, task);
    assert!(repo.get("missing").await.unwrap().is_none());

    repo.assert_called("get");
}

#[tokio::test]
async fn test_mock_repository_full_lifecycle() {
    let repo = MockTaskRepository::new();

    let task = repo.create(sample_new_task("T1")).await.unwrap();
    repo.set_status(&task.id, TaskStatus::Ready).await.unwrap();

    let claimed = repo.try_claim(&task.id, "w1").await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.assignee.as_deref(), Some("w1"));
    assert!(claimed.claimed_at.is_some());

    let done = repo.complete(&task.id, Some(json!({"k": 1}))).await.unwrap();
    assert_eq!(done.status, TaskStatus::Success);
    assert!(done.completed_at.is_some());
    assert_eq!(done.result.unwrap()["k"], 1);

    // Terminal tasks admit no further transitions
    assert!(repo.set_status(&task.id, TaskStatus::Ready).await.is_err());
    assert!(repo.fail(&task.id, "late").await.is_err());
}

#[tokio::test]
async fn test_mock_repository_dependency_behavior() {
    let repo = MockTaskRepository::new();

    let a = repo.create(sample_new_task("T1")).await.unwrap();
    let mut b = sample_new_task("T1");
    b.depends_on = vec![a.id.clone()];
    let b = repo.create(b).await.unwrap();

    assert!(!repo.dependencies_satisfied(&b.id).await.unwrap());

    // A ready task with unmet dependencies still refuses the claim
    repo.set_status(&b.id, TaskStatus::Ready).await.unwrap();
    assert!(repo.try_claim(&b.id, "w1").await.unwrap().is_none());

    repo.set_status(&a.id, TaskStatus::Ready).await.unwrap();
    repo.try_claim(&a.id, "w1").await.unwrap().unwrap();
    repo.complete(&a.id, None).await.unwrap();

    assert!(repo.dependencies_satisfied(&b.id).await.unwrap());
    assert!(repo.try_claim(&b.id, "w1").await.unwrap().is_some());

    let dependents = repo.dependents_of(&a.id).await.unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, b.id);

    // Missing dependencies are rejected at creation
    let mut broken = sample_new_task("T1");
    broken.depends_on = vec!["nonexistent".to_string()];
    assert!(repo.create(broken).await.is_err());
}

#[tokio::test]
async fn test_mock_repository_ready_ordering_and_filters() {
    let repo = MockTaskRepository::with_tasks(vec![
        TaskBuilder::new("T1").title("low").priority(1).status(TaskStatus::Ready).build(),
        TaskBuilder::new("T1").title("high").priority(9).status(TaskStatus::Ready).build(),
        TaskBuilder::new("T1")
            .title("role-bound")
            .priority(5)
            .required_role("reviewer")
            .status(TaskStatus::Ready)
            .build(),
        TaskBuilder::new("T2").title("other-team").status(TaskStatus::Ready).build(),
    ]);

    let any = repo.ready_tasks("T1", None, 10).await.unwrap();
    assert_eq!(any.len(), 3);
    assert_eq!(any[0].title, "high");

    let for_dev = repo.ready_tasks("T1", Some("developer"), 10).await.unwrap();
    let titles: Vec<_> = for_dev.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["high", "low"]);

    let for_reviewer = repo.ready_tasks("T1", Some("reviewer"), 10).await.unwrap();
    assert_eq!(for_reviewer.len(), 3);

    let team_filter = repo
        .list(&TaskFilter {
            team_id: Some("T2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(team_filter.len(), 1);
    assert_eq!(team_filter[0].title, "other-team");
}

#[tokio::test]
async fn test_mock_repository_batch_and_cancel() {
    let repo = MockTaskRepository::new();

    let first_id = team_core::new_id();
    let mut first = sample_new_task("T1");
    first.id = Some(first_id.clone());
    first.workflow_id = Some("wf".to_string());

    // The second task references the first by its pre-assigned id
    let mut second = sample_new_task("T1");
    second.workflow_id = Some("wf".to_string());
    second.depends_on = vec![first_id.clone()];

    let created = repo.create_many(vec![first, second]).await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].id, first_id);
    assert_eq!(created[1].depends_on, vec![first_id]);

    let cancelled = repo.cancel_pending("wf").await.unwrap();
    assert_eq!(cancelled, 2);
    for task in created {
        let stored = repo.get(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
    }
}

#[tokio::test]
async fn test_error_injection_is_consumed() {
    let repo = MockTaskRepository::new();

    repo.inject_error(CoreError::Database("connection lost".to_string()));
    let err = repo.create(sample_new_task("T1")).await.unwrap_err();
    assert!(err.is_database());

    // Only the next operation fails; the one after succeeds
    let task = repo.create(sample_new_task("T1")).await.unwrap();

    repo.inject_error(CoreError::Database("timeout".to_string()));
    assert!(repo.get(&task.id).await.is_err());
    assert!(repo.get(&task.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_call_history_tracking() {
    let repo = MockTaskRepository::new();

    let task = repo
        .create(NewTask::new("T1", "tracked", "call history", "tester"))
        .await
        .unwrap();
    repo.set_status(&task.id, TaskStatus::Ready).await.unwrap();
    repo.try_claim(&task.id, "w1").await.unwrap();
    repo.fail(&task.id, "boom").await.unwrap();

    let history = repo.call_history();
    assert_eq!(history.len(), 4);
    assert!(history[0].contains("create"));
    assert!(history[0].contains("tracked"));
    assert!(history[1].contains("set_status"));
    assert!(history[2].contains("try_claim"));
    assert!(history[3].contains("fail"));

    repo.assert_called("try_claim");
}

#[tokio::test]
async fn test_builder_fixtures_behave_like_stored_tasks() {
    // A builder-made running task accepts exactly the transitions the
    // state machine allows
    let running = TaskBuilder::new("T1")
        .title("in flight")
        .status(TaskStatus::Running)
        .assignee("w1")
        .build();
    let repo = MockTaskRepository::with_tasks(vec![running.clone()]);

    assert!(repo.try_claim(&running.id, "w2").await.unwrap().is_none());
    let done = repo.complete(&running.id, None).await.unwrap();
    assert_eq!(done.status, TaskStatus::Success);
    assert_eq!(done.assignee.as_deref(), Some("w1"));
}
