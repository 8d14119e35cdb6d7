//! Membership, role and handoff flows through the state service.

use serde_json::json;
use std::sync::Arc;

use bus::{CacheStore, EventBus, LockRegistry};
use database::SqliteStore;
use engine::{FairnessConfig, FairnessEngine, StateRepositories, StateService};
use team_core::models::{
    HandoffChecklist, MembershipState, NewTask, TaskStatus, Vote, WorkerStatus,
};

async fn setup() -> StateService {
    let store = SqliteStore::new(":memory:").await.expect("store");
    store.migrate().await.expect("migrate");
    StateService::new(
        StateRepositories::from_store(store),
        Arc::new(EventBus::new()),
        Arc::new(CacheStore::new()),
        LockRegistry::new(),
        Arc::new(FairnessEngine::new(FairnessConfig::default())),
    )
}

#[tokio::test]
async fn test_retirement_requires_completed_handoff() {
    let state = setup().await;

    state
        .add_member("T1", "w1", "analyst", "analyst", "admin", Some("bootstrap"), None)
        .await
        .unwrap();
    state
        .update_member_state("T1", "w1", MembershipState::Active, Some("onboarded"))
        .await
        .unwrap();

    // No handoff yet: retirement is refused
    let err = state.retire_member("T1", "w1", "project done").await.unwrap_err();
    assert!(err.is_validation());

    let handoff = state
        .initiate_handoff("T1", "w1", "analyst", "admin")
        .await
        .unwrap();

    // Incomplete checklist: completion is refused too
    assert!(state.complete_handoff(&handoff.id, "admin").await.is_err());

    state
        .update_handoff(
            &handoff.id,
            Some(HandoffChecklist {
                artifacts_verified: true,
                documentation_complete: true,
                lessons_captured: true,
            }),
            Some("document the deploy steps early".to_string()),
            None,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    state.complete_handoff(&handoff.id, "admin").await.unwrap();

    let retired = state.retire_member("T1", "w1", "project done").await.unwrap();
    assert_eq!(retired.state, MembershipState::Retired);
    assert!(retired.retired_at.is_some());
    assert_eq!(retired.retirement_reason.as_deref(), Some("project done"));
    // initializing -> active -> retired
    assert_eq!(retired.state_history.len(), 2);
}

#[tokio::test]
async fn test_role_resolution_follows_assignment() {
    let state = setup().await;

    state
        .ensure_role("T1", "security_auditor", Some("audits changes"), true, 8)
        .await
        .unwrap();
    assert_eq!(state.resolve_role("T1", "security_auditor").await.unwrap(), None);

    state
        .assign_role("T1", "security_auditor", "w1", "admin", Some("initial"))
        .await
        .unwrap();
    assert_eq!(
        state.resolve_role("T1", "security_auditor").await.unwrap().as_deref(),
        Some("w1")
    );

    let reassigned = state
        .assign_role("T1", "security_auditor", "w2", "admin", Some("rotation"))
        .await
        .unwrap();
    assert_eq!(reassigned.current_worker_id.as_deref(), Some("w2"));
    assert_eq!(reassigned.assignment_history.len(), 2);
    assert_eq!(reassigned.assignment_history[1].from_worker.as_deref(), Some("w1"));

    assert_eq!(state.list_roles("T1", true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_member_performance_joins_task_history() {
    let state = setup().await;

    state
        .add_member("T1", "w1", "developer", "developer", "admin", None, None)
        .await
        .unwrap();
    state
        .update_worker_status("T1", "w1", "developer", WorkerStatus::Idle, None, None, json!({}))
        .await
        .unwrap();

    // Two completed, one failed
    for (title, fail) in [("a", false), ("b", false), ("c", true)] {
        let task = state
            .create_task(NewTask::new("T1", title, "", "planner"))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        state.claim_task(&task.id, "w1").await.unwrap().unwrap();
        if fail {
            state.fail_task(&task.id, "broke").await.unwrap();
        } else {
            state.complete_task(&task.id, None).await.unwrap();
        }
    }

    let performance = state.member_performance("T1", "w1").await.unwrap().unwrap();
    assert_eq!(performance.total_tasks, 3);
    assert_eq!(performance.completed_tasks, 2);
    assert_eq!(performance.failed_tasks, 1);
    // 2 / (2 + 1 + 0) = 66%
    assert_eq!(performance.task_completion_rate, 66);
    assert!(performance.average_task_duration_hours.is_some());

    let worker = state.get_team_status("T1").await.unwrap();
    assert_eq!(worker[0].tasks_completed, 2);
    assert_eq!(worker[0].tasks_failed, 1);

    assert!(state.member_performance("T1", "ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_decision_voting_and_snapshot() {
    let state = setup().await;

    state
        .post_message(engine::state::default_message("T1", "w1", "kickoff"))
        .await
        .unwrap();
    state
        .share_knowledge("T1", "api.base", "https://api.internal", "w1", None, json!({}), vec![])
        .await
        .unwrap();

    let proposal = state
        .propose_decision("T1", "adopt trunk-based flow", "fewer merge conflicts", "w1", None)
        .await
        .unwrap();
    state.record_vote(&proposal.id, "w1", Vote::Approve).await.unwrap();
    state.record_vote(&proposal.id, "w2", Vote::Approve).await.unwrap();
    state.record_vote(&proposal.id, "w3", Vote::Reject).await.unwrap();

    let finalized = state.finalize_decision(&proposal.id).await.unwrap();
    assert_eq!(finalized.status, team_core::models::DecisionStatus::Approved);
    assert!(finalized.finalized_at.is_some());
    assert_eq!(finalized.votes.len(), 3);

    let snapshot = state.workspace_snapshot("T1").await.unwrap();
    assert_eq!(snapshot["messages"], 1);
    assert_eq!(snapshot["knowledge_items"], 1);
    assert_eq!(snapshot["decisions"], 1);
}
