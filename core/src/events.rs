//! Event payloads and channel naming.
//!
//! Channels follow a fixed scheme `team:{T}:events:{kind}` so subscribers
//! can use glob patterns such as `team:T1:events:task.*`. Payloads are a
//! stable JSON shape for external consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format for every published event: `{kind, data, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Event kind names
pub mod kinds {
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_CLAIMED: &str = "task.claimed";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const AGENT_STATUS: &str = "agent.status";
    pub const KNOWLEDGE_SHARED: &str = "knowledge.shared";
    pub const DECISION_PROPOSED: &str = "decision.proposed";
    pub const MESSAGE_POSTED: &str = "message.posted";
    pub const MEMBER_ADDED: &str = "member.added";
    pub const MEMBER_STATE_CHANGED: &str = "member.state_changed";
}

/// Channel naming helpers
pub mod channels {
    /// `team:{T}:events:{kind}`
    pub fn event(team_id: &str, kind: &str) -> String {
        format!("team:{team_id}:events:{kind}")
    }

    /// Pattern matching every event of a team
    pub fn all_events(team_id: &str) -> String {
        format!("team:{team_id}:events:*")
    }

    /// Pattern matching every task event of a team
    pub fn task_events(team_id: &str) -> String {
        format!("team:{team_id}:events:task.*")
    }
}

/// Cache key naming helpers
pub mod cache_keys {
    pub fn worker_state(team_id: &str, worker_id: &str) -> String {
        format!("team:{team_id}:agent:{worker_id}:state")
    }

    pub fn recent_messages(team_id: &str) -> String {
        format!("team:{team_id}:messages:recent")
    }

    pub fn workflow_status(team_id: &str, workflow_id: &str) -> String {
        format!("team:{team_id}:workflow:{workflow_id}:status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_naming() {
        assert_eq!(
            channels::event("T1", kinds::TASK_CREATED),
            "team:T1:events:task.created"
        );
        assert_eq!(channels::all_events("T1"), "team:T1:events:*");
        assert_eq!(channels::task_events("T1"), "team:T1:events:task.*");
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = EventEnvelope::new(kinds::TASK_CLAIMED, json!({"task_id": "t1"}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["kind"], "task.claimed");
        assert_eq!(value["data"]["task_id"], "t1");
        assert!(value["timestamp"].is_string());
    }
}
