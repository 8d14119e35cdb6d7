//! Fixture builders for tests.

use chrono::Utc;
use fake::faker::lorem::en::{Sentence, Word};
use fake::Fake;
use serde_json::Value;
use team_core::models::{NewTask, Task, TaskStatus};

/// Fluent builder producing realistic tasks
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(team_id: &str) -> Self {
        let title: String = Sentence(2..5).fake();
        Self {
            task: Task {
                id: team_core::new_id(),
                team_id: team_id.to_string(),
                title,
                description: Sentence(5..12).fake(),
                status: TaskStatus::Pending,
                priority: 0,
                required_role: None,
                assignee: None,
                assignee_role: None,
                created_by: Word().fake(),
                created_at: Utc::now(),
                claimed_at: None,
                completed_at: None,
                parent_task_id: None,
                workflow_id: None,
                depends_on: Vec::new(),
                result: None,
                error: None,
                metadata: Value::Null,
                tags: Vec::new(),
            },
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        if status.is_terminal() {
            self.task.completed_at = Some(Utc::now());
        }
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn required_role(mut self, role: &str) -> Self {
        self.task.required_role = Some(role.to_string());
        self
    }

    pub fn assignee(mut self, worker: &str) -> Self {
        self.task.assignee = Some(worker.to_string());
        self.task.claimed_at = Some(Utc::now());
        self
    }

    pub fn workflow(mut self, workflow_id: &str) -> Self {
        self.task.workflow_id = Some(workflow_id.to_string());
        self
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.task.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// A plausible new-task payload
pub fn sample_new_task(team_id: &str) -> NewTask {
    let mut task = NewTask::new(
        team_id,
        &Sentence(2..5).fake::<String>(),
        &Sentence(5..12).fake::<String>(),
        &Word().fake::<String>(),
    );
    task.priority = (0..10i64).fake();
    task
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_valid_tasks() {
        let task = TaskBuilder::new("T1")
            .title("explicit title")
            .status(TaskStatus::Success)
            .priority(7)
            .assignee("w1")
            .build();

        assert_eq!(task.team_id, "T1");
        assert_eq!(task.title, "explicit title");
        assert_eq!(task.priority, 7);
        assert!(task.completed_at.is_some());
        assert!(task.claimed_at.is_some());
    }

    #[test]
    fn test_sample_new_task_is_populated() {
        let task = sample_new_task("T1");
        assert!(!task.title.is_empty());
        assert!(!task.created_by.is_empty());
        assert!((0..10).contains(&task.priority));
    }
}
