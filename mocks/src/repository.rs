//! Mock implementation of the task repository.
//!
//! Thread-safe, with error injection and call tracking for verification.
//! The claim path is atomic under one mutex, which makes it useful for
//! exercising claim-uniqueness properties without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use team_core::{
    error::{CoreError, Result},
    models::{NewTask, Task, TaskFilter, TaskStatus},
    repository::TaskRepository,
};

/// In-memory task repository for tests
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    error_injection: Arc<Mutex<Option<CoreError>>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            error_injection: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pre-populate with tasks
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.tasks.lock();
            for task in tasks {
                map.insert(task.id.clone(), task);
            }
        }
        repo
    }

    /// Inject an error for the next operation
    pub fn inject_error(&self, error: CoreError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call.contains(method)),
            "Method '{}' was not called. Call history: {:?}",
            method,
            *history
        );
    }

    fn check_error_injection(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }

    fn record_call(&self, method: &str, params: &str) {
        self.call_history.lock().push(format!("{method}({params})"));
    }

    fn build_task(task: &NewTask, id: String) -> Task {
        Task {
            id,
            team_id: task.team_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: TaskStatus::Pending,
            priority: task.priority,
            required_role: task.required_role.clone(),
            assignee: None,
            assignee_role: None,
            created_by: task.created_by.clone(),
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            parent_task_id: task.parent_task_id.clone(),
            workflow_id: task.workflow_id.clone(),
            depends_on: task.depends_on.clone(),
            result: None,
            error: None,
            metadata: task.metadata.clone(),
            tags: task.tags.clone(),
        }
    }

    fn deps_satisfied(map: &HashMap<String, Task>, task: &Task) -> bool {
        task.depends_on.iter().all(|dep| {
            map.get(dep)
                .map(|d| d.status == TaskStatus::Success)
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task> {
        self.record_call("create", &format!("title={}", task.title));
        self.check_error_injection()?;

        if task.title.trim().is_empty() {
            return Err(CoreError::empty_field("title"));
        }

        let mut map = self.tasks.lock();
        for dep in &task.depends_on {
            if !map.contains_key(dep) {
                return Err(CoreError::Validation(format!(
                    "Dependency {dep} does not exist"
                )));
            }
        }
        let id = task.id.clone().unwrap_or_else(team_core::new_id);
        let built = Self::build_task(&task, id.clone());
        map.insert(id, built.clone());
        Ok(built)
    }

    async fn create_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        self.record_call("create_many", &format!("count={}", tasks.len()));
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let ids: Vec<String> = tasks
            .iter()
            .map(|t| t.id.clone().unwrap_or_else(team_core::new_id))
            .collect();
        let batch: std::collections::HashSet<&String> = ids.iter().collect();

        for task in &tasks {
            for dep in &task.depends_on {
                if !map.contains_key(dep) && !batch.contains(dep) {
                    return Err(CoreError::Validation(format!(
                        "Dependency {dep} does not exist"
                    )));
                }
            }
        }

        let mut created = Vec::with_capacity(tasks.len());
        for (task, id) in tasks.iter().zip(ids) {
            let built = Self::build_task(task, id.clone());
            map.insert(id, built.clone());
            created.push(built);
        }
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        self.record_call("get", id);
        self.check_error_injection()?;
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.record_call("list", "");
        self.check_error_injection()?;

        let map = self.tasks.lock();
        let mut matching: Vec<Task> = map
            .values()
            .filter(|t| {
                filter.team_id.as_ref().map(|x| &t.team_id == x).unwrap_or(true)
                    && filter.status.map(|s| t.status == s).unwrap_or(true)
                    && filter.assignee.as_ref().map(|a| t.assignee.as_ref() == Some(a)).unwrap_or(true)
                    && filter
                        .workflow_id
                        .as_ref()
                        .map(|w| t.workflow_id.as_ref() == Some(w))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit as usize);
        }
        Ok(matching)
    }

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.record_call("set_status", &format!("{id} -> {status}"));
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let task = map
            .get_mut(id)
            .ok_or_else(|| CoreError::task_not_found(id))?;
        if !task.can_transition_to(status) {
            return Err(CoreError::invalid_transition(task.status, status));
        }
        task.status = status;
        if status.is_terminal() {
            task.completed_at = Some(Utc::now());
        }
        Ok(task.clone())
    }

    async fn try_claim(&self, id: &str, worker_id: &str) -> Result<Option<Task>> {
        self.record_call("try_claim", &format!("{id} by {worker_id}"));
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let Some(snapshot) = map.get(id).cloned() else {
            return Err(CoreError::task_not_found(id));
        };
        if snapshot.assignee.is_some() || snapshot.status != TaskStatus::Ready {
            return Ok(None);
        }
        if !Self::deps_satisfied(&map, &snapshot) {
            return Ok(None);
        }

        let task = map.get_mut(id).expect("checked above");
        task.assignee = Some(worker_id.to_string());
        task.assignee_role = task.required_role.clone();
        task.status = TaskStatus::Running;
        task.claimed_at = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: &str, result: Option<Value>) -> Result<Task> {
        self.record_call("complete", id);
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let task = map
            .get_mut(id)
            .ok_or_else(|| CoreError::task_not_found(id))?;
        if task.status != TaskStatus::Running {
            return Err(CoreError::invalid_transition(task.status, TaskStatus::Success));
        }
        task.status = TaskStatus::Success;
        task.completed_at = Some(Utc::now());
        task.result = result;
        Ok(task.clone())
    }

    async fn fail(&self, id: &str, error: &str) -> Result<Task> {
        self.record_call("fail", id);
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let task = map
            .get_mut(id)
            .ok_or_else(|| CoreError::task_not_found(id))?;
        if task.status != TaskStatus::Running {
            return Err(CoreError::invalid_transition(task.status, TaskStatus::Failed));
        }
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error = Some(error.to_string());
        Ok(task.clone())
    }

    async fn ready_tasks(
        &self,
        team_id: &str,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Task>> {
        self.record_call("ready_tasks", team_id);
        self.check_error_injection()?;

        let map = self.tasks.lock();
        let mut ready: Vec<Task> = map
            .values()
            .filter(|t| t.team_id == team_id)
            .filter(|t| t.status == TaskStatus::Ready && t.assignee.is_none())
            .filter(|t| match (role, &t.required_role) {
                (_, None) => true,
                (Some(role), Some(required)) => role == required,
                (None, Some(_)) => true,
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        ready.truncate(limit as usize);
        Ok(ready)
    }

    async fn dependencies_satisfied(&self, id: &str) -> Result<bool> {
        self.record_call("dependencies_satisfied", id);
        self.check_error_injection()?;

        let map = self.tasks.lock();
        let task = map.get(id).ok_or_else(|| CoreError::task_not_found(id))?;
        Ok(Self::deps_satisfied(&map, task))
    }

    async fn dependents_of(&self, id: &str) -> Result<Vec<Task>> {
        self.record_call("dependents_of", id);
        self.check_error_injection()?;

        let map = self.tasks.lock();
        Ok(map
            .values()
            .filter(|t| t.depends_on.iter().any(|dep| dep == id))
            .cloned()
            .collect())
    }

    async fn cancel_pending(&self, workflow_id: &str) -> Result<u64> {
        self.record_call("cancel_pending", workflow_id);
        self.check_error_injection()?;

        let mut map = self.tasks.lock();
        let mut cancelled = 0;
        for task in map.values_mut() {
            if task.workflow_id.as_deref() == Some(workflow_id)
                && matches!(
                    task.status,
                    TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Blocked
                )
            {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_create_claim_complete() {
        let repo = MockTaskRepository::new();
        let task = repo
            .create(NewTask::new("T1", "mock task", "", "tester"))
            .await
            .unwrap();

        repo.set_status(&task.id, TaskStatus::Ready).await.unwrap();
        let claimed = repo.try_claim(&task.id, "w1").await.unwrap().unwrap();
        assert_eq!(claimed.assignee.as_deref(), Some("w1"));
        assert!(repo.try_claim(&task.id, "w2").await.unwrap().is_none());

        repo.complete(&task.id, None).await.unwrap();
        repo.assert_called("create");
        repo.assert_called("try_claim");
        repo.assert_called("complete");
    }

    #[tokio::test]
    async fn test_error_injection() {
        let repo = MockTaskRepository::new();
        repo.inject_error(CoreError::Database("injected".to_string()));
        let err = repo
            .create(NewTask::new("T1", "x", "", "tester"))
            .await
            .unwrap_err();
        assert!(err.is_database());

        // Injection is consumed
        assert!(repo.create(NewTask::new("T1", "x", "", "tester")).await.is_ok());
    }
}
