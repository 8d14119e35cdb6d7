use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use team_core::{
    error::{CoreError, Result},
    models::{NewTask, Task, TaskFilter, TaskStatus, WorkflowRecord, WorkflowStatus},
    repository::{TaskRepository, WorkflowRepository},
};

use crate::common::{
    build_task_filter_query, completion_stamp, row_to_task, row_to_workflow,
    sqlx_error_to_core_error,
};

/// SQLite-backed store for the orchestrator.
///
/// One pool serves every repository trait; multi-row writes run in a single
/// transaction so readers never observe half-created tasks or claims.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a SQLite database URL (file path or `:memory:`).
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") || database_url.starts_with("sqlite://")
        {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false)
        {
            Sqlite::create_database(&db_url).await.map_err(|error| {
                tracing::error!("Error creating database: {}", error);
                CoreError::Database(format!("Failed to create database: {error}"))
            })?;
            tracing::info!("Database created");
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        // An in-memory database exists per connection; cap the pool at
        // one connection so migrations and queries share it.
        let mut pool_options = sqlx::sqlite::SqlitePoolOptions::new();
        if db_url.contains(":memory:") {
            pool_options = pool_options.max_connections(1);
        }
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_core_error)?;

        Ok(Self { pool })
    }

    /// Apply pending migrations; call once after construction
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Direct pool access, mainly for tests
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_depends_on(&self, task_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT depends_on_id FROM task_dependencies WHERE task_id = ? ORDER BY depends_on_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn hydrate_tasks(&self, rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = sqlx::Row::get(&row, "id");
            let deps = self.load_depends_on(&id).await?;
            tasks.push(row_to_task(&row, deps)?);
        }
        Ok(tasks)
    }
}

async fn insert_task_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &NewTask,
    id: &str,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(CoreError::empty_field("title"));
    }
    if task.team_id.trim().is_empty() {
        return Err(CoreError::empty_field("team_id"));
    }

    sqlx::query(
        r#"
        INSERT INTO tasks (id, team_id, title, description, status, priority,
                           required_role, created_by, created_at, parent_task_id,
                           workflow_id, metadata, tags)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&task.team_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(TaskStatus::Pending.as_str())
    .bind(task.priority)
    .bind(&task.required_role)
    .bind(&task.created_by)
    .bind(now)
    .bind(&task.parent_task_id)
    .bind(&task.workflow_id)
    .bind(crate::common::json_text(&task.metadata))
    .bind(crate::common::list_text(&task.tags))
    .execute(&mut **tx)
    .await
    .map_err(sqlx_error_to_core_error)?;
    Ok(())
}

async fn insert_dependency_edge(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task_id: &str,
    dep_id: &str,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
        .bind(dep_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(sqlx_error_to_core_error)?;
    if exists.is_none() {
        return Err(CoreError::Validation(format!(
            "Dependency {dep_id} does not exist"
        )));
    }
    sqlx::query(
        "INSERT INTO task_dependencies (task_id, depends_on_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(task_id)
    .bind(dep_id)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(sqlx_error_to_core_error)?;
    Ok(())
}

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let id = task.id.clone().unwrap_or_else(team_core::new_id);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_core_error)?;
        insert_task_row(&mut tx, &task, &id, now).await?;
        for dep_id in &task.depends_on {
            insert_dependency_edge(&mut tx, &id, dep_id, now).await?;
        }
        tx.commit().await.map_err(sqlx_error_to_core_error)?;

        TaskRepository::get(self, &id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("Task {id} vanished after insert")))
    }

    async fn create_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>> {
        let now = Utc::now();
        let ids: Vec<String> = tasks
            .iter()
            .map(|t| t.id.clone().unwrap_or_else(team_core::new_id))
            .collect();

        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_core_error)?;
        // Rows first so edges can reference ids within the batch
        for (task, id) in tasks.iter().zip(&ids) {
            insert_task_row(&mut tx, task, id, now).await?;
        }
        for (task, id) in tasks.iter().zip(&ids) {
            for dep_id in &task.depends_on {
                insert_dependency_edge(&mut tx, id, dep_id, now).await?;
            }
        }
        tx.commit().await.map_err(sqlx_error_to_core_error)?;

        let mut created = Vec::with_capacity(ids.len());
        for id in &ids {
            created.push(
                TaskRepository::get(self, id)
                    .await?
                    .ok_or_else(|| CoreError::Internal(format!("Task {id} vanished after insert")))?,
            );
        }
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;

        match row {
            Some(row) => {
                let deps = self.load_depends_on(id).await?;
                Ok(Some(row_to_task(&row, deps)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut builder = build_task_filter_query(filter);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        self.hydrate_tasks(rows).await
    }

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let current = TaskRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))?;

        if !current.can_transition_to(status) {
            return Err(CoreError::invalid_transition(current.status, status));
        }

        sqlx::query("UPDATE tasks SET status = ?, completed_at = COALESCE(?, completed_at) WHERE id = ?")
            .bind(status.as_str())
            .bind(completion_stamp(status))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;

        TaskRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    async fn try_claim(&self, id: &str, worker_id: &str) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_core_error)?;

        let row = sqlx::query("SELECT status, assignee, required_role FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_error_to_core_error)?;

        let Some(row) = row else {
            return Err(CoreError::task_not_found(id));
        };

        let status: String = sqlx::Row::get(&row, "status");
        let assignee: Option<String> = sqlx::Row::get(&row, "assignee");
        let required_role: Option<String> = sqlx::Row::get(&row, "required_role");

        if assignee.is_some() || status != TaskStatus::Ready.as_str() {
            return Ok(None);
        }

        // Dependency re-check inside the transaction: a stale Ready row
        // must not be claimable.
        let unmet: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM task_dependencies d
            JOIN tasks t ON t.id = d.depends_on_id
            WHERE d.task_id = ? AND t.status != 'success'
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(sqlx_error_to_core_error)?;

        if unmet > 0 {
            return Ok(None);
        }

        let updated = sqlx::query(
            r#"
            UPDATE tasks SET assignee = ?, assignee_role = ?, status = 'running', claimed_at = ?
            WHERE id = ? AND assignee IS NULL AND status = 'ready'
            "#,
        )
        .bind(worker_id)
        .bind(&required_role)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_core_error)?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await.map_err(sqlx_error_to_core_error)?;

        TaskRepository::get(self, id).await
    }

    async fn complete(&self, id: &str, result: Option<serde_json::Value>) -> Result<Task> {
        let updated = sqlx::query(
            "UPDATE tasks SET status = 'success', completed_at = ?, result = ? WHERE id = ? AND status = 'running'",
        )
        .bind(Utc::now())
        .bind(result.as_ref().map(|v| v.to_string()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        if updated.rows_affected() == 0 {
            let current = TaskRepository::get(self, id)
                .await?
                .ok_or_else(|| CoreError::task_not_found(id))?;
            return Err(CoreError::invalid_transition(
                current.status,
                TaskStatus::Success,
            ));
        }

        TaskRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    async fn fail(&self, id: &str, error: &str) -> Result<Task> {
        let updated = sqlx::query(
            "UPDATE tasks SET status = 'failed', completed_at = ?, error = ? WHERE id = ? AND status = 'running'",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        if updated.rows_affected() == 0 {
            let current = TaskRepository::get(self, id)
                .await?
                .ok_or_else(|| CoreError::task_not_found(id))?;
            return Err(CoreError::invalid_transition(
                current.status,
                TaskStatus::Failed,
            ));
        }

        TaskRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::task_not_found(id))
    }

    async fn ready_tasks(
        &self,
        team_id: &str,
        role: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Task>> {
        let rows = match role {
            Some(role) => sqlx::query(
                r#"
                SELECT * FROM tasks
                WHERE team_id = ? AND status = 'ready' AND assignee IS NULL
                  AND (required_role IS NULL OR required_role = ?)
                ORDER BY priority DESC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind(team_id)
            .bind(role)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?,
            None => sqlx::query(
                r#"
                SELECT * FROM tasks
                WHERE team_id = ? AND status = 'ready' AND assignee IS NULL
                ORDER BY priority DESC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind(team_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?,
        };

        self.hydrate_tasks(rows).await
    }

    async fn dependencies_satisfied(&self, id: &str) -> Result<bool> {
        let unmet: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM task_dependencies d
            JOIN tasks t ON t.id = d.depends_on_id
            WHERE d.task_id = ? AND t.status != 'success'
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(unmet == 0)
    }

    async fn dependents_of(&self, id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM tasks t
            JOIN task_dependencies d ON d.task_id = t.id
            WHERE d.depends_on_id = ?
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        self.hydrate_tasks(rows).await
    }

    async fn cancel_pending(&self, workflow_id: &str) -> Result<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks SET status = 'cancelled', completed_at = ?
            WHERE workflow_id = ? AND status IN ('pending', 'ready', 'blocked')
            "#,
        )
        .bind(Utc::now())
        .bind(workflow_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(updated.rows_affected())
    }
}

#[async_trait]
impl WorkflowRepository for SqliteStore {
    async fn insert(&self, workflow: WorkflowRecord) -> Result<WorkflowRecord> {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, team_id, name, description, graph, created_by,
                                   created_at, updated_at, status, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.team_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.graph.to_string())
        .bind(&workflow.created_by)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .bind(workflow.status.as_str())
        .bind(crate::common::json_text(&workflow.metadata))
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;

        WorkflowRepository::get(self, &workflow.id)
            .await?
            .ok_or_else(|| CoreError::workflow_not_found(&workflow.id))
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_workflow(&r)).transpose()
    }

    async fn set_status(&self, id: &str, status: WorkflowStatus) -> Result<WorkflowRecord> {
        let updated = sqlx::query("UPDATE workflows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_core_error)?;

        if updated.rows_affected() == 0 {
            return Err(CoreError::workflow_not_found(id));
        }

        WorkflowRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::workflow_not_found(id))
    }

    async fn list(&self, team_id: &str) -> Result<Vec<WorkflowRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM workflows WHERE team_id = ? ORDER BY created_at DESC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_workflow).collect()
    }
}
