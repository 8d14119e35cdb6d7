//! Team-scoped repositories: messages, knowledge, artifacts, worker
//! snapshots and decision proposals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use team_core::{
    error::{CoreError, Result},
    models::{
        Artifact, DecisionProposal, DecisionStatus, KnowledgeItem, Message, NewArtifact,
        NewMessage, Vote, WorkerState, WorkerStatus,
    },
    repository::{
        ArtifactRepository, DecisionRepository, KnowledgeRepository, MessageRepository,
        WorkerRepository,
    },
};

use crate::common::{
    json_text, list_text, row_to_artifact, row_to_decision, row_to_knowledge, row_to_message,
    row_to_worker, sqlx_error_to_core_error,
};
use crate::sqlite::SqliteStore;

#[async_trait]
impl MessageRepository for SqliteStore {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        if message.content.trim().is_empty() {
            return Err(CoreError::empty_field("content"));
        }

        let id = team_core::new_id();
        sqlx::query(
            r#"
            INSERT INTO messages (id, team_id, from_worker, to_worker, kind, content,
                                  metadata, timestamp, thread_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.team_id)
        .bind(&message.from_worker)
        .bind(&message.to_worker)
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(json_text(&message.metadata))
        .bind(Utc::now())
        .bind(&message.thread_id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row_to_message(&row)
    }

    async fn list(
        &self,
        team_id: &str,
        worker_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        thread_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM messages WHERE team_id = ");
        builder.push_bind(team_id);

        if let Some(worker) = worker_id {
            builder.push(" AND (to_worker = ");
            builder.push_bind(worker);
            builder.push(" OR to_worker IS NULL OR from_worker = ");
            builder.push_bind(worker);
            builder.push(")");
        }
        if let Some(since) = since {
            builder.push(" AND timestamp >= ");
            builder.push_bind(since);
        }
        if let Some(thread) = thread_id {
            builder.push(" AND thread_id = ");
            builder.push_bind(thread);
        }

        builder.push(" ORDER BY timestamp DESC LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl KnowledgeRepository for SqliteStore {
    async fn upsert(
        &self,
        team_id: &str,
        key: &str,
        value: &str,
        category: Option<&str>,
        source_worker: &str,
        metadata: Value,
        tags: Vec<String>,
    ) -> Result<KnowledgeItem> {
        if key.trim().is_empty() {
            return Err(CoreError::empty_field("key"));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO knowledge (id, team_id, key, value, category, source_worker,
                                   created_at, updated_at, version, metadata, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT (team_id, key) DO UPDATE SET
                value = excluded.value,
                category = COALESCE(excluded.category, knowledge.category),
                source_worker = excluded.source_worker,
                updated_at = excluded.updated_at,
                version = knowledge.version + 1,
                metadata = excluded.metadata,
                tags = excluded.tags
            "#,
        )
        .bind(team_core::new_id())
        .bind(team_id)
        .bind(key)
        .bind(value)
        .bind(category)
        .bind(source_worker)
        .bind(now)
        .bind(now)
        .bind(json_text(&metadata))
        .bind(list_text(&tags))
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        let row = sqlx::query("SELECT * FROM knowledge WHERE team_id = ? AND key = ?")
            .bind(team_id)
            .bind(key)
            .fetch_one(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row_to_knowledge(&row)
    }

    async fn list(
        &self,
        team_id: &str,
        key: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<KnowledgeItem>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM knowledge WHERE team_id = ");
        builder.push_bind(team_id);
        if let Some(key) = key {
            builder.push(" AND key = ");
            builder.push_bind(key);
        }
        if let Some(category) = category {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }
        builder.push(" ORDER BY updated_at DESC");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_knowledge).collect()
    }
}

#[async_trait]
impl ArtifactRepository for SqliteStore {
    async fn insert(&self, artifact: NewArtifact) -> Result<Artifact> {
        let id = team_core::new_id();
        sqlx::query(
            r#"
            INSERT INTO artifacts (id, team_id, name, artifact_type, description,
                                   storage_backend, storage_path, size_bytes, mime_type,
                                   created_by, created_at, task_id, metadata, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&artifact.team_id)
        .bind(&artifact.name)
        .bind(&artifact.artifact_type)
        .bind(&artifact.description)
        .bind(&artifact.storage_backend)
        .bind(&artifact.storage_path)
        .bind(artifact.size_bytes)
        .bind(&artifact.mime_type)
        .bind(&artifact.created_by)
        .bind(Utc::now())
        .bind(&artifact.task_id)
        .bind(json_text(&artifact.metadata))
        .bind(list_text(&artifact.tags))
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row_to_artifact(&row)
    }

    async fn list(
        &self,
        team_id: &str,
        artifact_type: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<Vec<Artifact>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM artifacts WHERE team_id = ");
        builder.push_bind(team_id);
        if let Some(kind) = artifact_type {
            builder.push(" AND artifact_type = ");
            builder.push_bind(kind);
        }
        if let Some(task) = task_id {
            builder.push(" AND task_id = ");
            builder.push_bind(task);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_artifact).collect()
    }
}

#[async_trait]
impl WorkerRepository for SqliteStore {
    async fn upsert_status(
        &self,
        team_id: &str,
        worker_id: &str,
        role: &str,
        status: WorkerStatus,
        current_task_id: Option<&str>,
        message: Option<&str>,
        metadata: Value,
    ) -> Result<WorkerState> {
        sqlx::query(
            r#"
            INSERT INTO worker_states (team_id, worker_id, role, status, current_task_id,
                                       message, metadata, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (team_id, worker_id) DO UPDATE SET
                role = excluded.role,
                status = excluded.status,
                current_task_id = excluded.current_task_id,
                message = excluded.message,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(team_id)
        .bind(worker_id)
        .bind(role)
        .bind(status.as_str())
        .bind(current_task_id)
        .bind(message)
        .bind(json_text(&metadata))
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        let state = WorkerRepository::get(self, team_id, worker_id)
            .await?
            .ok_or_else(|| CoreError::Internal("worker state vanished after upsert".to_string()))?;
        Ok(state)
    }

    async fn get(&self, team_id: &str, worker_id: &str) -> Result<Option<WorkerState>> {
        let row = sqlx::query("SELECT * FROM worker_states WHERE team_id = ? AND worker_id = ?")
            .bind(team_id)
            .bind(worker_id)
            .fetch_optional(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_worker(&r)).transpose()
    }

    async fn list(&self, team_id: &str) -> Result<Vec<WorkerState>> {
        let rows = sqlx::query("SELECT * FROM worker_states WHERE team_id = ? ORDER BY worker_id")
            .bind(team_id)
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn increment_completed(&self, team_id: &str, worker_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE worker_states SET tasks_completed = tasks_completed + 1, updated_at = ? WHERE team_id = ? AND worker_id = ?",
        )
        .bind(Utc::now())
        .bind(team_id)
        .bind(worker_id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }

    async fn increment_failed(&self, team_id: &str, worker_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE worker_states SET tasks_failed = tasks_failed + 1, updated_at = ? WHERE team_id = ? AND worker_id = ?",
        )
        .bind(Utc::now())
        .bind(team_id)
        .bind(worker_id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        Ok(())
    }
}

#[async_trait]
impl DecisionRepository for SqliteStore {
    async fn insert(&self, proposal: DecisionProposal) -> Result<DecisionProposal> {
        let votes: std::collections::BTreeMap<String, &str> = proposal
            .votes
            .iter()
            .map(|(worker, vote)| (worker.clone(), vote.as_str()))
            .collect();

        sqlx::query(
            r#"
            INSERT INTO decisions (id, team_id, statement, rationale, proposed_by,
                                   proposed_at, votes, status, finalized_at, task_id, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proposal.id)
        .bind(&proposal.team_id)
        .bind(&proposal.statement)
        .bind(&proposal.rationale)
        .bind(&proposal.proposed_by)
        .bind(proposal.proposed_at)
        .bind(serde_json::to_string(&votes).ok())
        .bind(proposal.status.as_str())
        .bind(proposal.finalized_at)
        .bind(&proposal.task_id)
        .bind(json_text(&proposal.metadata))
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        DecisionRepository::get(self, &proposal.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Decision {} not found", proposal.id)))
    }

    async fn get(&self, id: &str) -> Result<Option<DecisionProposal>> {
        let row = sqlx::query("SELECT * FROM decisions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_decision(&r)).transpose()
    }

    async fn record_vote(&self, id: &str, worker_id: &str, vote: Vote) -> Result<DecisionProposal> {
        let mut proposal = DecisionRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Decision {id} not found")))?;

        proposal.votes.insert(worker_id.to_string(), vote);
        let votes: std::collections::BTreeMap<String, &str> = proposal
            .votes
            .iter()
            .map(|(worker, vote)| (worker.clone(), vote.as_str()))
            .collect();

        sqlx::query("UPDATE decisions SET votes = ? WHERE id = ?")
            .bind(serde_json::to_string(&votes).ok())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;

        DecisionRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Decision {id} not found")))
    }

    async fn set_status(&self, id: &str, status: DecisionStatus) -> Result<DecisionProposal> {
        let finalized = if status == DecisionStatus::Pending {
            None
        } else {
            Some(Utc::now())
        };
        sqlx::query("UPDATE decisions SET status = ?, finalized_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(finalized)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;

        DecisionRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Decision {id} not found")))
    }

    async fn list(&self, team_id: &str) -> Result<Vec<DecisionProposal>> {
        let rows = sqlx::query("SELECT * FROM decisions WHERE team_id = ? ORDER BY proposed_at DESC")
            .bind(team_id)
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_decision).collect()
    }
}
