//! SQLite backend for the execution history store.
//!
//! Embeddings are stored as little-endian f32 blobs. Scalar filters run
//! in SQL; similarity ranking happens in-process over the filtered rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{HistoryError, Result};
use crate::models::{ExecutionRecord, ExecutionStatus, TrackedDecision};
use crate::store::{cosine_similarity, rank_matches, ExecutionRef, HistoryStore, RecordQuery};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS execution_history (
    id TEXT PRIMARY KEY,
    persona_id TEXT NOT NULL,
    persona_version TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    input_text TEXT NOT NULL DEFAULT '',
    input_embedding BLOB,
    input_metadata TEXT,
    decisions TEXT,
    output_summary TEXT NOT NULL DEFAULT '',
    output_data TEXT,
    failure_reason TEXT,
    error_details TEXT,
    token_count INTEGER,
    cost_usd REAL,
    correlation_id TEXT,
    user_id TEXT,
    tags TEXT,
    parent_execution_id TEXT,
    duration_ms INTEGER
);
CREATE INDEX IF NOT EXISTS idx_history_persona ON execution_history (persona_id);
CREATE INDEX IF NOT EXISTS idx_history_status ON execution_history (status);
CREATE INDEX IF NOT EXISTS idx_history_created ON execution_history (created_at);
CREATE INDEX IF NOT EXISTS idx_history_correlation ON execution_history (correlation_id);
"#;

/// Encode an embedding as a little-endian f32 blob
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn parse_status(s: &str) -> Result<ExecutionStatus> {
    ExecutionStatus::parse(s)
        .ok_or_else(|| HistoryError::Storage(format!("Invalid execution status: {s}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| HistoryError::Storage(format!("Invalid uuid {s}: {e}")))
}

fn row_to_record(row: &SqliteRow) -> Result<ExecutionRecord> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let embedding: Option<Vec<u8>> = row.get("input_embedding");
    let decisions_text: Option<String> = row.get("decisions");
    let parent: Option<String> = row.get("parent_execution_id");

    let json_or_null = |column: &str| -> serde_json::Value {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null)
    };

    Ok(ExecutionRecord {
        id: parse_uuid(&id)?,
        persona_id: row.get("persona_id"),
        persona_version: row.get("persona_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        status: parse_status(&status)?,
        input_text: row.get("input_text"),
        input_embedding: embedding.as_deref().and_then(blob_to_embedding),
        input_metadata: json_or_null("input_metadata"),
        decisions: decisions_text
            .and_then(|s| serde_json::from_str::<Vec<TrackedDecision>>(&s).ok())
            .unwrap_or_default(),
        output_summary: row.get("output_summary"),
        output_data: json_or_null("output_data"),
        failure_reason: row.get("failure_reason"),
        error_details: row
            .try_get::<Option<String>, _>("error_details")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok()),
        token_count: row.get("token_count"),
        cost_usd: row.get("cost_usd"),
        correlation_id: row.get("correlation_id"),
        user_id: row.get("user_id"),
        tags: row
            .try_get::<Option<String>, _>("tags")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        parent_execution_id: parent.as_deref().map(parse_uuid).transpose()?,
        duration_ms: row.get("duration_ms"),
    })
}

/// SQLite-backed history store
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    embedding_dimension: usize,
}

impl SqliteHistoryStore {
    pub async fn new(database_url: &str, embedding_dimension: usize) -> Result<Self> {
        let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(database_url.trim_start_matches("sqlite://"))
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        // An in-memory database exists per connection; keep the pool at
        // one connection so every query sees the same schema.
        let mut pool_options = sqlx::sqlite::SqlitePoolOptions::new();
        if database_url.contains(":memory:") {
            pool_options = pool_options.max_connections(1);
        }
        let pool = pool_options.connect_with(connect_options).await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        tracing::info!(dimension = embedding_dimension, "Execution history store ready");

        Ok(Self {
            pool,
            embedding_dimension,
        })
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn store_execution(&self, mut record: ExecutionRecord) -> Result<()> {
        record.updated_at = Utc::now();

        if let Some(ref embedding) = record.input_embedding {
            if embedding.len() != self.embedding_dimension {
                tracing::warn!(
                    expected = self.embedding_dimension,
                    got = embedding.len(),
                    execution = %record.id,
                    "Embedding dimension mismatch, storing without embedding"
                );
                record.input_embedding = None;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO execution_history (
                id, persona_id, persona_version, created_at, updated_at, completed_at,
                status, input_text, input_embedding, input_metadata, decisions,
                output_summary, output_data, failure_reason, error_details,
                token_count, cost_usd, correlation_id, user_id, tags,
                parent_execution_id, duration_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at,
                status = excluded.status,
                decisions = excluded.decisions,
                output_summary = excluded.output_summary,
                output_data = excluded.output_data,
                failure_reason = excluded.failure_reason,
                error_details = excluded.error_details,
                token_count = excluded.token_count,
                cost_usd = excluded.cost_usd,
                duration_ms = excluded.duration_ms
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.persona_id)
        .bind(&record.persona_version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .bind(record.status.as_str())
        .bind(&record.input_text)
        .bind(record.input_embedding.as_deref().map(embedding_to_blob))
        .bind(serde_json::to_string(&record.input_metadata).ok())
        .bind(serde_json::to_string(&record.decisions).ok())
        .bind(&record.output_summary)
        .bind(serde_json::to_string(&record.output_data).ok())
        .bind(&record.failure_reason)
        .bind(record.error_details.as_ref().map(|v| v.to_string()))
        .bind(record.token_count)
        .bind(record.cost_usd)
        .bind(&record.correlation_id)
        .bind(&record.user_id)
        .bind(serde_json::to_string(&record.tags).ok())
        .bind(record.parent_execution_id.map(|id| id.to_string()))
        .bind(record.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT * FROM execution_history WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<ExecutionRecord>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM execution_history WHERE 1 = 1");

        if let Some(ref persona) = query.persona_id {
            builder.push(" AND persona_id = ");
            builder.push_bind(persona);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(since) = query.since {
            builder.push(" AND created_at >= ");
            builder.push_bind(since);
        }
        if let Some(until) = query.until {
            builder.push(" AND created_at <= ");
            builder.push_bind(until);
        }
        builder.push(" ORDER BY created_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
        status_filter: Option<&[ExecutionStatus]>,
    ) -> Result<Vec<(ExecutionRecord, f32)>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "SELECT * FROM execution_history WHERE input_embedding IS NOT NULL",
        );
        if let Some(statuses) = status_filter {
            builder.push(" AND status IN (");
            {
                let mut separated = builder.separated(", ");
                for status in statuses {
                    separated.push_bind(status.as_str());
                }
            }
            builder.push(")");
        }

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut matches = Vec::new();
        for row in &rows {
            let record = row_to_record(row)?;
            if let Some(ref candidate) = record.input_embedding {
                let score = cosine_similarity(embedding, candidate);
                if score >= min_score {
                    matches.push((record, score));
                }
            }
        }
        Ok(rank_matches(matches, limit))
    }

    async fn delete_execution(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM execution_history WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn count(
        &self,
        status: Option<ExecutionStatus>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT COUNT(*) FROM execution_history WHERE 1 = 1");
        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(since) = since {
            builder.push(" AND created_at >= ");
            builder.push_bind(since);
        }

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn list_refs(&self) -> Result<Vec<ExecutionRef>> {
        let rows = sqlx::query("SELECT id, persona_id, status, created_at FROM execution_history")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let status: String = row.get("status");
                Ok(ExecutionRef {
                    id: parse_uuid(&id)?,
                    persona_id: row.get("persona_id"),
                    status: parse_status(&status)?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding = vec![1.0f32, -0.5, 0.25, 0.0];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob), Some(embedding));
        // Truncated blobs decode to nothing
        assert_eq!(blob_to_embedding(&blob[..7]), None);
    }
}
