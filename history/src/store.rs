//! Execution history storage with vector similarity retrieval.
//!
//! Two backends share one contract: an in-memory map for tests and small
//! deployments, and SQLite for durable storage. Similarity is cosine over
//! the stored input embeddings; scalar filters narrow before ranking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ExecutionRecord, ExecutionStatus};

/// Default minimum similarity score for retrieval
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Cosine similarity between two vectors.
///
/// Zero-norm vectors and dimension mismatches score 0.0 rather than
/// erroring; a record without a usable embedding simply never matches.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Scalar filters for listing records
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub persona_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Lightweight reference used by retention sweeps
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRef {
    pub id: Uuid,
    pub persona_id: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
}

/// Store contract for execution records
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert or update by id; calling twice with the same id is safe
    async fn store_execution(&self, record: ExecutionRecord) -> Result<()>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>>;

    /// Records matching the scalar filters, newest first
    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<ExecutionRecord>>;

    /// Top-k records by cosine similarity to the query embedding.
    ///
    /// Only records scoring at least `min_score` are returned, ordered by
    /// descending similarity with ties broken by recency.
    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
        status_filter: Option<&[ExecutionStatus]>,
    ) -> Result<Vec<(ExecutionRecord, f32)>>;

    /// Delete by id; false if the record did not exist
    async fn delete_execution(&self, id: Uuid) -> Result<bool>;

    async fn count(
        &self,
        status: Option<ExecutionStatus>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64>;

    /// References to all records, for retention sweeps
    async fn list_refs(&self) -> Result<Vec<ExecutionRef>>;
}

/// Sort matches by score descending, recency breaking ties
pub(crate) fn rank_matches(mut matches: Vec<(ExecutionRecord, f32)>, limit: usize) -> Vec<(ExecutionRecord, f32)> {
    matches.sort_by(|(ra, sa), (rb, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| rb.created_at.cmp(&ra.created_at))
    });
    matches.truncate(limit);
    matches
}

/// In-memory store for testing and small deployments
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<Uuid, ExecutionRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn store_execution(&self, mut record: ExecutionRecord) -> Result<()> {
        record.updated_at = Utc::now();
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<ExecutionRecord>> {
        let records = self.records.read();
        let mut matching: Vec<ExecutionRecord> = records
            .values()
            .filter(|r| {
                query
                    .persona_id
                    .as_ref()
                    .map(|p| &r.persona_id == p)
                    .unwrap_or(true)
                    && query.status.map(|s| r.status == s).unwrap_or(true)
                    && query.since.map(|s| r.created_at >= s).unwrap_or(true)
                    && query.until.map(|u| r.created_at <= u).unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
        status_filter: Option<&[ExecutionStatus]>,
    ) -> Result<Vec<(ExecutionRecord, f32)>> {
        let records = self.records.read();
        let matches: Vec<(ExecutionRecord, f32)> = records
            .values()
            .filter(|r| {
                status_filter
                    .map(|statuses| statuses.contains(&r.status))
                    .unwrap_or(true)
            })
            .filter_map(|r| {
                let candidate = r.input_embedding.as_ref()?;
                let score = cosine_similarity(embedding, candidate);
                (score >= min_score).then(|| (r.clone(), score))
            })
            .collect();
        Ok(rank_matches(matches, limit))
    }

    async fn delete_execution(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().remove(&id).is_some())
    }

    async fn count(
        &self,
        status: Option<ExecutionStatus>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .filter(|r| since.map(|s| r.created_at >= s).unwrap_or(true))
            .count() as u64)
    }

    async fn list_refs(&self) -> Result<Vec<ExecutionRef>> {
        let records = self.records.read();
        Ok(records
            .values()
            .map(|r| ExecutionRef {
                id: r.id,
                persona_id: r.persona_id.clone(),
                status: r.status,
                created_at: r.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_embedding(persona: &str, embedding: Vec<f32>) -> ExecutionRecord {
        let mut record = ExecutionRecord::for_persona(persona);
        record.status = ExecutionStatus::Success;
        record.input_embedding = Some(embedding);
        record
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        // Zero norm and dimension mismatch score zero
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_store_is_idempotent_by_id() {
        let store = MemoryHistoryStore::new();
        let mut record = ExecutionRecord::for_persona("p");
        let id = record.id;
        store.store_execution(record.clone()).await.unwrap();

        record.output_summary = "updated".to_string();
        store.store_execution(record).await.unwrap();

        assert_eq!(store.count(None, None).await.unwrap(), 1);
        let fetched = store.get_execution(id).await.unwrap().unwrap();
        assert_eq!(fetched.output_summary, "updated");
    }

    #[tokio::test]
    async fn test_find_similar_ordering_and_threshold() {
        let store = MemoryHistoryStore::new();
        let e1 = record_with_embedding("p", vec![1.0, 0.0, 0.0]);
        let e2 = record_with_embedding("p", vec![0.9, 0.1, 0.0]);
        let e3 = record_with_embedding("p", vec![0.0, 1.0, 0.0]);
        let (id1, id2) = (e1.id, e2.id);
        for r in [e1, e2, e3] {
            store.store_execution(r).await.unwrap();
        }

        let matches = store
            .find_similar(&[1.0, 0.0, 0.0], 2, 0.5, None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].0.id, id1);
        assert!((matches[0].1 - 1.0).abs() < 1e-5);
        assert_eq!(matches[1].0.id, id2);
        assert!(matches[1].1 > 0.99 && matches[1].1 < 1.0);

        // Raising min_score only shrinks the result set
        let strict = store
            .find_similar(&[1.0, 0.0, 0.0], 2, 0.999, None)
            .await
            .unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].0.id, id1);
    }

    #[tokio::test]
    async fn test_find_similar_status_filter() {
        let store = MemoryHistoryStore::new();
        let mut failed = record_with_embedding("p", vec![1.0, 0.0]);
        failed.status = ExecutionStatus::Failed;
        let ok = record_with_embedding("p", vec![1.0, 0.0]);
        let ok_id = ok.id;
        store.store_execution(failed).await.unwrap();
        store.store_execution(ok).await.unwrap();

        let matches = store
            .find_similar(&[1.0, 0.0], 10, 0.5, Some(&[ExecutionStatus::Success]))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.id, ok_id);
    }

    #[tokio::test]
    async fn test_list_records_filters() {
        let store = MemoryHistoryStore::new();
        let mut a = ExecutionRecord::for_persona("alpha");
        a.status = ExecutionStatus::Success;
        let mut b = ExecutionRecord::for_persona("beta");
        b.status = ExecutionStatus::Failed;
        store.store_execution(a).await.unwrap();
        store.store_execution(b).await.unwrap();

        let alphas = store
            .list_records(&RecordQuery {
                persona_id: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alphas.len(), 1);

        let failed = store
            .list_records(&RecordQuery {
                status: Some(ExecutionStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].persona_id, "beta");
    }
}
