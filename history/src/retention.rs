//! Configurable retention for execution history.
//!
//! Strategies: time-based, count-based (per persona key), hybrid (time
//! then count) and status-based. A dry run reports exactly what a real
//! run would delete, without deleting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ExecutionStatus;
use crate::store::{ExecutionRef, HistoryStore};

/// Retention strategy selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStrategy {
    /// Delete records older than `max_age_days`
    TimeBased,
    /// Keep the newest `max_records_per_key` per persona
    CountBased,
    /// Time-based, then count-based
    Hybrid,
    /// Different retention per execution status
    StatusBased,
}

/// Retention policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub strategy: RetentionStrategy,
    pub max_age_days: i64,
    pub max_records_per_key: usize,
    pub keep_failed_longer: bool,
    pub failed_retention_days: i64,
    pub success_retention_days: i64,
    pub cancelled_retention_days: i64,
    pub active_retention_days: i64,
    pub batch_size: usize,
    pub interval_hours: u64,
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            strategy: RetentionStrategy::Hybrid,
            max_age_days: 90,
            max_records_per_key: 1000,
            keep_failed_longer: true,
            failed_retention_days: 365,
            success_retention_days: 90,
            cancelled_retention_days: 30,
            active_retention_days: 7,
            batch_size: 100,
            interval_hours: 24,
            dry_run: false,
        }
    }
}

/// Result of one cleanup pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanupReport {
    pub records_deleted: u64,
    pub errors: Vec<String>,
    pub duration_ms: i64,
    pub dry_run: bool,
}

/// Applies retention policy to a history store, manually or on a schedule
pub struct RetentionManager {
    store: Arc<dyn HistoryStore>,
    config: RetentionConfig,
    running: Arc<AtomicBool>,
    scheduler: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn HistoryStore>, config: RetentionConfig) -> Self {
        tracing::info!(strategy = ?config.strategy, "Retention manager created");
        Self {
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            scheduler: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run one cleanup pass and report what was (or would be) deleted
    pub async fn cleanup(&self) -> CleanupReport {
        let started = Utc::now();
        let mut report = CleanupReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        match self.collect_candidates().await {
            Ok(candidates) => {
                if self.config.dry_run {
                    report.records_deleted = candidates.len() as u64;
                } else {
                    for batch in candidates.chunks(self.config.batch_size.max(1)) {
                        for id in batch {
                            match self.store.delete_execution(*id).await {
                                Ok(true) => report.records_deleted += 1,
                                Ok(false) => {}
                                Err(e) => report.errors.push(e.to_string()),
                            }
                        }
                    }
                }
            }
            Err(e) => report.errors.push(e.to_string()),
        }

        report.duration_ms = (Utc::now() - started).num_milliseconds();
        tracing::info!(
            deleted = report.records_deleted,
            dry_run = report.dry_run,
            errors = report.errors.len(),
            "Retention cleanup finished"
        );
        report
    }

    /// Start the periodic cleanup task
    pub fn start_scheduler(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Retention scheduler already running");
            return;
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let period = std::time::Duration::from_secs(manager.config.interval_hours * 3600);
            let mut ticker = tokio::time::interval(period.max(std::time::Duration::from_secs(1)));
            ticker.tick().await; // first tick fires immediately; skip it
            while manager.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !manager.running.load(Ordering::SeqCst) {
                    break;
                }
                let report = manager.cleanup().await;
                tracing::info!(deleted = report.records_deleted, "Scheduled cleanup completed");
            }
        });
        *self.scheduler.lock() = Some(handle);
        tracing::info!(interval_hours = self.config.interval_hours, "Retention scheduler started");
    }

    /// Stop the periodic cleanup task
    pub fn stop_scheduler(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
        tracing::info!("Retention scheduler stopped");
    }

    async fn collect_candidates(&self) -> Result<Vec<Uuid>> {
        let refs = self.store.list_refs().await?;
        let now = Utc::now();

        let mut candidates: Vec<Uuid> = Vec::new();
        match self.config.strategy {
            RetentionStrategy::TimeBased => {
                candidates.extend(self.time_based(&refs, now));
            }
            RetentionStrategy::CountBased => {
                candidates.extend(self.count_based(&refs));
            }
            RetentionStrategy::Hybrid => {
                candidates.extend(self.time_based(&refs, now));
                let already: std::collections::HashSet<Uuid> = candidates.iter().copied().collect();
                candidates.extend(
                    self.count_based(&refs)
                        .into_iter()
                        .filter(|id| !already.contains(id)),
                );
            }
            RetentionStrategy::StatusBased => {
                candidates.extend(self.status_based(&refs, now));
            }
        }
        Ok(candidates)
    }

    fn time_based(&self, refs: &[ExecutionRef], now: DateTime<Utc>) -> Vec<Uuid> {
        let cutoff = now - Duration::days(self.config.max_age_days);
        let failed_cutoff = now - Duration::days(self.config.failed_retention_days);

        refs.iter()
            .filter(|r| {
                if r.created_at >= cutoff {
                    return false;
                }
                if self.config.keep_failed_longer && r.status == ExecutionStatus::Failed {
                    return r.created_at < failed_cutoff;
                }
                true
            })
            .map(|r| r.id)
            .collect()
    }

    fn count_based(&self, refs: &[ExecutionRef]) -> Vec<Uuid> {
        let mut by_key: HashMap<&str, Vec<&ExecutionRef>> = HashMap::new();
        for r in refs {
            by_key.entry(r.persona_id.as_str()).or_default().push(r);
        }

        let mut surplus = Vec::new();
        for (_, mut group) in by_key {
            if group.len() <= self.config.max_records_per_key {
                continue;
            }
            group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            surplus.extend(
                group[self.config.max_records_per_key..]
                    .iter()
                    .map(|r| r.id),
            );
        }
        surplus
    }

    fn status_based(&self, refs: &[ExecutionRef], now: DateTime<Utc>) -> Vec<Uuid> {
        refs.iter()
            .filter(|r| {
                let days = match r.status {
                    ExecutionStatus::Success => self.config.success_retention_days,
                    ExecutionStatus::Failed | ExecutionStatus::Timeout => {
                        self.config.failed_retention_days
                    }
                    ExecutionStatus::Cancelled => self.config.cancelled_retention_days,
                    ExecutionStatus::Pending | ExecutionStatus::Running => {
                        self.config.active_retention_days
                    }
                    ExecutionStatus::Partial => self.config.max_age_days,
                };
                r.created_at < now - Duration::days(days)
            })
            .map(|r| r.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionRecord;
    use crate::store::MemoryHistoryStore;

    async fn seed(store: &MemoryHistoryStore, persona: &str, status: ExecutionStatus, age_days: i64) -> Uuid {
        let mut record = ExecutionRecord::for_persona(persona);
        record.status = status;
        record.created_at = Utc::now() - Duration::days(age_days);
        let id = record.id;
        store.store_execution(record).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_time_based_keeps_failed_longer() {
        let store = Arc::new(MemoryHistoryStore::new());
        let old_success = seed(&store, "p", ExecutionStatus::Success, 120).await;
        let old_failed = seed(&store, "p", ExecutionStatus::Failed, 120).await;
        let fresh = seed(&store, "p", ExecutionStatus::Success, 10).await;

        let config = RetentionConfig {
            strategy: RetentionStrategy::TimeBased,
            max_age_days: 60,
            keep_failed_longer: true,
            failed_retention_days: 365,
            ..Default::default()
        };
        let manager = RetentionManager::new(store.clone(), config);

        let report = manager.cleanup().await;
        assert_eq!(report.records_deleted, 1);
        assert!(store.get_execution(old_success).await.unwrap().is_none());
        assert!(store.get_execution(old_failed).await.unwrap().is_some());
        assert!(store.get_execution(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_count_based_keeps_newest_per_key() {
        let store = Arc::new(MemoryHistoryStore::new());
        for age in 1..=5 {
            seed(&store, "busy", ExecutionStatus::Success, age).await;
        }
        seed(&store, "quiet", ExecutionStatus::Success, 1).await;

        let config = RetentionConfig {
            strategy: RetentionStrategy::CountBased,
            max_records_per_key: 3,
            ..Default::default()
        };
        let manager = RetentionManager::new(store.clone(), config);

        let report = manager.cleanup().await;
        assert_eq!(report.records_deleted, 2);
        assert_eq!(store.count(None, None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_run() {
        let store = Arc::new(MemoryHistoryStore::new());
        for age in [10, 70, 80, 100] {
            seed(&store, "p", ExecutionStatus::Success, age).await;
        }

        let mut config = RetentionConfig {
            strategy: RetentionStrategy::TimeBased,
            max_age_days: 60,
            keep_failed_longer: false,
            dry_run: true,
            ..Default::default()
        };

        let dry = RetentionManager::new(store.clone(), config.clone()).cleanup().await;
        assert!(dry.dry_run);
        assert_eq!(dry.records_deleted, 3);
        // Nothing was actually deleted
        assert_eq!(store.count(None, None).await.unwrap(), 4);

        config.dry_run = false;
        let real = RetentionManager::new(store.clone(), config).cleanup().await;
        assert_eq!(real.records_deleted, dry.records_deleted);
        assert_eq!(store.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_based_retention() {
        let store = Arc::new(MemoryHistoryStore::new());
        let stale_running = seed(&store, "p", ExecutionStatus::Running, 10).await;
        let old_cancelled = seed(&store, "p", ExecutionStatus::Cancelled, 40).await;
        let success = seed(&store, "p", ExecutionStatus::Success, 40).await;

        let config = RetentionConfig {
            strategy: RetentionStrategy::StatusBased,
            ..Default::default()
        };
        let manager = RetentionManager::new(store.clone(), config);

        let report = manager.cleanup().await;
        assert_eq!(report.records_deleted, 2);
        assert!(store.get_execution(stale_running).await.unwrap().is_none());
        assert!(store.get_execution(old_cancelled).await.unwrap().is_none());
        assert!(store.get_execution(success).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hybrid_does_not_double_count() {
        let store = Arc::new(MemoryHistoryStore::new());
        // Old records that both time and count rules would select
        for age in [100, 110, 120] {
            seed(&store, "p", ExecutionStatus::Success, age).await;
        }

        let config = RetentionConfig {
            strategy: RetentionStrategy::Hybrid,
            max_age_days: 60,
            keep_failed_longer: false,
            max_records_per_key: 1,
            dry_run: true,
            ..Default::default()
        };
        let report = RetentionManager::new(store.clone(), config).cleanup().await;
        assert_eq!(report.records_deleted, 3);
    }
}
