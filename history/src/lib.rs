//! Execution history and tracking.
//!
//! Everything a run leaves behind lives here: the durable record store
//! with similarity retrieval, the live tracker with decision and event
//! capture, query/analytics, retention sweeps and exports.
//!
//! # Architecture
//!
//! - [`models`] - Execution records, decisions, events
//! - [`store`] - [`HistoryStore`] contract + in-memory backend
//! - [`sqlite_store`] - durable SQLite backend
//! - [`tracker`] - live run tracking with streaming
//! - [`stream`] - bounded per-subscriber event channels
//! - [`query`] - filters and aggregated analytics
//! - [`retention`] - configurable cleanup policies
//! - [`export`] - JSON/JSONL/CSV snapshots

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod query;
pub mod retention;
pub mod sqlite_store;
pub mod store;
pub mod stream;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{HistoryError, Result};
pub use export::{ExportFormat, ExportOptions, ExportResult, ExportService};
pub use models::{
    DecisionKind, ExecutionEvent, ExecutionEventKind, ExecutionRecord, ExecutionStatus,
    TrackedDecision, TrackedExecution, TraceContext,
};
pub use query::{AnalyticsSummary, ExecutionFilter, QueryService};
pub use retention::{CleanupReport, RetentionConfig, RetentionManager, RetentionStrategy};
pub use sqlite_store::SqliteHistoryStore;
pub use store::{
    cosine_similarity, ExecutionRef, HistoryStore, MemoryHistoryStore, RecordQuery,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_MIN_SIMILARITY,
};
pub use stream::{EventSubscription, StreamPublisher};
pub use tracker::ExecutionTracker;
