//! Construction root for the orchestrator daemon.
//!
//! [`Server::build`] wires every component once from explicit
//! configuration and passes references downward; nothing is discovered
//! lazily at call time. Tests construct the same graph over in-memory
//! backends.

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use bus::{CacheStore, EventBus, LockRegistry};
use database::SqliteStore;
use engine::{
    AdapterRegistry, FairnessEngine, GovernanceService, StateRepositories, StateService,
    WorkflowEngine,
};
use history::{
    ExecutionTracker, ExportService, HistoryStore, RetentionManager, SqliteHistoryStore,
};

pub use config::Config;

/// All long-lived components of the orchestrator
pub struct Server {
    pub config: Config,
    pub store: SqliteStore,
    pub bus: Arc<EventBus>,
    pub cache: Arc<CacheStore>,
    pub locks: LockRegistry,
    pub fairness: Arc<FairnessEngine>,
    pub state: Arc<StateService>,
    pub workflows: Arc<WorkflowEngine>,
    pub governance: Arc<GovernanceService>,
    pub adapters: Arc<AdapterRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub tracker: Arc<ExecutionTracker>,
    pub retention: Arc<RetentionManager>,
    pub export: Arc<ExportService>,
}

impl Server {
    /// Build every component from configuration. Fails loudly when a
    /// backend is unavailable; nothing silently degrades.
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let database_url = config.database_url();
        let store = SqliteStore::new(&database_url)
            .await
            .with_context(|| format!("Failed to open store at {database_url}"))?;
        store.migrate().await.context("Migrations failed")?;

        let history_store: Arc<dyn HistoryStore> = Arc::new(
            SqliteHistoryStore::new(&database_url, config.vector.dimension)
                .await
                .context("Failed to open execution history store")?,
        );

        let bus = Arc::new(EventBus::new());
        let cache = Arc::new(CacheStore::new());
        let locks = LockRegistry::new();
        let fairness = Arc::new(FairnessEngine::new(config.fairness_config()));

        let state = Arc::new(StateService::new(
            StateRepositories::from_store(store.clone()),
            Arc::clone(&bus),
            Arc::clone(&cache),
            locks.clone(),
            Arc::clone(&fairness),
        ));

        let workflows = Arc::new(WorkflowEngine::new(
            Arc::clone(&state),
            Arc::new(store.clone()),
        ));

        let governance = Arc::new(GovernanceService::new(
            Arc::new(store.clone()),
            config.governance.approval_expiry_hours,
        ));
        if let Some(ref catalog_path) = config.governance.gate_catalog {
            let catalog = std::fs::read_to_string(catalog_path)
                .with_context(|| format!("Failed to read gate catalog {catalog_path}"))?;
            governance
                .load_catalog_str(&catalog)
                .context("Failed to parse gate catalog")?;
        }

        let tracker = Arc::new(ExecutionTracker::new(
            config.tracker_config(),
            Some(Arc::clone(&history_store)),
        ));

        let retention = Arc::new(RetentionManager::new(
            Arc::clone(&history_store),
            config.retention_config()?,
        ));
        let export = Arc::new(ExportService::new(Arc::clone(&history_store)));

        Ok(Self {
            config,
            store,
            bus,
            cache,
            locks,
            fairness,
            state,
            workflows,
            governance,
            adapters: Arc::new(AdapterRegistry::new()),
            history: history_store,
            tracker,
            retention,
            export,
        })
    }

    /// Start background work (retention sweeps)
    pub fn start_background(&self) {
        self.retention.start_scheduler();
    }

    /// Stop background work
    pub fn shutdown(&self) {
        self.retention.stop_scheduler();
        telemetry::log_shutdown_info();
    }
}
