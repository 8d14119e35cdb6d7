use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tracking: TrackingConfig,
    pub retention: RetentionSection,
    pub fairness: FairnessSection,
    pub governance: GovernanceConfig,
    pub vector: VectorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Optional database URL; defaults to a file under the data dir
    pub url: Option<String>,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub stream_buffer_size: usize,
    pub decision_limit: usize,
    pub capture_input: bool,
    pub capture_output: bool,
    pub capture_context: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetentionSection {
    pub strategy: String,
    pub max_age_days: i64,
    pub max_records_per_key: usize,
    pub failed_retention_days: i64,
    pub dry_run: bool,
    pub batch_size: usize,
    pub interval_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FairnessSection {
    pub window_hours: f64,
    pub assignment_threshold: usize,
    pub cooling_off_minutes: f64,
    pub min_cooling_off_minutes: f64,
    pub max_cooling_off_minutes: f64,
    pub scaling_factor: f64,
    pub adaptation_rate: f64,
    pub sensitivity: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GovernanceConfig {
    pub approval_expiry_hours: i64,
    /// Optional path to the JSON gate catalog
    pub gate_catalog: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorConfig {
    pub dimension: usize,
    pub min_similarity: f32,
    pub index_lists: u32,
}

impl Config {
    /// Load configuration: embedded defaults, optional CONFIG_FILE, then
    /// ORCH_-prefixed environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(database_url) = env::var("DATABASE_URL") {
            result.database.url = Some(database_url);
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            result.logging.level = log_level;
        }

        Ok(result)
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("ORCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder
            .build()
            .context("Failed to build configuration from file")?
            .try_deserialize()
            .context("Failed to deserialize configuration from file")
    }

    /// Database URL with a home-directory fallback
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => Self::default_database_url(),
        }
    }

    pub fn default_database_url() -> String {
        if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
            return format!("sqlite://{xdg_data}/orchestrator/orchestrator.sqlite");
        }
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/orchestrator.sqlite")
    }

    /// Retention settings as the history crate's config type
    pub fn retention_config(&self) -> Result<history::RetentionConfig> {
        let strategy = match self.retention.strategy.as_str() {
            "time" | "time_based" => history::RetentionStrategy::TimeBased,
            "count" | "count_based" => history::RetentionStrategy::CountBased,
            "hybrid" => history::RetentionStrategy::Hybrid,
            "status" | "status_based" => history::RetentionStrategy::StatusBased,
            other => anyhow::bail!("Unknown retention strategy: {other}"),
        };
        Ok(history::RetentionConfig {
            strategy,
            max_age_days: self.retention.max_age_days,
            max_records_per_key: self.retention.max_records_per_key,
            failed_retention_days: self.retention.failed_retention_days,
            dry_run: self.retention.dry_run,
            batch_size: self.retention.batch_size,
            interval_hours: self.retention.interval_hours,
            ..Default::default()
        })
    }

    pub fn tracker_config(&self) -> history::TrackerConfig {
        history::TrackerConfig {
            enabled: self.tracking.enabled,
            stream_buffer_size: self.tracking.stream_buffer_size,
            decision_limit: self.tracking.decision_limit,
            capture_input: self.tracking.capture_input,
            capture_output: self.tracking.capture_output,
            capture_context: self.tracking.capture_context,
            ..Default::default()
        }
    }

    pub fn fairness_config(&self) -> engine::FairnessConfig {
        engine::FairnessConfig {
            window_hours: self.fairness.window_hours,
            assignment_threshold: self.fairness.assignment_threshold,
            cooling_off_minutes: self.fairness.cooling_off_minutes,
            min_cooling_off_minutes: self.fairness.min_cooling_off_minutes,
            max_cooling_off_minutes: self.fairness.max_cooling_off_minutes,
            scaling_factor: self.fairness.scaling_factor,
            adaptation_rate: self.fairness.adaptation_rate,
            sensitivity: self.fairness.sensitivity,
            ..Default::default()
        }
    }

    /// Validate the configuration before wiring anything
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        let database_url = self.database_url();
        if !database_url.starts_with("sqlite://") && !database_url.starts_with(":memory:") {
            anyhow::bail!(
                "Only SQLite databases are supported. URL must start with 'sqlite://'. Got: {database_url}"
            );
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }
        if self.vector.dimension == 0 {
            anyhow::bail!("Vector dimension must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.vector.min_similarity) {
            anyhow::bail!("vector.min_similarity must be in [0, 1]");
        }
        self.retention_config()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded defaults are the canonical default configuration
        ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_else(|e| panic!("embedded default config is invalid: {e}"))
    }
}
