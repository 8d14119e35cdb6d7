//! SQLite persistence for the team orchestrator.
//!
//! [`SqliteStore`] implements every repository trait from `team-core` on a
//! single connection pool. Construct it with a database URL, run
//! [`SqliteStore::migrate`], then hand clones to the services.
//!
//! ```rust,no_run
//! use database::SqliteStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::new(":memory:").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod membership;
mod sqlite;
mod team;

pub use sqlite::SqliteStore;
