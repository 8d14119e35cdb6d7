//! Test support: mock repositories, fixture builders and proptest
//! strategies for the orchestrator crates.

pub mod builders;
pub mod generators;
pub mod repository;

pub use builders::{sample_new_task, TaskBuilder};
pub use generators::{arb_embedding, arb_graph, arb_status, ALL_STATUSES};
pub use repository::MockTaskRepository;
