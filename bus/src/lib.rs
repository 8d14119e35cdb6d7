//! Volatile coordination layer: cache, pub/sub and named locks.
//!
//! Everything here is advisory. The durable store is authoritative; cache
//! misses fall through, lost events are recovered by polling, and lock
//! correctness is always backed by a transactional re-check.

pub mod cache;
pub mod locks;
pub mod pubsub;

pub use cache::CacheStore;
pub use locks::{LockGuard, LockRegistry};
pub use pubsub::{EventBus, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
