//! Named locks with TTL for distributed-style coordination.
//!
//! A lock held past its TTL is considered abandoned and can be taken by
//! the next acquirer. Correctness of callers must not depend on the lock
//! alone; it narrows races, the store's transactional re-check closes them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct LockEntry {
    token: u64,
    expires_at: Instant,
}

#[derive(Default)]
struct Registry {
    held: Mutex<HashMap<String, LockEntry>>,
}

/// Registry of named TTL locks
#[derive(Clone, Default)]
pub struct LockRegistry {
    inner: Arc<Registry>,
    next_token: Arc<AtomicU64>,
}

/// Guard releasing the lock on drop (if still the holder)
pub struct LockGuard {
    registry: Arc<Registry>,
    name: String,
    token: u64,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = self.registry.held.lock();
        if let Some(entry) = held.get(&self.name) {
            if entry.token == self.token {
                held.remove(&self.name);
            }
        }
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire the named lock without waiting.
    ///
    /// Returns `None` if another live holder owns it. An expired holder is
    /// evicted and the lock handed over.
    pub fn try_acquire(&self, name: &str, ttl: Duration) -> Option<LockGuard> {
        let mut held = self.inner.held.lock();
        let now = Instant::now();

        if let Some(entry) = held.get(name) {
            if entry.expires_at > now {
                return None;
            }
            tracing::warn!(lock = %name, "Evicting expired lock holder");
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        held.insert(
            name.to_string(),
            LockEntry {
                token,
                expires_at: now + ttl,
            },
        );
        Some(LockGuard {
            registry: Arc::clone(&self.inner),
            name: name.to_string(),
            token,
        })
    }

    /// Acquire with bounded waiting; `None` after the blocking timeout
    pub async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        blocking_timeout: Option<Duration>,
    ) -> Option<LockGuard> {
        let deadline = blocking_timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(guard) = self.try_acquire(name, ttl) {
                return Some(guard);
            }
            match deadline {
                None => return None,
                Some(deadline) if Instant::now() >= deadline => return None,
                Some(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    }

    /// Whether the named lock currently has a live holder
    pub fn is_held(&self, name: &str) -> bool {
        let held = self.inner.held.lock();
        matches!(held.get(name), Some(entry) if entry.expires_at > Instant::now())
    }
}
