//! Volatile key/value cache with TTL expiry and list operations.
//!
//! The cache is advisory: a miss falls through to the durable store and a
//! stale entry can never make behavior incorrect. Expired entries are
//! dropped lazily on access.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

enum CacheValue {
    Text(String),
    List(VecDeque<String>),
}

struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(deadline) if Instant::now() >= deadline)
    }
}

/// In-process cache with the shape of a networked KV store
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => match &entry.value {
                CacheValue::Text(s) => Some(s.clone()),
                CacheValue::List(_) => None,
            },
            None => None,
        }
    }

    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.get(key).and_then(|s| serde_json::from_str(&s).ok())
    }

    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: CacheValue::Text(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    pub fn set_json(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        self.set(key, &value.to_string(), ttl);
    }

    /// Remove keys; returns how many existed
    pub fn delete(&self, keys: &[&str]) -> usize {
        let mut entries = self.entries.lock();
        keys.iter().filter(|k| entries.remove(**k).is_some()).count()
    }

    pub fn exists(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Set or refresh the expiry on an existing key
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            _ => false,
        }
    }

    /// Increment an integer counter, creating it at zero if missing
    pub fn increment(&self, key: &str, amount: i64) -> i64 {
        let mut entries = self.entries.lock();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                CacheValue::Text(s) => s.parse::<i64>().unwrap_or(0),
                CacheValue::List(_) => 0,
            },
            _ => 0,
        };
        let next = current + amount;
        entries.insert(
            key.to_string(),
            Entry {
                value: CacheValue::Text(next.to_string()),
                expires_at: None,
            },
        );
        next
    }

    fn with_list<T>(&self, key: &str, f: impl FnOnce(&mut VecDeque<String>) -> T) -> T {
        let mut entries = self.entries.lock();
        let expired = entries.get(key).map(|e| e.is_expired()).unwrap_or(false);
        if expired {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: CacheValue::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            CacheValue::List(list) => f(list),
            CacheValue::Text(_) => {
                entry.value = CacheValue::List(VecDeque::new());
                match &mut entry.value {
                    CacheValue::List(list) => f(list),
                    CacheValue::Text(_) => unreachable!(),
                }
            }
        }
    }

    pub fn lpush(&self, key: &str, value: &str) -> usize {
        self.with_list(key, |list| {
            list.push_front(value.to_string());
            list.len()
        })
    }

    pub fn rpush(&self, key: &str, value: &str) -> usize {
        self.with_list(key, |list| {
            list.push_back(value.to_string());
            list.len()
        })
    }

    pub fn lpop(&self, key: &str) -> Option<String> {
        self.with_list(key, |list| list.pop_front())
    }

    pub fn rpop(&self, key: &str) -> Option<String> {
        self.with_list(key, |list| list.pop_back())
    }

    /// Inclusive range; negative `end` counts from the tail like `-1`
    pub fn lrange(&self, key: &str, start: usize, end: i64) -> Vec<String> {
        self.with_list(key, |list| {
            let len = list.len();
            if len == 0 {
                return Vec::new();
            }
            let end = if end < 0 {
                (len as i64 + end).max(0) as usize
            } else {
                (end as usize).min(len - 1)
            };
            if start > end {
                return Vec::new();
            }
            list.iter().skip(start).take(end - start + 1).cloned().collect()
        })
    }

    pub fn llen(&self, key: &str) -> usize {
        self.with_list(key, |list| list.len())
    }
}
