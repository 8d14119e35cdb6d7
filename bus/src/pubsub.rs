//! In-process pub/sub with glob-pattern subscriptions.
//!
//! Delivery is best-effort: a subscriber with a full buffer loses the
//! event (logged), and nothing is retried. The durable store is the source
//! of truth; events are a hint to poll it.

use parking_lot::Mutex;
use regex::Regex;
use team_core::events::EventEnvelope;
use tokio::sync::mpsc;

/// Default per-subscriber buffer size
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, channel: &str) -> bool {
        match self {
            Matcher::Exact(name) => name == channel,
            Matcher::Pattern(regex) => regex.is_match(channel),
        }
    }
}

struct SubscriberEntry {
    pattern: String,
    matcher: Matcher,
    tx: mpsc::Sender<(String, EventEnvelope)>,
}

/// Compile a glob pattern (`*` any sequence, `?` one char). Patterns
/// without wildcards, or unexpectedly uncompilable ones, match exactly.
fn compile_pattern(pattern: &str) -> Matcher {
    if !pattern.contains('*') && !pattern.contains('?') {
        return Matcher::Exact(pattern.to_string());
    }
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    match Regex::new(&expr) {
        Ok(regex) => Matcher::Pattern(regex),
        Err(_) => Matcher::Exact(pattern.to_string()),
    }
}

/// Event bus binding workers to state changes
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<SubscriberEntry>>,
}

/// A live subscription; dropped receivers are pruned on the next publish
pub struct Subscription {
    rx: mpsc::Receiver<(String, EventEnvelope)>,
}

impl Subscription {
    /// Wait for the next `(channel, event)` pair. `None` means the bus
    /// was dropped.
    pub async fn recv(&mut self) -> Option<(String, EventEnvelope)> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<(String, EventEnvelope)> {
        self.rx.try_recv().ok()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to channels matching a glob pattern
    /// (e.g. `team:T1:events:task.*`).
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.subscribe_with_capacity(pattern, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, pattern: &str, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.lock().push(SubscriberEntry {
            pattern: pattern.to_string(),
            matcher: compile_pattern(pattern),
            tx,
        });
        Subscription { rx }
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it. A full or
    /// closed subscriber never fails the publish.
    pub fn publish(&self, channel: &str, event: &EventEnvelope) -> usize {
        let mut delivered = 0;
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|entry| !entry.tx.is_closed());

        for entry in subscribers.iter() {
            if !entry.matcher.matches(channel) {
                continue;
            }
            match entry.tx.try_send((channel.to_string(), event.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        channel = %channel,
                        pattern = %entry.pattern,
                        "Subscriber buffer full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|entry| !entry.tx.is_closed());
        subscribers.len()
    }
}
