//! Real-time execution event streaming.
//!
//! Each subscriber owns a bounded channel. When a buffer fills, new
//! events are dropped and logged; the durable record remains complete.
//! Terminal events end a subscription after the buffered backlog drains.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{ExecutionEvent, ExecutionEventKind};

/// Publisher fanning execution events out to per-execution subscribers
pub struct StreamPublisher {
    buffer_size: usize,
    subscribers: Mutex<HashMap<Uuid, Vec<mpsc::Sender<ExecutionEvent>>>>,
    completed: Mutex<HashSet<Uuid>>,
}

/// One subscriber's view of an execution's event stream
pub struct EventSubscription {
    rx: mpsc::Receiver<ExecutionEvent>,
    filter: Option<Vec<ExecutionEventKind>>,
    done: bool,
}

impl EventSubscription {
    /// Next matching event; `None` once a terminal event has been
    /// delivered (or the publisher dropped the channel).
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        if self.done {
            return None;
        }
        loop {
            let event = self.rx.recv().await?;
            let terminal = event.kind.is_terminal();
            if terminal {
                self.done = true;
            }
            let matches = self
                .filter
                .as_ref()
                .map(|kinds| kinds.contains(&event.kind))
                .unwrap_or(true);
            if matches {
                return Some(event);
            }
            if terminal {
                return None;
            }
        }
    }
}

impl StreamPublisher {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            subscribers: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashSet::new()),
        }
    }

    /// Publish an event to all subscribers of its execution
    pub fn publish(&self, event: &ExecutionEvent) {
        let execution_id = event.execution_id;
        let mut subscribers = self.subscribers.lock();

        if let Some(queues) = subscribers.get_mut(&execution_id) {
            queues.retain(|tx| !tx.is_closed());
            for tx in queues.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            execution = %execution_id,
                            "Stream buffer full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
            if queues.is_empty() {
                subscribers.remove(&execution_id);
            }
        }

        if event.kind.is_terminal() {
            self.completed.lock().insert(execution_id);
            // Drop senders so draining receivers observe the end
            subscribers.remove(&execution_id);
        }
    }

    /// Subscribe to an execution's events, optionally filtered by kind
    pub fn subscribe(
        &self,
        execution_id: Uuid,
        filter: Option<Vec<ExecutionEventKind>>,
    ) -> EventSubscription {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let already_done = self.completed.lock().contains(&execution_id);
        if !already_done {
            self.subscribers
                .lock()
                .entry(execution_id)
                .or_default()
                .push(tx);
        }
        EventSubscription {
            rx,
            filter,
            done: false,
        }
    }

    pub fn is_complete(&self, execution_id: Uuid) -> bool {
        self.completed.lock().contains(&execution_id)
    }

    pub fn subscriber_count(&self, execution_id: Uuid) -> usize {
        self.subscribers
            .lock()
            .get(&execution_id)
            .map(|queues| queues.len())
            .unwrap_or(0)
    }

    /// Forget a completed execution's bookkeeping
    pub fn cleanup(&self, execution_id: Uuid) {
        self.subscribers.lock().remove(&execution_id);
        self.completed.lock().remove(&execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(execution_id: Uuid, kind: ExecutionEventKind) -> ExecutionEvent {
        let mut e = ExecutionEvent::new(execution_id, kind, "test");
        e.data = json!({"x": 1});
        e
    }

    #[tokio::test]
    async fn test_subscription_ends_on_terminal_event() {
        let publisher = StreamPublisher::new(16);
        let id = Uuid::new_v4();
        let mut sub = publisher.subscribe(id, None);

        publisher.publish(&event(id, ExecutionEventKind::ExecutionStarted));
        publisher.publish(&event(id, ExecutionEventKind::ProgressUpdate));
        publisher.publish(&event(id, ExecutionEventKind::ExecutionCompleted));

        assert_eq!(sub.next().await.unwrap().kind, ExecutionEventKind::ExecutionStarted);
        assert_eq!(sub.next().await.unwrap().kind, ExecutionEventKind::ProgressUpdate);
        assert_eq!(
            sub.next().await.unwrap().kind,
            ExecutionEventKind::ExecutionCompleted
        );
        assert!(sub.next().await.is_none());
        assert!(publisher.is_complete(id));
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let publisher = StreamPublisher::new(16);
        let id = Uuid::new_v4();
        let mut sub = publisher.subscribe(id, Some(vec![ExecutionEventKind::DecisionMade]));

        publisher.publish(&event(id, ExecutionEventKind::ExecutionStarted));
        publisher.publish(&event(id, ExecutionEventKind::DecisionMade));
        publisher.publish(&event(id, ExecutionEventKind::ExecutionCompleted));

        assert_eq!(sub.next().await.unwrap().kind, ExecutionEventKind::DecisionMade);
        // Terminal event filtered out: stream just ends
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_independent_subscribers_and_drops() {
        let publisher = StreamPublisher::new(2);
        let id = Uuid::new_v4();
        let mut small = publisher.subscribe(id, None);
        let mut other = publisher.subscribe(id, None);
        assert_eq!(publisher.subscriber_count(id), 2);

        for _ in 0..4 {
            publisher.publish(&event(id, ExecutionEventKind::ProgressUpdate));
        }
        publisher.publish(&event(id, ExecutionEventKind::ExecutionCompleted));

        // Each buffer held only the first two progress events; the rest
        // (including the terminal event) were dropped.
        assert_eq!(small.next().await.unwrap().kind, ExecutionEventKind::ProgressUpdate);
        assert_eq!(small.next().await.unwrap().kind, ExecutionEventKind::ProgressUpdate);
        assert!(small.next().await.is_none());
        assert_eq!(other.next().await.unwrap().kind, ExecutionEventKind::ProgressUpdate);
    }

    #[tokio::test]
    async fn test_subscribe_after_completion_is_empty() {
        let publisher = StreamPublisher::new(4);
        let id = Uuid::new_v4();
        publisher.publish(&event(id, ExecutionEventKind::ExecutionCompleted));

        let mut sub = publisher.subscribe(id, None);
        assert!(sub.next().await.is_none());
    }
}
