//! In-process pub/sub of lifecycle/message events (spec §4.4).
//!
//! Fan-out is best-effort: a slow subscriber's bounded buffer fills and
//! further events for it are dropped (with a counter bump) rather than
//! ever blocking the publisher. There is no durability — a subscription
//! only sees events published after it was created.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event topics named in spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    MessageReceived,
    MessageSent,
    MessageFailed,
    RoomMessageAdded,
    PressureTransition,
    OutboundRetryScheduled,
    DeadLetterCaptured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub topic: Topic,
    pub payload: serde_json::Value,
}

const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    topic: Topic,
    sender: mpsc::Sender<SignalEvent>,
}

#[derive(Default)]
pub struct SignalBus {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events dropped across all subscribers due to a full
    /// buffer, for observability.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of live subscribers currently registered for `topic`, for
    /// observability dashboards that want per-topic fan-out width.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.lock().values().filter(|s| s.topic == topic).count()
    }

    pub fn subscribe(self: &Arc<Self>, topic: Topic) -> mpsc::Receiver<SignalEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Subscriber { topic, sender: tx });
        rx
    }

    pub fn publish(&self, topic: Topic, payload: serde_json::Value) {
        let event = SignalEvent { topic, payload };
        let subscribers = self.subscribers.lock();
        for sub in subscribers.values() {
            if sub.topic != topic {
                continue;
            }
            if sub.sender.try_send(event.clone()).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?topic, "signal subscriber buffer full, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_matching_topic_only() {
        let bus = Arc::new(SignalBus::new());
        let mut rx = bus.subscribe(Topic::MessageReceived);
        bus.publish(Topic::MessageSent, serde_json::json!({"x": 1}));
        bus.publish(Topic::MessageReceived, serde_json::json!({"x": 2}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, Topic::MessageReceived);
        assert_eq!(event.payload["x"], 2);
    }

    #[test]
    fn subscriber_count_tracks_per_topic() {
        let bus = Arc::new(SignalBus::new());
        let _a = bus.subscribe(Topic::MessageReceived);
        let _b = bus.subscribe(Topic::MessageReceived);
        let _c = bus.subscribe(Topic::MessageSent);
        assert_eq!(bus.subscriber_count(Topic::MessageReceived), 2);
        assert_eq!(bus.subscriber_count(Topic::MessageSent), 1);
        assert_eq!(bus.subscriber_count(Topic::DeadLetterCaptured), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_without_blocking() {
        let bus = Arc::new(SignalBus::new());
        let _rx = bus.subscribe(Topic::PressureTransition);
        for i in 0..(SUBSCRIBER_BUFFER + 10) {
            bus.publish(Topic::PressureTransition, serde_json::json!({"i": i}));
        }
        assert!(bus.dropped_count() > 0);
    }
}
