//! Component F: in-process named-event dispatch wiring B–E together without
//! hard coupling. Subscription happens once during setup; publishing is the
//! only thing that happens at runtime, so no component ever needs a lock.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// A single dispatched event: `gpii.message.hello`, `started-gpii`, and so
/// on, paired with its JSON payload.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
}

/// Append-only after construction: every subscriber gets every event and
/// filters by topic prefix itself, matching a plain pub/sub dispatcher
/// rather than a routing table that would need runtime mutation.
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        let event = BusEvent {
            topic: topic.into(),
            payload,
        };
        trace!(topic = %event.topic, "publishing event");
        // No subscribers is not an error — it just means nobody cares yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish("started-gpii", serde_json::json!({"pid": 42}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "started-gpii");
        assert_eq!(event.payload["pid"], 42);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish("gpii.message.hello", serde_json::json!({}));
    }
}
