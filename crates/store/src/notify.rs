use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

/// Publish/subscribe channel for task result snapshots. Delivery is best effort.
pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, payload: Value);
}

/// In-process notifier: one broadcast channel per topic, created on first use.
#[derive(Debug, Default)]
pub struct BroadcastNotifier {
    topics: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every payload published to `topic` after this call.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut topics = match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, payload: Value) {
        let Ok(topics) = self.topics.lock() else {
            log::warn!("Notifier lock poisoned; dropping message for {topic}");
            return;
        };
        match topics.get(topic) {
            Some(sender) => {
                // Err only means nobody is listening right now.
                let _ = sender.send(payload);
            }
            None => log::debug!("No subscribers for {topic}"),
        }
    }
}
