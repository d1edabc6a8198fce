//! Message bus abstraction
//!
//! All outbound event delivery (conversation topics, per-user queues,
//! notification and presence channels) goes through [`MessageBus`].
//! Delivery is fire-and-forget relative to persistence: publishing to a
//! channel nobody listens on is not an error, and a slow or absent
//! subscriber never blocks or fails the originating write.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

/// Channel name constructors
///
/// One function per outbound channel so producers and subscribers
/// cannot drift apart on naming.
pub mod channel {
    /// Main per-conversation topic: messages and read receipts
    pub fn conversation(conversation_id: &str) -> String {
        format!("conversation:{}", conversation_id)
    }

    /// Per-conversation typing indicator topic
    pub fn conversation_typing(conversation_id: &str) -> String {
        format!("conversation:{}:typing", conversation_id)
    }

    /// Per-conversation read-receipt topic
    pub fn conversation_read(conversation_id: &str) -> String {
        format!("conversation:{}:read", conversation_id)
    }

    /// Per-user private message queue
    ///
    /// Messages are pushed here in addition to the conversation topic, so
    /// a participant of a just-created conversation still receives the
    /// first message before subscribing to the topic.
    pub fn user_queue(user_id: &str) -> String {
        format!("user:{}:queue", user_id)
    }

    /// Per-user notification channel
    pub fn user_notifications(user_id: &str) -> String {
        format!("user:{}:notifications", user_id)
    }

    /// Per-user presence channel, keyed by username
    pub fn user_presence(username: &str) -> String {
        format!("presence:{}", username)
    }
}

/// Pub/sub interface injected into the core services
///
/// Tests substitute a recording implementation and assert exact
/// publish calls.
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a channel, fire-and-forget
    fn publish(&self, channel: &str, payload: serde_json::Value);

    /// Subscribe to a channel, creating it if needed
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<serde_json::Value>;
}

/// Broadcast capacity per channel; slow subscribers lag and re-fetch
/// history on reconnect rather than applying backpressure.
const CHANNEL_CAPACITY: usize = 256;

/// In-process bus over tokio broadcast channels
///
/// Senders are created lazily per channel name and kept alive so late
/// subscribers attach to the same channel.
pub struct InMemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<serde_json::Value> {
        if let Some(sender) = self.channels.read().unwrap().get(channel) {
            return sender.clone();
        }

        let mut channels = self.channels.write().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InMemoryBus {
    fn publish(&self, channel: &str, payload: serde_json::Value) {
        let sender = self.sender(channel);
        // send only fails when there are no receivers; that is fine here
        if let Err(error) = sender.send(payload) {
            tracing::debug!(channel, %error, "No subscribers for channel");
        }
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<serde_json::Value> {
        self.sender(channel).subscribe()
    }
}

#[cfg(test)]
pub mod testing {
    //! Recording bus for service-level tests

    use std::sync::Mutex;

    use super::*;

    /// Bus that records every publish call and still forwards to an
    /// in-memory bus so subscription behavior can be asserted too.
    pub struct RecordingBus {
        inner: InMemoryBus,
        published: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self {
                inner: InMemoryBus::new(),
                published: Mutex::new(Vec::new()),
            }
        }

        /// All publish calls so far, in order
        pub fn published(&self) -> Vec<(String, serde_json::Value)> {
            self.published.lock().unwrap().clone()
        }

        /// Channels published to so far, in order
        pub fn channels(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(channel, _)| channel.clone())
                .collect()
        }
    }

    impl MessageBus for RecordingBus {
        fn publish(&self, channel: &str, payload: serde_json::Value) {
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), payload.clone()));
            self.inner.publish(channel, payload);
        }

        fn subscribe(&self, channel: &str) -> broadcast::Receiver<serde_json::Value> {
            self.inner.subscribe(channel)
        }
    }
}
