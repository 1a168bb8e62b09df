//! # parley-broker
//!
//! In-process topic fan-out.
//!
//! A [`Broker`] maps topic strings to `tokio::sync::broadcast` channels.
//! `publish` delivers an opaque JSON payload to every *current* subscriber
//! of that topic and nothing else: no persistence, no replay, no delivery
//! guarantee.  Publishing to a topic nobody listens on is a no-op, never an
//! error, so a failed fan-out can never roll back the persist that preceded
//! it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

/// Per-topic buffer size.  A receiver that lags more than this many messages
/// behind sees `RecvError::Lagged` and skips ahead.
const TOPIC_CAPACITY: usize = 256;

/// Errors produced by the broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A subscriber handle was requested for an invalid (empty) topic name.
    #[error("Invalid topic name")]
    InvalidTopic,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Cheap-to-clone handle to the topic registry.
#[derive(Clone, Default)]
pub struct Broker {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic, creating it on first use.
    ///
    /// The receiver only sees payloads published after this call.
    pub async fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Value>> {
        if topic.is_empty() {
            return Err(BrokerError::InvalidTopic);
        }

        let mut topics = self.topics.write().await;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);

        debug!(topic = %topic, "subscriber attached");
        Ok(sender.subscribe())
    }

    /// Fan a payload out to every current subscriber of a topic.
    ///
    /// Returns the number of subscribers the payload reached.  Zero is a
    /// normal outcome; dead topics are pruned on the way.
    pub async fn publish(&self, topic: &str, payload: Value) -> usize {
        let delivered = {
            let topics = self.topics.read().await;
            match topics.get(topic) {
                Some(sender) => sender.send(payload).unwrap_or(0),
                None => 0,
            }
        };

        if delivered == 0 {
            trace!(topic = %topic, "published to topic with no subscribers");
            self.prune(topic).await;
        } else {
            trace!(topic = %topic, subscribers = delivered, "published");
        }

        delivered
    }

    /// Number of live subscribers on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a topic entry once its last receiver is gone.
    async fn prune(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if let Some(sender) = topics.get(topic) {
            if sender.receiver_count() == 0 {
                topics.remove(topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fan_out_reaches_all_subscribers() {
        let broker = Broker::new();

        let mut rx1 = broker.subscribe("topic/messages/general").await.unwrap();
        let mut rx2 = broker.subscribe("topic/messages/general").await.unwrap();

        let delivered = broker
            .publish("topic/messages/general", json!({"content": "hi"}))
            .await;
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap()["content"], "hi");
        assert_eq!(rx2.recv().await.unwrap()["content"], "hi");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let broker = Broker::new();
        let delivered = broker.publish("topic/messages/empty", json!(1)).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broker = Broker::new();
        let mut general = broker.subscribe("topic/messages/general").await.unwrap();
        let _other = broker.subscribe("topic/messages/other").await.unwrap();

        broker.publish("topic/messages/general", json!("a")).await;

        assert_eq!(general.recv().await.unwrap(), json!("a"));
        assert!(general.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_payloads() {
        let broker = Broker::new();
        let _early = broker.subscribe("t").await.unwrap();

        broker.publish("t", json!("before")).await;

        let mut late = broker.subscribe("t").await.unwrap();
        broker.publish("t", json!("after")).await;

        assert_eq!(late.recv().await.unwrap(), json!("after"));
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_topic_is_rejected() {
        let broker = Broker::new();
        assert!(broker.subscribe("").await.is_err());
    }

    #[tokio::test]
    async fn dead_topics_are_pruned() {
        let broker = Broker::new();
        {
            let _rx = broker.subscribe("ephemeral").await.unwrap();
        }
        broker.publish("ephemeral", json!(null)).await;
        assert_eq!(broker.subscriber_count("ephemeral").await, 0);
    }
}
