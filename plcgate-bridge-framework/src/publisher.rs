//! Message bus seam and its MQTT implementation.

use std::future::Future;

use rumqttc::{AsyncClient, QoS};

use crate::error::{BridgeError, Result};

/// A topic-based publish/subscribe bus.
///
/// Bridges talk to the bus only through this trait so that tests can
/// substitute an in-memory recorder.
pub trait Bus: Send + Sync {
    /// Publish a payload on a topic.
    fn publish(
        &self,
        topic: &str,
        payload: &str,
        retain: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to a topic filter (MQTT wildcards allowed).
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Publisher for sending messages to an MQTT broker.
///
/// Wraps an [`AsyncClient`]; publishing only enqueues the request, the
/// event loop owned by the bus pump performs the network I/O.
#[derive(Clone, Debug)]
pub struct Publisher {
    client: AsyncClient,
    topic_prefix: String,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(client: AsyncClient, topic_prefix: impl Into<String>) -> Self {
        Self {
            client,
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Build a full topic from a suffix.
    pub fn build_topic(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.topic_prefix.clone()
        } else {
            format!("{}/{}", self.topic_prefix, suffix)
        }
    }

    /// Publish a JSON value to a topic.
    pub async fn publish_json<T: serde::Serialize>(
        &self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.publish(topic, &payload, retain).await
    }

    /// Ask the broker for a clean disconnect.
    ///
    /// Fails rather than waits when the request queue is full.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

/// Requests are handed to the event loop without waiting: while the broker
/// is unreachable the loop does not drain its queue, and a full queue must
/// not stall the caller. Refused requests surface as errors.
impl Bus for Publisher {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        tracing::debug!(topic = %topic, payload = %payload, retain, "Publishing");

        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        tracing::debug!(filter = %filter, "Subscribing");

        self.client
            .try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(|e| BridgeError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published messages.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Record the outcome of one publish, logging failures.
    pub fn record(&mut self, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.success += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(error = %e, "Failed to publish");
            }
        }
    }
}
