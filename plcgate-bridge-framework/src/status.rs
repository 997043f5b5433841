//! Bridge status reporting.
//!
//! A retained JSON document on `{topic_prefix}/bridge/status` describes the
//! gateway process itself, independently of the device availability topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::Publisher;

/// Lifecycle phase of the bridge process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
    Error,
}

/// Bridge status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "modbus").
    pub bridge: String,
    pub version: String,
    pub status: BridgeState,
    /// When this status was entered.
    pub since: DateTime<Utc>,
    /// Protocol-specific details, flattened into the document.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    pub fn new(bridge: impl Into<String>, version: impl Into<String>, status: BridgeState) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status,
            since: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Publishes [`BridgeStatus`] documents for one bridge.
pub struct StatusPublisher {
    publisher: Publisher,
    bridge_name: String,
    version: String,
}

impl StatusPublisher {
    pub fn new(
        publisher: Publisher,
        bridge_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            bridge_name: bridge_name.into(),
            version: version.into(),
        }
    }

    fn status(&self, state: BridgeState) -> BridgeStatus {
        BridgeStatus::new(&self.bridge_name, &self.version, state)
    }

    async fn publish(&self, status: &BridgeStatus) -> Result<()> {
        let topic = self.publisher.build_topic("bridge/status");
        self.publisher.publish_json(&topic, status, true).await
    }

    /// Publish `running`, with the gateway's summary flattened in.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = self.status(BridgeState::Running);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        self.publish(&status).await
    }

    pub async fn publish_offline(&self) -> Result<()> {
        self.publish(&self.status(BridgeState::Offline)).await
    }

    /// Publish `error` with the failure reason under `error`.
    pub async fn publish_error(&self, error: impl Into<String>) -> Result<()> {
        let status = self
            .status(BridgeState::Error)
            .with_metadata(serde_json::json!({ "error": error.into() }));
        self.publish(&status).await
    }
}
