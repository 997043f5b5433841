//! Bridge runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use plcgate_common::{LoggingConfig, PAYLOAD_OFFLINE, Will, connect, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::publisher::{Bus, Publisher};
use crate::pump::{BusEvent, EVENT_QUEUE_CAPACITY, run_event_pump};
use crate::status::StatusPublisher;

/// Time given to the event loop to flush shutdown messages.
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(250);

/// Owns the MQTT session of one bridge and the tasks fed by it.
///
/// Creating a runner initializes logging, connects with a retained `offline`
/// Last Will and starts the event pump. [`run_with_metadata`] then waits for
/// Ctrl+C and tears everything down, announcing `offline` on the way out.
///
/// [`run_with_metadata`]: Self::run_with_metadata
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging and status.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Publisher bound to the MQTT client.
    publisher: Publisher,
    /// Receiving side of the bus event channel, until a worker takes it.
    events: Option<mpsc::Receiver<BusEvent>>,
    /// Task driving the MQTT event loop.
    pump: JoinHandle<()>,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a runner, letting `--log-level` override the configured level.
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let will = Will::new(config.availability_topic(), PAYLOAD_OFFLINE);
        let (client, eventloop) = connect(config.mqtt(), Some(&will))?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let pump = tokio::spawn(run_event_pump(eventloop, tx));

        let publisher = Publisher::new(client, config.topic_prefix());

        Ok(Self {
            name,
            version,
            config,
            publisher,
            events: Some(rx),
            pump,
            status_publisher: None,
            tasks: Vec::new(),
        })
    }

    /// Enable status publishing.
    ///
    /// When enabled, the runner will publish status messages on startup and shutdown.
    pub fn with_status_publishing(mut self) -> Self {
        self.status_publisher = Some(StatusPublisher::new(
            self.publisher.clone(),
            &self.name,
            &self.version,
        ));
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Take the bus event receiver.
    ///
    /// Only one consumer exists; later calls return `None`.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BusEvent>> {
        self.events.take()
    }

    /// Spawn a worker task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Report a fatal setup error on the status topic and release the session.
    ///
    /// The Last Will is not sent on a clean disconnect, so `offline` is
    /// announced explicitly.
    pub async fn abort(self, error: &str) {
        tracing::error!(bridge = %self.name, error = %error, "Bridge setup failed");

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_error(error).await {
                tracing::warn!(error = %e, "Failed to publish error status");
            }
        }
        self.shutdown().await;
    }

    /// Publish `running` with `metadata`, then serve until Ctrl+C.
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(metadata).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }

        tracing::info!(bridge = %self.name, "Received shutdown signal");

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_offline().await {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
        }

        let name = self.name.clone();
        self.shutdown().await;

        tracing::info!(bridge = %name, "Goodbye!");

        Ok(())
    }

    async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }

        if let Err(e) = self
            .publisher
            .publish(self.config.availability_topic(), PAYLOAD_OFFLINE, true)
            .await
        {
            tracing::warn!(error = %e, "Failed to announce offline availability");
        }

        if let Err(e) = self.publisher.disconnect().await {
            tracing::warn!(error = %e, "Error disconnecting from MQTT broker");
        }

        // The pump performs the actual network writes; let it flush.
        tokio::time::sleep(SHUTDOWN_FLUSH).await;
        self.pump.abort();
    }
}

/// Convenience function to run a bridge with minimal boilerplate.
///
/// The configuration is loaded and validated before any connection is
/// attempted, so a misconfigured bridge fails without touching the bus.
/// Errors returned by `setup` are published as an `error` status first.
///
/// # Example
///
/// ```ignore
/// use plcgate_bridge_framework::{run_bridge, BridgeConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_bridge::<MyBridgeConfig, _>("mybridge", "mybridge.json5", |runner| {
///         let publisher = runner.publisher();
///         runner.spawn(my_worker(publisher));
///         Ok(None)
///     }).await
/// }
/// ```
pub async fn run_bridge<C, F>(
    name: &str,
    default_config: &'static str,
    setup: F,
) -> anyhow::Result<()>
where
    C: BridgeConfig,
    F: FnOnce(&mut BridgeRunner<C>) -> anyhow::Result<Option<serde_json::Value>>,
{
    let args = BridgeArgs::parse_with_default(default_config);
    let config = C::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = BridgeRunner::new_with_args(name, config, Some(&args))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .with_status_publishing();

    let metadata = match setup(&mut runner) {
        Ok(metadata) => metadata,
        Err(e) => {
            runner.abort(&format!("{:#}", e)).await;
            return Err(e);
        }
    };

    runner
        .run_with_metadata(metadata)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
