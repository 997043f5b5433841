use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::error::{Error, Result};

/// Capacity of the request channel between the client handle and the event loop.
///
/// Requests beyond this many, while the event loop cannot reach the broker,
/// are refused instead of queued.
pub const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// A retained Last-Will message registered with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: String,
}

impl Will {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Build MQTT client options from the configuration.
///
/// The will, if any, is always registered as retained so that late
/// subscribers observe the last known availability.
pub fn mqtt_options(config: &MqttConfig, will: Option<&Will>) -> Result<MqttOptions> {
    if config.host.is_empty() {
        return Err(Error::Config("MQTT host cannot be empty".to_string()));
    }
    if config.client_id.is_empty() {
        return Err(Error::Config("MQTT client_id cannot be empty".to_string()));
    }

    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    match (&config.username, &config.password) {
        (Some(user), password) => {
            options.set_credentials(user.clone(), password.clone().unwrap_or_default());
        }
        (None, Some(_)) => {
            tracing::warn!("MQTT password configured without username, ignoring it");
        }
        (None, None) => {}
    }

    if let Some(will) = will {
        options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.clone(),
            QoS::AtLeastOnce,
            true,
        ));
    }

    Ok(options)
}

/// Create an MQTT client and its event loop.
///
/// No network traffic happens until the event loop is polled; the event
/// loop reconnects on its own when polled again after an error.
pub fn connect(config: &MqttConfig, will: Option<&Will>) -> Result<(AsyncClient, EventLoop)> {
    let options = mqtt_options(config, will)?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "Creating MQTT client"
    );

    Ok(AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY))
}
