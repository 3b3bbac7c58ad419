//! Pure connection state and option construction
//!
//! Connection state transitions are driven by transport events, never by
//! agent code. This module also builds the `rumqttc` options, including
//! the last-will registration that lets the broker announce an unclean
//! disconnect on the status topic.

use crate::config::{BusConfig, ConfigError};
use crate::topic::Topic;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::time::Duration;
use url::Url;

/// Presence payload published while the client is reachable.
pub const PRESENCE_ONLINE: u8 = 0xFF;
/// Presence payload for clean shutdown and the last-will.
pub const PRESENCE_OFFLINE: u8 = 0x00;

/// Connection state of the single physical broker link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; QoS 0 publishes are dropped, QoS >= 1 queued.
    Disconnected,
    /// Link being established (initial connect or a reconnect attempt).
    Connecting,
    /// ConnAck received; presence published and subscriptions live.
    Connected,
}

impl ConnectionState {
    /// Whether a publish reaches the broker immediately.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Reconnection policy for the supervisor task
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds, walked once per attempt
    pub backoff_pattern: Vec<u64>,
    /// Delay used after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt.
    pub fn backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// Whether another attempt may be made after `attempts` failures.
    pub fn may_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Build `rumqttc` options from the bus configuration: broker address,
/// credentials from the environment, TLS, keep-alive, and the retained
/// QoS 2 last-will carrying [`PRESENCE_OFFLINE`] on the status topic.
pub fn configure_mqtt_options(
    config: &BusConfig,
    status_topic: &Topic,
) -> Result<MqttOptions, ConfigError> {
    let url = Url::parse(&config.broker.url)
        .map_err(|_| ConfigError::Invalid(format!("broker url: {}", config.broker.url)))?;

    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::Invalid(format!("broker url has no host: {url}")))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut options = MqttOptions::new(&config.bus.client_id, host, port);

    if url.scheme() == "mqtts" {
        let transport = match &config.broker.ca_file {
            Some(path) => {
                let ca = std::fs::read(path)?;
                RumqttcTransport::Tls(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                })
            }
            None => RumqttcTransport::tls_with_default_config(),
        };
        options.set_transport(transport);
    }

    if let Some(username) = config.broker_username() {
        options.set_credentials(username, config.broker_password().unwrap_or_default());
    }

    options.set_keep_alive(Duration::from_secs(config.broker.keep_alive_secs));

    // Registered at connect time so the broker publishes "offline" on our
    // behalf if the link drops without a clean shutdown.
    let will = LastWill::new(
        status_topic.as_str(),
        vec![PRESENCE_OFFLINE],
        QoS::ExactlyOnce,
        true,
        None,
    );
    options.set_last_will(will);

    Ok(options)
}
