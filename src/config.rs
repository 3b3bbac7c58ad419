//! Configuration surface consumed by the bus
//!
//! Client identity, broker location, credentials and the status topic are
//! supplied by an external TOML file; the bus validates what it consumes
//! and resolves credentials from the environment at connect time.

use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level bus configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    pub bus: BusSection,
    pub broker: BrokerSection,
}

/// Identity of this bus client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusSection {
    /// Client identifier presented to the broker (must match [a-zA-Z0-9._-]+)
    pub client_id: String,
    /// Well-known per-agent presence topic; carries a single byte,
    /// 0x00 = offline, 0xFF = online, QoS 2, retained.
    pub status_topic: String,
}

/// Broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, `mqtt://host:port` or `mqtts://host:port`
    pub url: String,
    /// Environment variable containing the username
    pub username_env: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
    /// Optional CA certificate for TLS connections
    pub ca_file: Option<PathBuf>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid client id: {0}")]
    InvalidClientId(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.is_empty() {
        return Err(ConfigError::InvalidClientId("empty".to_string()));
    }
    for ch in client_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ConfigError::InvalidClientId(format!(
                "invalid character '{ch}' in '{client_id}'"
            )));
        }
    }
    Ok(())
}

impl BusConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BusConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id(&self.bus.client_id)?;
        Topic::new(self.bus.status_topic.as_str())
            .map_err(|e| ConfigError::Invalid(format!("status_topic: {e}")))?;
        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "keep_alive_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Username resolved from the configured environment variable.
    pub fn broker_username(&self) -> Option<String> {
        self.broker
            .username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Password resolved from the configured environment variable.
    pub fn broker_password(&self) -> Option<String> {
        self.broker
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}
