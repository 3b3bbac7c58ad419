//! Transport layer for bus communication
//!
//! The [`Transport`] trait abstracts the raw broker link (publish,
//! subscribe, disconnect) so the connection manager can be exercised
//! against a mock in tests. The MQTT implementation lives in [`mqtt`].

use crate::error::BusResult;

pub mod mqtt;

/// Broker delivery guarantee level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QosLevel {
    /// At-most-once; lost silently when offline.
    AtMostOnce,
    /// At-least-once; queued by the transport for delivery on reconnect.
    AtLeastOnce,
    /// Exactly-once.
    ExactlyOnce,
}

impl QosLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl From<QosLevel> for rumqttc::v5::mqttbytes::QoS {
    fn from(qos: QosLevel) -> Self {
        use rumqttc::v5::mqttbytes::QoS;
        match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
            QosLevel::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// An in-flight message unit. Ephemeral; durability for QoS >= 1 is
/// delegated to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

/// Raw broker link used by the connection manager.
///
/// Implementations never call application code; they only move bytes.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Hand one message to the broker link.
    async fn publish(&self, message: Message) -> BusResult<()>;

    /// Issue one subscription filter to the broker.
    async fn subscribe(&self, filter: &str, qos: QosLevel) -> BusResult<()>;

    /// Close the link cleanly.
    async fn disconnect(&self) -> BusResult<()>;
}

pub use mqtt::{ConnectionManager, ConnectionState, ReconnectConfig};
