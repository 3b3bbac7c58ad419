//! MQTT connection management
//!
//! Split into focused sub-modules, pure logic separated from I/O:
//!
//! - [`connection`] - connection state, reconnect policy, option building
//! - [`event`] - pure routing of broker events
//! - [`manager`] - the impure connection manager and its supervisor task

pub mod connection;
pub mod event;
pub mod manager;

pub use connection::{
    configure_mqtt_options, ConnectionState, ReconnectConfig, PRESENCE_OFFLINE, PRESENCE_ONLINE,
};
pub use event::{route_event, EventRoute};
pub use manager::{ConnectionManager, InboundMessage, ObserverId};
