//! hausbus - Typed MQTT message bus for cooperating device agents
//!
//! Small processes (sensor drivers, controllers, loggers) exchange typed
//! values over a hierarchical topic tree backed by an MQTT broker. Each
//! topic is bound to a serializer, a QoS level and a retain flag through a
//! [`Handle`]; the connection manager supervises the single broker link,
//! announces presence on a retained status topic, and replays
//! subscriptions after every reconnect.
//!
//! # Overview
//!
//! - Typed topic handles with per-topic codecs and delivery policy
//! - Single supervised broker connection with bounded-backoff reconnect
//! - Presence lifecycle: retained `0xFF` online marker, `0x00` last will
//! - Cooperative dispatch loop serializing callbacks and timers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hausbus::{BusConfig, MessageBus, QosLevel};
//! use hausbus::serializer::F32Vector;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BusConfig::load_from_file("bus.toml")?;
//! let bus = MessageBus::start(&config)?;
//! bus.wait_connected(Duration::from_secs(5)).await?;
//!
//! let lux = bus
//!     .bus()
//!     .topic("sensor/lux", F32Vector::new(1), QosLevel::AtMostOnce, false)?;
//! lux.publish(&vec![420.5]).await?;
//!
//! lux.subscribe(|topic, values| {
//!     println!("{topic}: {values:?}");
//!     Ok(())
//! })
//! .await?;
//!
//! bus.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod router;
pub mod scheduler;
pub mod serializer;
pub mod testing;
pub mod topic;
pub mod transport;

pub use bus::{Bus, MessageBus};
pub use config::{BusConfig, ConfigError};
pub use error::{BusError, BusResult, PublishOutcome};
pub use handle::{CallbackError, Handle};
pub use logging::{init_default_logging, init_logging, LogFormat, LogRecord};
pub use router::SubscriptionId;
pub use scheduler::{Scheduler, Timer, TimerId};
pub use serializer::{DecodeError, EncodeError, Serializer};
pub use topic::{Topic, TopicError, TopicFilter};
pub use transport::{ConnectionManager, ConnectionState, QosLevel, ReconnectConfig};
