//! Testing utilities and mock implementations
//!
//! Mocks for exercising the bus without a real MQTT broker: a transport
//! that records every call so tests can assert on presence payloads,
//! subscription filters and publish traffic.

pub mod mocks;

pub use mocks::*;
