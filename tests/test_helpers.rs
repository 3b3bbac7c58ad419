//! Test helpers and utilities for integration tests

use hausbus::bus::MessageBus;
use hausbus::config::{BrokerSection, BusConfig, BusSection};
use hausbus::testing::MockTransport;
use hausbus::topic::Topic;
use hausbus::transport::ConnectionManager;
use std::sync::Arc;

pub const STATUS_TOPIC: &str = "agent/test/status";

/// Create a test configuration for integration tests
#[allow(dead_code)]
pub fn test_config() -> BusConfig {
    BusConfig {
        bus: BusSection {
            client_id: "test-agent".to_string(),
            status_topic: STATUS_TOPIC.to_string(),
        },
        broker: BrokerSection {
            url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            ca_file: None,
            keep_alive_secs: 30,
        },
    }
}

/// A bus wired to a recording mock transport instead of a broker.
#[allow(dead_code)]
pub struct MockBus {
    pub bus: MessageBus,
    pub manager: ConnectionManager,
    pub transport: Arc<MockTransport>,
}

/// Assemble a full bus (dispatch loop included) over a mock transport.
/// The link starts Disconnected; drive it with
/// `manager.process_event(...)`.
#[allow(dead_code)]
pub fn mock_bus() -> MockBus {
    let transport = Arc::new(MockTransport::new());
    let (manager, inbound_rx) = ConnectionManager::with_transport(
        transport.clone(),
        Topic::new(STATUS_TOPIC).expect("valid status topic"),
    );
    let bus = MessageBus::with_manager(manager.clone(), inbound_rx);
    MockBus {
        bus,
        manager,
        transport,
    }
}
