//! Mock implementations for testing
//!
//! Provides a mock Transport so connection lifecycle, presence and
//! dispatch behavior can be tested without an MQTT broker.

use crate::error::{BusError, BusResult};
use crate::transport::{Message, QosLevel, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock transport that records every call.
#[derive(Default)]
pub struct MockTransport {
    pub published: Arc<Mutex<Vec<Message>>>,
    pub subscribed: Arc<Mutex<Vec<(String, QosLevel)>>>,
    pub disconnects: Arc<AtomicUsize>,
    pub should_fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every call fails, for error path tests.
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }

    /// Published messages for one topic, in order.
    pub fn published_to(&self, topic: &str) -> Vec<Message> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn subscribed(&self) -> Vec<(String, QosLevel)> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn clear_history(&self) {
        self.published.lock().unwrap().clear();
        self.subscribed.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, message: Message) -> BusResult<()> {
        if self.should_fail {
            return Err(BusError::transport_unavailable("mock publish failure"));
        }
        self.published.lock().unwrap().push(message);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QosLevel) -> BusResult<()> {
        if self.should_fail {
            return Err(BusError::transport_unavailable("mock subscribe failure"));
        }
        self.subscribed
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_publishes() {
        let transport = MockTransport::new();
        transport
            .publish(Message {
                topic: "a/b".to_string(),
                payload: vec![1],
                qos: QosLevel::AtMostOnce,
                retain: false,
            })
            .await
            .unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "a/b");
        assert_eq!(transport.published_to("a/b").len(), 1);
        assert!(transport.published_to("other").is_empty());
    }

    #[tokio::test]
    async fn test_mock_transport_failure_mode() {
        let transport = MockTransport::with_failure();
        let result = transport
            .publish(Message {
                topic: "a".to_string(),
                payload: vec![],
                qos: QosLevel::AtMostOnce,
                retain: false,
            })
            .await;
        assert!(result.is_err());
        assert!(transport.published().is_empty());
    }
}
