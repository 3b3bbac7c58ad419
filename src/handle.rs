//! Typed topic handles
//!
//! A handle binds a topic to a serializer, a QoS level and a retain flag.
//! It owns no network state; many handles may reference the same topic,
//! and handles are cheap to clone and hand to agents at setup time.

use crate::bus::Bus;
use crate::error::{BusError, BusResult, PublishOutcome};
use crate::router::{ErasedHandler, SubscriptionId};
use crate::serializer::Serializer;
use crate::topic::{Topic, TopicFilter};
use crate::transport::QosLevel;
use std::sync::Arc;

/// Error type subscriber callbacks may return; caught and logged at the
/// router boundary, never propagated to other subscribers.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// A bound (topic, serializer, QoS, retain) unit used by agents to
/// publish and subscribe without touching transport internals.
pub struct Handle<S> {
    topic: Topic,
    serializer: Arc<S>,
    qos: QosLevel,
    retain: bool,
    bus: Bus,
}

impl<S> Clone for Handle<S> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            serializer: self.serializer.clone(),
            qos: self.qos,
            retain: self.retain,
            bus: self.bus.clone(),
        }
    }
}

impl<S: Serializer> Handle<S> {
    pub(crate) fn new(bus: Bus, topic: Topic, serializer: S, qos: QosLevel, retain: bool) -> Self {
        Self {
            topic,
            serializer: Arc::new(serializer),
            qos,
            retain,
            bus,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn qos(&self) -> QosLevel {
        self.qos
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    /// Derive a handle for the child topic `self + "/" + suffix` with its
    /// own serializer and delivery policy. `self` is untouched.
    pub fn child<S2: Serializer>(
        &self,
        suffix: &str,
        serializer: S2,
        qos: QosLevel,
        retain: bool,
    ) -> BusResult<Handle<S2>> {
        let topic = self.topic.join(suffix)?;
        Ok(Handle::new(self.bus.clone(), topic, serializer, qos, retain))
    }

    /// Encode `value` and forward it to the connection manager with the
    /// bound QoS and retain flag. See [`PublishOutcome`] for the offline
    /// policy; callers opt into ignoring drops.
    pub async fn publish(&self, value: &S::Value) -> BusResult<PublishOutcome> {
        let payload = self.serializer.encode(value)?;
        self.bus
            .manager()
            .publish(&self.topic, payload, self.qos, self.retain)
            .await
    }

    /// Subscribe to exactly this topic. The callback receives the decoded
    /// value; decode failures drop the message for this subscription only.
    pub async fn subscribe<F>(&self, callback: F) -> BusResult<SubscriptionId>
    where
        F: FnMut(&str, S::Value) -> Result<(), CallbackError> + Send + 'static,
    {
        self.register(TopicFilter::Exact(self.topic.clone()), callback)
            .await
    }

    /// Subscribe to this topic and its whole subtree (`topic/#`).
    pub async fn subscribe_tree<F>(&self, callback: F) -> BusResult<SubscriptionId>
    where
        F: FnMut(&str, S::Value) -> Result<(), CallbackError> + Send + 'static,
    {
        self.register(TopicFilter::Tree(self.topic.clone()), callback)
            .await
    }

    async fn register<F>(&self, filter: TopicFilter, mut callback: F) -> BusResult<SubscriptionId>
    where
        F: FnMut(&str, S::Value) -> Result<(), CallbackError> + Send + 'static,
    {
        let serializer = self.serializer.clone();
        let handler: ErasedHandler = Box::new(move |topic: &str, payload: &[u8]| {
            let value = serializer.decode(payload)?;
            callback(topic, value).map_err(|e| BusError::callback(e.to_string()))
        });
        self.bus.add_subscription(filter, self.qos, handler).await
    }
}
