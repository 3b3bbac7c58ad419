//! Dispatch router: inbound demultiplexing
//!
//! Maps one inbound (topic, bytes) event to every matching subscription.
//! Each subscription decodes with its own serializer before its callback
//! runs; a decode failure or a misbehaving callback on one subscription
//! never prevents the remaining matches from running, and nothing here
//! unwinds into the connection manager's read path.

use crate::error::BusError;
use crate::topic::TopicFilter;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Identity of a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Type-erased handler: decodes the payload and invokes the consumer.
pub(crate) type ErasedHandler = Box<dyn FnMut(&str, &[u8]) -> Result<(), BusError> + Send>;

struct Subscription {
    id: SubscriptionId,
    filter: TopicFilter,
    handler: ErasedHandler,
}

/// Subscription table for one bus instance.
#[derive(Default)]
pub struct DispatchRouter {
    subscriptions: Vec<Subscription>,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Subscriptions are process-lifetime unless
    /// removed with [`remove`](Self::remove).
    pub(crate) fn add(&mut self, filter: TopicFilter, handler: ErasedHandler) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscriptions.push(Subscription { id, filter, handler });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver one inbound message to every matching subscription.
    /// Returns the number of callbacks that ran to completion.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for sub in &mut self.subscriptions {
            if !sub.filter.matches(topic) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (sub.handler)(topic, payload)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(BusError::Decode(e))) => {
                    // Malformed payload for this subscription's codec;
                    // drop the message for it, keep dispatching.
                    warn!(topic = %topic, filter = %sub.filter, error = %e, "dropping undecodable message");
                }
                Ok(Err(e)) => {
                    error!(topic = %topic, filter = %sub.filter, error = %e, "subscriber callback failed");
                }
                Err(_) => {
                    error!(topic = %topic, filter = %sub.filter, "subscriber callback panicked");
                }
            }
        }
        if delivered == 0 {
            debug!(topic = %topic, "no subscription consumed message");
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_handler(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> ErasedHandler {
        Box::new(move |topic, _payload| {
            log.lock().unwrap().push(format!("{tag}:{topic}"));
            Ok(())
        })
    }

    #[test]
    fn test_exact_and_wildcard_both_fire() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = DispatchRouter::new();
        router.add(
            TopicFilter::parse("sensor/lux").unwrap(),
            recording_handler(log.clone(), "exact"),
        );
        router.add(
            TopicFilter::parse("sensor/#").unwrap(),
            recording_handler(log.clone(), "tree"),
        );

        let delivered = router.dispatch("sensor/lux", b"42");
        assert_eq!(delivered, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["exact:sensor/lux", "tree:sensor/lux"]
        );
    }

    #[test]
    fn test_non_matching_subscription_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = DispatchRouter::new();
        router.add(
            TopicFilter::parse("a/b").unwrap(),
            recording_handler(log.clone(), "exact"),
        );

        assert_eq!(router.dispatch("a/b/c", b""), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_callback_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = DispatchRouter::new();
        router.add(
            TopicFilter::parse("a/#").unwrap(),
            Box::new(|_, _| Err(BusError::callback("boom"))),
        );
        router.add(
            TopicFilter::parse("a/#").unwrap(),
            recording_handler(log.clone(), "ok"),
        );

        let delivered = router.dispatch("a/b", b"");
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["ok:a/b"]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = DispatchRouter::new();
        router.add(
            TopicFilter::parse("a/#").unwrap(),
            Box::new(|_, _| panic!("misbehaving consumer")),
        );
        router.add(
            TopicFilter::parse("a/#").unwrap(),
            recording_handler(log.clone(), "ok"),
        );

        assert_eq!(router.dispatch("a/b", b""), 1);
        assert_eq!(*log.lock().unwrap(), vec!["ok:a/b"]);
    }

    #[test]
    fn test_remove_subscription() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = DispatchRouter::new();
        let id = router.add(
            TopicFilter::parse("a").unwrap(),
            recording_handler(log.clone(), "x"),
        );

        assert!(router.remove(id));
        assert!(!router.remove(id));
        assert_eq!(router.dispatch("a", b""), 0);
    }
}
