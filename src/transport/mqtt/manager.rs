//! Impure connection management and supervisor task
//!
//! The manager owns the single physical broker link. Agents publish and
//! subscribe through it without caring about connection state, with one
//! deliberate exception: QoS 0 publishes while Disconnected are dropped
//! and reported as such. A supervisor task polls the `rumqttc` event loop,
//! recreates the client after transport failures with bounded backoff, and
//! feeds inbound messages to the dispatch loop through a channel; it never
//! calls application code directly.

use super::connection::{
    configure_mqtt_options, ConnectionState, ReconnectConfig, PRESENCE_OFFLINE, PRESENCE_ONLINE,
};
use super::event::{route_event, EventRoute};
use crate::config::BusConfig;
use crate::error::{BusError, BusResult, PublishOutcome};
use crate::topic::{Topic, TopicFilter};
use crate::transport::{Message, QosLevel, Transport};
use rumqttc::v5::{AsyncClient, EventLoop};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Capacity of the inbound dispatch channel.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// One decoded inbound frame handed to the dispatch loop.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Identity of a registered connection-state observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

type StateObserver = Box<dyn FnMut(&ConnectionState) + Send>;

/// Observer table with reentrancy bookkeeping. Observers run with the
/// lock released, so a callback may register or remove observers without
/// wedging the notifying task.
#[derive(Default)]
struct ObserverRegistry {
    entries: Vec<(ObserverId, StateObserver)>,
    /// Ids of the snapshot currently being notified.
    notifying: Vec<ObserverId>,
    /// Removals requested mid-notification, applied when the pass ends.
    removed: Vec<ObserverId>,
}

struct ManagerShared {
    status_topic: Topic,
    transport: Arc<dyn Transport>,
    state_tx: watch::Sender<ConnectionState>,
    observers: StdMutex<ObserverRegistry>,
    /// Distinct broker filters, each re-issued exactly once per reconnect.
    filters: StdMutex<BTreeMap<String, QosLevel>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owner of the single physical broker connection.
///
/// Cheap to clone; all clones share the same link. Constructed explicitly
/// by the process entry point and passed to agents needing bus access.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

impl ConnectionManager {
    /// Connect to the broker described by `config` and spawn the
    /// supervisor task. Returns the manager and the inbound channel the
    /// dispatch loop consumes.
    pub fn connect(config: &BusConfig) -> BusResult<(Self, mpsc::Receiver<InboundMessage>)> {
        let status_topic = Topic::new(config.bus.status_topic.as_str())?;
        let options = configure_mqtt_options(config, &status_topic)?;
        let (client, event_loop) = AsyncClient::new(options, 64);

        let link = Arc::new(RumqttcLink {
            client: Mutex::new(client),
        });
        let (manager, inbound_rx) = Self::build(
            link.clone(),
            status_topic,
            ConnectionState::Connecting,
        );

        let shutdown_rx = manager.shared.shutdown_tx.subscribe();
        tokio::spawn(run_supervisor(
            manager.clone(),
            event_loop,
            link,
            config.clone(),
            ReconnectConfig::default(),
            shutdown_rx,
        ));

        Ok((manager, inbound_rx))
    }

    /// Build a manager over an arbitrary transport without a supervisor.
    /// Used by tests to drive [`process_event`](Self::process_event)
    /// directly against a mock link.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        status_topic: Topic,
    ) -> (Self, mpsc::Receiver<InboundMessage>) {
        Self::build(transport, status_topic, ConnectionState::Disconnected)
    }

    fn build(
        transport: Arc<dyn Transport>,
        status_topic: Topic,
        initial: ConnectionState,
    ) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (state_tx, _) = watch::channel(initial);
        let (shutdown_tx, _) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let manager = ConnectionManager {
            shared: Arc::new(ManagerShared {
                status_topic,
                transport,
                state_tx,
                observers: StdMutex::new(ObserverRegistry::default()),
                filters: StdMutex::new(BTreeMap::new()),
                inbound_tx,
                shutdown_tx,
            }),
        };
        (manager, inbound_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Block until the link reports Connected or the timeout elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> BusResult<()> {
        let mut rx = self.shared.state_tx.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            loop {
                if rx.borrow().is_connected() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await;

        match waited {
            Ok(true) => Ok(()),
            _ => Err(BusError::transport_unavailable(
                "timed out waiting for broker connection",
            )),
        }
    }

    /// Publish one message with the caller's QoS and retain flag.
    ///
    /// Policy: QoS 0 while Disconnected makes no transport call and is
    /// reported as [`PublishOutcome::Dropped`]; QoS >= 1 is handed to the
    /// transport, which queues it for delivery on reconnect.
    pub async fn publish(
        &self,
        topic: &Topic,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> BusResult<PublishOutcome> {
        let connected = self.state().is_connected();
        if !connected && qos == QosLevel::AtMostOnce {
            debug!(topic = %topic, "dropping QoS 0 publish while disconnected");
            return Ok(PublishOutcome::Dropped);
        }

        self.shared
            .transport
            .publish(Message {
                topic: topic.as_str().to_string(),
                payload,
                qos,
                retain,
            })
            .await?;

        Ok(if connected {
            PublishOutcome::Delivered
        } else {
            PublishOutcome::Queued
        })
    }

    /// Record a subscription filter and issue it to the broker if the
    /// link is up. Every distinct filter is re-issued on each reconnect;
    /// broker-side sessions are not trusted to survive.
    pub async fn subscribe(&self, filter: &TopicFilter, qos: QosLevel) -> BusResult<()> {
        let pattern = filter.as_pattern();
        let issue_now = {
            let mut filters = self.shared.filters.lock().expect("filter table poisoned");
            let slot = filters.entry(pattern.clone()).or_insert(qos);
            *slot = (*slot).max(qos);
            self.state().is_connected()
        };

        if issue_now {
            self.shared.transport.subscribe(&pattern, qos).await?;
        }
        Ok(())
    }

    /// Register a connection-state observer, invoked synchronously on
    /// every transition in registration order. Safe to call from within
    /// an observer; the new observer first runs on the next transition.
    pub fn on_state_change<F>(&self, observer: F) -> ObserverId
    where
        F: FnMut(&ConnectionState) + Send + 'static,
    {
        let id = ObserverId(Uuid::new_v4());
        self.shared
            .observers
            .lock()
            .expect("observer list poisoned")
            .entries
            .push((id, Box::new(observer)));
        id
    }

    /// Cancel an observer. Returns false if it was already removed.
    /// Safe to call from within an observer, including self-removal;
    /// the removal takes effect immediately.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut reg = self.shared.observers.lock().expect("observer list poisoned");
        let before = reg.entries.len();
        reg.entries.retain(|(oid, _)| *oid != id);
        if reg.entries.len() != before {
            return true;
        }
        // During a notification pass the entry lives in the snapshot,
        // not the table; record the removal for the pass to honor.
        if reg.notifying.contains(&id) && !reg.removed.contains(&id) {
            reg.removed.push(id);
            return true;
        }
        false
    }

    /// Clean shutdown: publish the offline presence ourselves (superseding
    /// the last-will), stop the supervisor, close the link.
    pub async fn shutdown(&self) -> BusResult<()> {
        let status_topic = self.shared.status_topic.clone();
        let offline = self
            .publish(&status_topic, vec![PRESENCE_OFFLINE], QosLevel::ExactlyOnce, true)
            .await;
        if let Err(e) = offline {
            warn!(error = %e, "failed to publish offline presence during shutdown");
        }

        let _ = self.shared.shutdown_tx.send(true);

        if let Err(e) = self.shared.transport.disconnect().await {
            debug!(error = %e, "transport disconnect during shutdown");
        }
        self.set_state(ConnectionState::Disconnected);
        info!("bus connection shut down");
        Ok(())
    }

    /// Apply one routed broker event. Called by the supervisor task and
    /// by tests simulating connection lifecycles.
    pub async fn process_event(&self, route: EventRoute) {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.set_state(ConnectionState::Connected);
                self.publish_presence_online().await;
                self.resubscribe_filters().await;
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                trace!(topic = %topic, len = payload.len(), "inbound message");
                let inbound = InboundMessage {
                    topic,
                    payload,
                    retain,
                };
                if self.shared.inbound_tx.send(inbound).await.is_err() {
                    debug!("dispatch loop gone, dropping inbound message");
                }
            }
            EventRoute::Disconnected => {
                self.set_state(ConnectionState::Disconnected);
            }
            EventRoute::Infrastructure(event) => {
                trace!(event = %event, "broker event");
            }
            EventRoute::Outgoing => {}
        }
    }

    async fn publish_presence_online(&self) {
        let result = self
            .shared
            .transport
            .publish(Message {
                topic: self.shared.status_topic.as_str().to_string(),
                payload: vec![PRESENCE_ONLINE],
                qos: QosLevel::ExactlyOnce,
                retain: true,
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "failed to publish online presence");
        }
    }

    async fn resubscribe_filters(&self) {
        let filters: Vec<(String, QosLevel)> = {
            let table = self.shared.filters.lock().expect("filter table poisoned");
            table.iter().map(|(f, q)| (f.clone(), *q)).collect()
        };
        for (pattern, qos) in filters {
            match self.shared.transport.subscribe(&pattern, qos).await {
                Ok(()) => debug!(filter = %pattern, "subscription re-issued"),
                Err(e) => error!(filter = %pattern, error = %e, "resubscription failed"),
            }
        }
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let changed = self.shared.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                info!(from = ?current, to = ?next, "connection state");
                *current = next.clone();
                true
            }
        });
        if changed {
            self.notify_observers(&next);
        }
    }

    /// Run one notification pass over a snapshot of the observer table,
    /// with the lock released around each callback. Observers added
    /// during the pass are merged in afterwards; removals requested
    /// during the pass are honored before the affected observer runs.
    fn notify_observers(&self, state: &ConnectionState) {
        let mut snapshot = {
            let mut reg = self.shared.observers.lock().expect("observer list poisoned");
            let snapshot = std::mem::take(&mut reg.entries);
            reg.notifying = snapshot.iter().map(|(id, _)| *id).collect();
            snapshot
        };

        for (id, observer) in snapshot.iter_mut() {
            let removed = {
                let reg = self.shared.observers.lock().expect("observer list poisoned");
                reg.removed.contains(id)
            };
            if !removed {
                observer(state);
            }
        }

        let mut reg = self.shared.observers.lock().expect("observer list poisoned");
        let removed = std::mem::take(&mut reg.removed);
        let added = std::mem::take(&mut reg.entries);
        reg.entries = snapshot
            .into_iter()
            .filter(|(id, _)| !removed.contains(id))
            .collect();
        reg.entries.extend(added);
        reg.notifying.clear();
    }
}

/// Real broker link over a `rumqttc` v5 client. The inner client is
/// replaced in place when the supervisor reconnects.
struct RumqttcLink {
    client: Mutex<AsyncClient>,
}

impl RumqttcLink {
    async fn replace(&self, client: AsyncClient) {
        *self.client.lock().await = client;
    }
}

#[async_trait::async_trait]
impl Transport for RumqttcLink {
    async fn publish(&self, message: Message) -> BusResult<()> {
        let client = self.client.lock().await;
        client
            .publish(
                message.topic,
                message.qos.into(),
                message.retain,
                message.payload,
            )
            .await
            .map_err(BusError::transport)
    }

    async fn subscribe(&self, filter: &str, qos: QosLevel) -> BusResult<()> {
        let client = self.client.lock().await;
        client
            .subscribe(filter, qos.into())
            .await
            .map_err(BusError::transport)
    }

    async fn disconnect(&self) -> BusResult<()> {
        let client = self.client.lock().await;
        client.disconnect().await.map_err(BusError::transport)
    }
}

/// Sleep that aborts early when shutdown is requested. Returns false on
/// shutdown.
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
    }
}

/// Poll the event loop, route events into the manager, and reconnect with
/// backoff after transport failures.
async fn run_supervisor(
    manager: ConnectionManager,
    mut event_loop: EventLoop,
    link: Arc<RumqttcLink>,
    config: BusConfig,
    reconnect: ReconnectConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(client_id = %config.bus.client_id, "bus supervisor started");
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            result = event_loop.poll() => match result {
                Ok(event) => {
                    let route = route_event(&event);
                    if matches!(route, EventRoute::ConnectionAcknowledged) {
                        attempts = 0;
                    }
                    manager.process_event(route).await;
                }
                Err(e) => {
                    warn!(error = %e, "transport error");
                    manager.set_state(ConnectionState::Disconnected);

                    attempts += 1;
                    if !reconnect.may_retry(attempts) {
                        error!(attempts, "reconnection attempts exhausted");
                        break;
                    }

                    let delay = reconnect.backoff_delay(attempts);
                    info!(attempt = attempts, delay_ms = delay, "reconnecting");
                    manager.set_state(ConnectionState::Connecting);

                    if !interruptible_sleep(&mut shutdown_rx, delay).await {
                        break;
                    }

                    match rebuild_connection(&config) {
                        Ok((client, new_event_loop)) => {
                            link.replace(client).await;
                            event_loop = new_event_loop;
                        }
                        Err(e) => {
                            // Options became unbuildable (e.g. CA file
                            // vanished); keep retrying on the next error.
                            error!(error = %e, "failed to rebuild connection");
                        }
                    }
                }
            }
        }
    }
    info!(client_id = %config.bus.client_id, "bus supervisor stopped");
}

fn rebuild_connection(config: &BusConfig) -> BusResult<(AsyncClient, EventLoop)> {
    let status_topic = Topic::new(config.bus.status_topic.as_str())?;
    let options = configure_mqtt_options(config, &status_topic)?;
    Ok(AsyncClient::new(options, 64))
}
