//! Bus assembly and the cooperative dispatch loop
//!
//! One `MessageBus` per process: it owns the connection manager, the
//! dispatch router and the scheduler, and runs the single task that
//! serializes inbound dispatch and timer callbacks. Agents hold cheap
//! [`Bus`] clones; there is no implicit global connection anywhere.

use crate::config::BusConfig;
use crate::error::BusResult;
use crate::handle::Handle;
use crate::router::{DispatchRouter, ErasedHandler, SubscriptionId};
use crate::scheduler::Scheduler;
use crate::serializer::Serializer;
use crate::topic::{Topic, TopicFilter};
use crate::transport::mqtt::{ConnectionManager, InboundMessage};
use crate::transport::QosLevel;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Clonable facade agents use to acquire handles and timers.
#[derive(Clone)]
pub struct Bus {
    manager: ConnectionManager,
    router: Arc<StdMutex<DispatchRouter>>,
    scheduler: Scheduler,
}

impl Bus {
    /// Acquire a typed handle for `name` with the given codec and
    /// delivery policy.
    pub fn topic<S: Serializer>(
        &self,
        name: &str,
        serializer: S,
        qos: QosLevel,
        retain: bool,
    ) -> BusResult<Handle<S>> {
        let topic = Topic::new(name)?;
        Ok(Handle::new(self.clone(), topic, serializer, qos, retain))
    }

    /// The connection manager, for state queries and observers.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The scheduler, for timer callbacks on the bus loop.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Remove a subscription from local dispatch.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.router.lock().expect("router poisoned").remove(id)
    }

    pub(crate) async fn add_subscription(
        &self,
        filter: TopicFilter,
        qos: QosLevel,
        handler: ErasedHandler,
    ) -> BusResult<SubscriptionId> {
        let id = self
            .router
            .lock()
            .expect("router poisoned")
            .add(filter.clone(), handler);
        self.manager.subscribe(&filter, qos).await?;
        Ok(id)
    }
}

/// Process-lifetime owner of the bus: connection, router, scheduler and
/// the dispatch task.
pub struct MessageBus {
    bus: Bus,
    dispatch: JoinHandle<()>,
}

impl MessageBus {
    /// Connect to the configured broker and start the dispatch loop.
    pub fn start(config: &BusConfig) -> BusResult<Self> {
        config.validate()?;
        let (manager, inbound_rx) = ConnectionManager::connect(config)?;
        Ok(Self::assemble(manager, inbound_rx))
    }

    /// Assemble a bus over an existing manager. Used by tests running
    /// against a mock transport.
    pub fn with_manager(
        manager: ConnectionManager,
        inbound_rx: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        Self::assemble(manager, inbound_rx)
    }

    fn assemble(manager: ConnectionManager, inbound_rx: mpsc::Receiver<InboundMessage>) -> Self {
        let (scheduler, tick_rx) = Scheduler::new();
        let router = Arc::new(StdMutex::new(DispatchRouter::new()));

        let bus = Bus {
            manager,
            router: router.clone(),
            scheduler: scheduler.clone(),
        };
        let dispatch = tokio::spawn(run_dispatch(router, scheduler, inbound_rx, tick_rx));

        MessageBus { bus, dispatch }
    }

    /// Facade for agents.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// Block until the broker link is up.
    pub async fn wait_connected(&self, timeout: Duration) -> BusResult<()> {
        self.bus.manager.wait_connected(timeout).await
    }

    /// Clean shutdown: offline presence, close the link, stop dispatch.
    /// Nothing is drained; QoS 0 is at-most-once by design and QoS >= 1
    /// durability belongs to the broker.
    pub async fn shutdown(self) -> BusResult<()> {
        self.bus.manager.shutdown().await?;
        self.dispatch.abort();
        let _ = self.dispatch.await;
        info!("bus dispatch loop stopped");
        Ok(())
    }
}

/// The single cooperative execution context: inbound dispatch and timer
/// callbacks are serialized here, never concurrent with each other.
async fn run_dispatch(
    router: Arc<StdMutex<DispatchRouter>>,
    scheduler: Scheduler,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    mut tick_rx: mpsc::Receiver<crate::scheduler::TimerId>,
) {
    loop {
        tokio::select! {
            inbound = inbound_rx.recv() => match inbound {
                Some(message) => {
                    router
                        .lock()
                        .expect("router poisoned")
                        .dispatch(&message.topic, &message.payload);
                }
                None => break,
            },
            tick = tick_rx.recv() => match tick {
                Some(id) => scheduler.fire(id),
                None => break,
            },
        }
    }
}
