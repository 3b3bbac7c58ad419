//! Timer tasks interleaved with message dispatch
//!
//! Single-shot and repeating timers deliver their ticks through the same
//! channel the dispatch loop drains, so a timer callback never runs
//! concurrently with a subscription callback and needs no locking against
//! one. The flip side: a long-running callback blocks all other bus
//! activity, so callbacks must stay short or hand heavy work elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::trace;
use uuid::Uuid;

const TICK_CHANNEL_CAPACITY: usize = 64;

/// Identity of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(Uuid);

struct TimerTask {
    callback: Box<dyn FnMut() + Send>,
    repeating: bool,
    cancelled: Arc<AtomicBool>,
}

type TaskTable = StdMutex<HashMap<TimerId, TimerTask>>;

/// Handle for scheduling timer callbacks onto the bus loop.
#[derive(Clone)]
pub struct Scheduler {
    tick_tx: mpsc::Sender<TimerId>,
    tasks: Arc<TaskTable>,
}

impl Scheduler {
    pub(crate) fn new() -> (Self, mpsc::Receiver<TimerId>) {
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let scheduler = Scheduler {
            tick_tx,
            tasks: Arc::new(StdMutex::new(HashMap::new())),
        };
        (scheduler, tick_rx)
    }

    /// Run `callback` once on the bus loop after `delay`.
    pub fn after<F>(&self, delay: Duration, callback: F) -> Timer
    where
        F: FnMut() + Send + 'static,
    {
        let (id, timer, mut cancel_rx) = self.register(callback, false);
        let tick_tx = self.tick_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_requested(&mut cancel_rx) => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tick_tx.send(id).await;
                }
            }
        });
        timer
    }

    /// Run `callback` on the bus loop every `period` until cancelled.
    pub fn every<F>(&self, period: Duration, callback: F) -> Timer
    where
        F: FnMut() + Send + 'static,
    {
        let (id, timer, mut cancel_rx) = self.register(callback, true);
        let tick_tx = self.tick_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; the first period starts now.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_requested(&mut cancel_rx) => break,
                    _ = interval.tick() => {
                        if tick_tx.send(id).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        timer
    }

    fn register<F>(&self, callback: F, repeating: bool) -> (TimerId, Timer, watch::Receiver<bool>)
    where
        F: FnMut() + Send + 'static,
    {
        let id = TimerId(Uuid::new_v4());
        let cancelled = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.tasks.lock().expect("timer table poisoned").insert(
            id,
            TimerTask {
                callback: Box::new(callback),
                repeating,
                cancelled: cancelled.clone(),
            },
        );

        let timer = Timer {
            id,
            cancelled,
            cancel_tx,
            tasks: Arc::downgrade(&self.tasks),
        };
        (id, timer, cancel_rx)
    }

    /// Invoke the callback behind a delivered tick. Called only from the
    /// dispatch loop; the task table lock is released before the callback
    /// runs so callbacks may schedule further timers.
    pub(crate) fn fire(&self, id: TimerId) {
        let task = self.tasks.lock().expect("timer table poisoned").remove(&id);
        let Some(mut task) = task else {
            trace!(?id, "tick for cancelled timer ignored");
            return;
        };
        if task.cancelled.load(Ordering::Acquire) {
            return;
        }

        (task.callback)();

        if task.repeating && !task.cancelled.load(Ordering::Acquire) {
            self.tasks
                .lock()
                .expect("timer table poisoned")
                .insert(id, task);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

/// Resolves only on an explicit cancel. A dropped [`Timer`] handle closes
/// the channel without the flag ever going true; the timer stays armed.
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// A scheduled timer. Cancelling before the tick fires has no side
/// effects; dropping the handle without cancelling detaches the timer.
pub struct Timer {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    tasks: Weak<TaskTable>,
}

impl Timer {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Disable the timer. Safe to call at any time, including after the
    /// timer already fired.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let _ = self.cancel_tx.send(true);
        if let Some(tasks) = self.tasks.upgrade() {
            tasks.lock().expect("timer table poisoned").remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_shot_fires_once() {
        let (scheduler, mut tick_rx) = Scheduler::new();
        let count = Arc::new(StdMutex::new(0u32));
        let counter = count.clone();
        let _timer = scheduler.after(Duration::from_millis(5), move || {
            *counter.lock().unwrap() += 1;
        });

        let id = tick_rx.recv().await.unwrap();
        scheduler.fire(id);
        assert_eq!(*count.lock().unwrap(), 1);
        // One-shot: the task is gone after firing.
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_repeating_fires_repeatedly() {
        let (scheduler, mut tick_rx) = Scheduler::new();
        let count = Arc::new(StdMutex::new(0u32));
        let counter = count.clone();
        let timer = scheduler.every(Duration::from_millis(2), move || {
            *counter.lock().unwrap() += 1;
        });

        for _ in 0..3 {
            let id = tick_rx.recv().await.unwrap();
            scheduler.fire(id);
        }
        assert_eq!(*count.lock().unwrap(), 3);
        timer.cancel();
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_detaches_single_shot() {
        let (scheduler, mut tick_rx) = Scheduler::new();
        let count = Arc::new(StdMutex::new(0u32));
        let counter = count.clone();
        drop(scheduler.after(Duration::from_millis(5), move || {
            *counter.lock().unwrap() += 1;
        }));

        // Detached, not cancelled: the tick still arrives.
        let id = tokio::time::timeout(Duration::from_millis(500), tick_rx.recv())
            .await
            .expect("detached timer never fired")
            .unwrap();
        scheduler.fire(id);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_detaches_repeating() {
        let (scheduler, mut tick_rx) = Scheduler::new();
        let count = Arc::new(StdMutex::new(0u32));
        let counter = count.clone();
        drop(scheduler.every(Duration::from_millis(2), move || {
            *counter.lock().unwrap() += 1;
        }));

        for _ in 0..2 {
            let id = tokio::time::timeout(Duration::from_millis(500), tick_rx.recv())
                .await
                .expect("detached timer never fired")
                .unwrap();
            scheduler.fire(id);
        }
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_fire_has_no_side_effects() {
        let (scheduler, mut tick_rx) = Scheduler::new();
        let count = Arc::new(StdMutex::new(0u32));
        let counter = count.clone();
        let timer = scheduler.after(Duration::from_millis(1), move || {
            *counter.lock().unwrap() += 1;
        });

        timer.cancel();

        // Even if a tick was already queued before the cancel landed,
        // firing it must be a no-op.
        if let Ok(Some(id)) =
            tokio::time::timeout(Duration::from_millis(20), tick_rx.recv()).await
        {
            scheduler.fire(id);
        }
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
