use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::backend::GpioBackend;
use crate::board::GPIO_PINS;
use crate::config::EdgeDetect;
use crate::control::PinControl;
use crate::error::AppError;
use crate::registry::InterruptCallback;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeEvent {
    pub pin: usize,
    pub edge: EdgeDetect,
    pub timestamp_ms: u64,
}

impl EdgeEvent {
    pub fn now(pin: usize, edge: EdgeDetect) -> Self {
        Self {
            pin,
            edge,
            timestamp_ms: epoch_millis(),
        }
    }
}

/// A detected edge waiting for its callback to run.
pub struct PendingInterrupt {
    pub event: EdgeEvent,
    pub callback: InterruptCallback,
}

pub type InterruptSender = mpsc::UnboundedSender<PendingInterrupt>;
pub type InterruptReceiver = mpsc::UnboundedReceiver<PendingInterrupt>;

/// Fan-out of edge events to subscribers plus a bounded per-pin history.
pub struct EventCallbackHandler {
    event_tx: broadcast::Sender<EdgeEvent>,
    event_history: FxHashMap<usize, RwLock<VecDeque<EdgeEvent>>>,
    event_history_capacity: usize,
}

impl EventCallbackHandler {
    pub fn new(broadcast_capacity: usize, event_history_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(broadcast_capacity);
        let event_history = (0..GPIO_PINS)
            .map(|pin| (pin, RwLock::new(VecDeque::new())))
            .collect();

        Self {
            event_tx,
            event_history,
            event_history_capacity,
        }
    }

    pub fn dispatch(&self, event: EdgeEvent) {
        if let Some(history_lock) = self.event_history.get(&event.pin) {
            let mut history = history_lock.write();
            while history.len() >= self.event_history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeEvent> {
        self.event_tx.subscribe()
    }

    /// Oldest first; `limit` keeps only the most recent entries.
    pub fn history(&self, pin: usize, limit: Option<usize>) -> Vec<EdgeEvent> {
        self.event_history
            .get(&pin)
            .map(|d| {
                let history = d.read();
                let skip = limit.map_or(0, |lim| history.len().saturating_sub(lim));
                history.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn last(&self, pin: usize) -> Option<EdgeEvent> {
        self.event_history
            .get(&pin)
            .and_then(|d| d.read().back().cloned())
    }
}

/// Runs interrupt callbacks on their own thread, off the sampling path.
///
/// The worker exits once every [`InterruptSender`] is dropped and the queue
/// is drained.
pub struct DispatchWorker {
    handle: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn spawn<B: GpioBackend + 'static>(
        mut rx: InterruptReceiver,
        control: Arc<PinControl<B>>,
        handler: Arc<EventCallbackHandler>,
    ) -> Result<Self, AppError> {
        let handle = std::thread::Builder::new()
            .name("gpio-dispatch".into())
            .spawn(move || {
                while let Some(pending) = rx.blocking_recv() {
                    let PendingInterrupt { event, callback } = pending;
                    debug!("dispatching {:?} edge on pin {}", event.edge, event.pin);

                    handler.dispatch(event.clone());

                    match catch_unwind(AssertUnwindSafe(|| callback())) {
                        Ok(()) => {
                            control
                                .counters
                                .callbacks_invoked
                                .fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            control
                                .counters
                                .callback_panics
                                .fetch_add(1, Ordering::Relaxed);
                            warn!("interrupt callback for pin {} panicked", event.pin);
                        }
                    }
                }
            })
            .map_err(|e| AppError::ResourceUnavailable(format!("spawn dispatcher: {e}")))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.wait();
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
