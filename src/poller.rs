//! Edge detection by sampling.
//!
//! The sysfs interface used here offers no interrupt delivery, so armed pins
//! are read at a fixed interval and level changes are matched against each
//! pin's edge policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::backend::GpioBackend;
use crate::board::GPIO_PINS;
use crate::config::EdgeDetect;
use crate::control::PinControl;
use crate::error::AppError;
use crate::events::{EdgeEvent, InterruptSender, PendingInterrupt};

/// Whether an observed edge satisfies the configured policy.
pub fn edge_matches(configured: EdgeDetect, observed: EdgeDetect) -> bool {
    match configured {
        EdgeDetect::None => false,
        EdgeDetect::Rising => observed == EdgeDetect::Rising,
        EdgeDetect::Falling => observed == EdgeDetect::Falling,
        EdgeDetect::Both => matches!(observed, EdgeDetect::Rising | EdgeDetect::Falling),
    }
}

/// Last observed level per pin, all low at start, plus which pins are
/// currently unreadable.
#[derive(Debug, Clone)]
pub struct EdgeTracker {
    last_level: [u8; GPIO_PINS],
    failing: [bool; GPIO_PINS],
}

impl EdgeTracker {
    pub fn new() -> Self {
        Self {
            last_level: [0; GPIO_PINS],
            failing: [false; GPIO_PINS],
        }
    }

    pub fn is_failing(&self, pin: usize) -> bool {
        self.failing.get(pin).copied().unwrap_or(false)
    }

    /// Flags `pin` as unreadable. Returns `true` only on the first failure
    /// of a run.
    pub fn mark_failing(&mut self, pin: usize) -> bool {
        self.failing
            .get_mut(pin)
            .is_some_and(|f| !std::mem::replace(f, true))
    }

    /// Clears the unreadable flag. Returns `true` when the pin was failing.
    pub fn mark_recovered(&mut self, pin: usize) -> bool {
        self.failing
            .get_mut(pin)
            .is_some_and(|f| std::mem::replace(f, false))
    }

    /// Records `level` for `pin` and returns the edge to report, if any.
    ///
    /// The stored level is updated on every change, whether or not the
    /// policy fires.
    pub fn observe(&mut self, pin: usize, level: u8, policy: EdgeDetect) -> Option<EdgeDetect> {
        let last = self.last_level.get_mut(pin)?;
        if *last == level {
            return None;
        }
        *last = level;

        let observed = if level == 1 {
            EdgeDetect::Rising
        } else {
            EdgeDetect::Falling
        };
        edge_matches(policy, observed).then_some(observed)
    }
}

impl Default for EdgeTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One sampling pass over every armed pin.
///
/// A pin whose read fails keeps its last level and the pass moves on. Every
/// failure is counted, but only the start and end of a failing run are
/// logged above debug level.
pub fn sample_pass<B: GpioBackend>(
    control: &PinControl<B>,
    tracker: &mut EdgeTracker,
    tx: &InterruptSender,
) {
    for (logical, active_low, interrupt) in control.registry().armed_pins() {
        let Some(pin) = control.physical_pin(logical) else {
            continue;
        };
        let level = match control.sample_armed(pin, active_low) {
            Ok(level) => {
                if tracker.mark_recovered(logical) {
                    info!("gpio{pin} readable again, resuming edge detection on pin {logical}");
                }
                level
            }
            Err(e) => {
                if tracker.mark_failing(logical) {
                    warn!("sampling gpio{pin} failed, pausing edge detection on pin {logical}: {e}");
                } else {
                    debug!("sampling gpio{pin} still failing: {e}");
                }
                continue;
            }
        };
        let Some(edge) = tracker.observe(logical, level, interrupt.edge) else {
            continue;
        };

        debug!("{edge:?} edge on pin {logical} (gpio{pin})");
        control
            .counters
            .edges_detected
            .fetch_add(1, Ordering::Relaxed);

        let _ = tx.send(PendingInterrupt {
            event: EdgeEvent::now(logical, edge),
            callback: interrupt.callback,
        });
    }
}

/// Background sampling thread, stopped and joined on drop.
pub struct Poller {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn<B: GpioBackend + 'static>(
        control: Arc<PinControl<B>>,
        interval: Duration,
        tx: InterruptSender,
    ) -> Result<Self, AppError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("gpio-poller".into())
            .spawn(move || {
                let mut tracker = EdgeTracker::new();
                while !cancel_flag.load(Ordering::Relaxed) {
                    sample_pass(&control, &mut tracker, &tx);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| AppError::ResourceUnavailable(format!("spawn poller: {e}")))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.halt();
    }
}
