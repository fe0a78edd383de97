use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::board::GPIO_PINS;
use crate::config::EdgeDetect;

/// Zero-argument procedure run when an armed pin sees a matching edge.
pub type InterruptCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct Interrupt {
    pub edge: EdgeDetect,
    pub callback: InterruptCallback,
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("edge", &self.edge)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PinRecord {
    /// Set only when this process created the pin's control files.
    pub exported: bool,
    pub active_low: bool,
    pub interrupt: Option<Interrupt>,
}

impl PinRecord {
    pub fn edge(&self) -> EdgeDetect {
        self.interrupt
            .as_ref()
            .map(|i| i.edge)
            .unwrap_or(EdgeDetect::None)
    }
}

/// Per-pin state shared between callers and the poller.
///
/// Each record sits behind its own lock, so work on distinct pins never
/// contends and updates to one pin are serialized.
pub struct PinRegistry {
    records: [Mutex<PinRecord>; GPIO_PINS],
}

impl PinRegistry {
    pub fn new() -> Self {
        Self {
            records: std::array::from_fn(|_| Mutex::new(PinRecord::default())),
        }
    }

    pub fn reset(&self) {
        for record in &self.records {
            *record.lock() = PinRecord::default();
        }
    }

    pub fn get(&self, logical: usize) -> Option<PinRecord> {
        self.records.get(logical).map(|r| r.lock().clone())
    }

    /// Applies `f` under the record's lock. Out-of-range pins are ignored.
    pub fn update<T>(&self, logical: usize, f: impl FnOnce(&mut PinRecord) -> T) -> Option<T> {
        self.records.get(logical).map(|r| f(&mut *r.lock()))
    }

    pub fn is_active_low(&self, logical: usize) -> bool {
        self.records
            .get(logical)
            .map(|r| r.lock().active_low)
            .unwrap_or(false)
    }

    pub fn set_exported(&self, logical: usize, exported: bool) {
        self.update(logical, |r| r.exported = exported);
    }

    /// Arms the pin, or disarms it when `edge` is [`EdgeDetect::None`].
    pub fn set_interrupt(&self, logical: usize, edge: EdgeDetect, callback: InterruptCallback) {
        let interrupt = match edge {
            EdgeDetect::None => None,
            _ => Some(Interrupt { edge, callback }),
        };
        self.update(logical, |r| r.interrupt = interrupt);
    }

    pub fn clear_interrupt(&self, logical: usize) {
        self.update(logical, |r| r.interrupt = None);
    }

    pub fn exported_pins(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.lock().exported)
            .map(|(logical, _)| logical)
            .collect()
    }

    /// Snapshot of every armed pin with its polarity and interrupt.
    pub fn armed_pins(&self) -> Vec<(usize, bool, Interrupt)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(logical, r)| {
                let record = r.lock();
                record
                    .interrupt
                    .clone()
                    .map(|interrupt| (logical, record.active_low, interrupt))
            })
            .collect()
    }
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self::new()
    }
}
