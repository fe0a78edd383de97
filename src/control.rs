//! File-backed pin control.
//!
//! Translates configuration intents into accesses against a [`GpioBackend`].
//! Callers always get a default-safe result: pins missing from the board are
//! silently skipped, and backend failures are logged and counted in
//! [`GpioStats`] instead of being returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;
use serde::Serialize;

use crate::backend::GpioBackend;
use crate::board::{PhysicalPin, PinMap};
use crate::config::{PinMode, Pull};
use crate::error::AppError;
use crate::registry::PinRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GpioStats {
    pub io_failures: u64,
    pub edges_detected: u64,
    pub callbacks_invoked: u64,
    pub callback_panics: u64,
}

#[derive(Default)]
pub(crate) struct StatCounters {
    pub io_failures: AtomicU64,
    pub edges_detected: AtomicU64,
    pub callbacks_invoked: AtomicU64,
    pub callback_panics: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> GpioStats {
        GpioStats {
            io_failures: self.io_failures.load(Ordering::Relaxed),
            edges_detected: self.edges_detected.load(Ordering::Relaxed),
            callbacks_invoked: self.callbacks_invoked.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}

pub struct PinControl<B: GpioBackend> {
    board: PinMap,
    backend: Arc<B>,
    registry: PinRegistry,
    pub(crate) counters: StatCounters,
}

impl<B: GpioBackend> PinControl<B> {
    pub fn new(board: PinMap, backend: Arc<B>) -> Self {
        Self {
            board,
            backend,
            registry: PinRegistry::new(),
            counters: StatCounters::default(),
        }
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    pub fn stats(&self) -> GpioStats {
        self.counters.snapshot()
    }

    pub fn physical_pin(&self, logical: usize) -> Option<PhysicalPin> {
        self.board.physical_pin(logical)
    }

    /// Runs a backend call, turning a failure into a logged, counted `None`.
    fn attempt<T>(
        &self,
        op: &str,
        pin: PhysicalPin,
        f: impl FnOnce(&B) -> Result<T, AppError>,
    ) -> Option<T> {
        match f(self.backend.as_ref()) {
            Ok(v) => Some(v),
            Err(e) => {
                self.counters.io_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{op} failed for gpio{pin}: {e}");
                None
            }
        }
    }

    pub fn is_exported(&self, physical: Option<PhysicalPin>) -> bool {
        physical.is_some_and(|pin| self.backend.is_exported(pin))
    }

    pub fn export_pin(&self, physical: Option<PhysicalPin>) {
        self.try_export(physical);
    }

    pub(crate) fn try_export(&self, physical: Option<PhysicalPin>) -> bool {
        let Some(pin) = physical else { return false };
        self.attempt("export", pin, |b| b.export(pin)).is_some()
    }

    pub fn unexport_pin(&self, physical: Option<PhysicalPin>) {
        self.try_unexport(physical);
    }

    pub(crate) fn try_unexport(&self, physical: Option<PhysicalPin>) -> bool {
        let Some(pin) = physical else { return false };
        self.attempt("unexport", pin, |b| b.unexport(pin)).is_some()
    }

    pub fn set_direction(&self, physical: Option<PhysicalPin>, mode: PinMode) {
        let Some(pin) = physical else { return };
        self.attempt("set direction", pin, |b| b.set_direction(pin, mode));
    }

    /// `PullUp` engages active-low; any other request clears it.
    pub fn set_polarity(&self, logical: usize, pull: Pull) {
        let Some(pin) = self.physical_pin(logical) else {
            return;
        };
        let active_low = pull == Pull::PullUp;

        if self
            .attempt("set active_low", pin, |b| b.set_active_low(pin, active_low))
            .is_some()
        {
            self.registry.update(logical, |record| record.active_low = active_low);
        }
    }

    /// Logical level of the pin, `0` when unavailable or unreadable.
    pub fn read_level(&self, logical: usize) -> u8 {
        let Some(pin) = self.physical_pin(logical) else {
            return 0;
        };
        let active_low = self.registry.is_active_low(logical);

        self.attempt("read value", pin, |b| Self::sample(b, pin, active_low))
            .unwrap_or(0)
    }

    /// Raw read with polarity applied, failures reported to the caller.
    pub(crate) fn sample(backend: &B, pin: PhysicalPin, active_low: bool) -> Result<u8, AppError> {
        let raw = backend.read_value(pin)?;
        Ok(if active_low { raw ^ 1 } else { raw })
    }

    /// Counts a failed sample but leaves logging to the poller, which
    /// reports only when a pin starts or stops failing.
    pub(crate) fn sample_armed(&self, pin: PhysicalPin, active_low: bool) -> Result<u8, AppError> {
        Self::sample(self.backend.as_ref(), pin, active_low).inspect_err(|_| {
            self.counters.io_failures.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Writes the raw level. Polarity is applied on read only.
    pub fn write_level(&self, logical: usize, value: u8) {
        let Some(pin) = self.physical_pin(logical) else {
            return;
        };
        self.attempt("write value", pin, |b| b.write_value(pin, value));
    }
}
