use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::backend::GpioBackend;
use crate::board::{GPIO_PINS, PhysicalPin, PinMap};
use crate::config::{EdgeDetect, GpioConfig, PinMode, Pull};
use crate::control::{GpioStats, PinControl};
use crate::error::AppError;
use crate::events::{DispatchWorker, EdgeEvent, EventCallbackHandler};
use crate::poller::Poller;
use crate::registry::InterruptCallback;

pub type GpioManager<B> = GenericGpioManager<B>;

#[derive(Debug, Clone, Serialize)]
pub struct PinStatus {
    pub pin: usize,
    pub physical: Option<PhysicalPin>,
    pub label: Option<String>,
    pub exported: bool,
    pub active_low: bool,
    pub edge: EdgeDetect,
}

struct Running {
    poller: Poller,
    dispatcher: DispatchWorker,
}

/// Owns the pin state for one board and the threads that watch it.
///
/// Dropping the manager stops the poller, drains pending callbacks and
/// unexports every pin this instance exported.
pub struct GenericGpioManager<B: GpioBackend + 'static> {
    config: GpioConfig,
    control: Arc<PinControl<B>>,
    event_handler: Arc<EventCallbackHandler>,
    running: Mutex<Option<Running>>,
}

impl<B: GpioBackend + 'static> GenericGpioManager<B> {
    pub fn new(config: GpioConfig, backend: Arc<B>) -> Self {
        let board = PinMap::for_boot_media(config.boot_media);
        let event_handler = Arc::new(EventCallbackHandler::new(
            config.broadcast_capacity,
            config.event_history_capacity,
        ));

        Self {
            control: Arc::new(PinControl::new(board, backend)),
            event_handler,
            config,
            running: Mutex::new(None),
        }
    }

    /// Resets all pin records and starts sampling.
    ///
    /// Fails with [`AppError::AlreadyInitialized`] while already running.
    pub fn initialize(&self) -> Result<(), AppError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AppError::AlreadyInitialized);
        }

        self.control.registry().reset();

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher =
            DispatchWorker::spawn(rx, self.control.clone(), self.event_handler.clone())?;
        let poller = Poller::spawn(self.control.clone(), self.config.poll_interval(), tx)?;

        *running = Some(Running { poller, dispatcher });
        info!(
            "GPIO layer initialized, sampling every {}ms",
            self.config.poll_interval_ms
        );

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stops the poller, runs callbacks still queued, then unexports.
    pub fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(Running { poller, dispatcher }) = running {
            poller.stop();
            dispatcher.join();
            info!("GPIO poller stopped");
        }
        self.teardown_all();
    }

    pub fn physical_pin(&self, logical: usize) -> Option<PhysicalPin> {
        self.control.physical_pin(logical)
    }

    pub fn is_exported(&self, physical: Option<PhysicalPin>) -> bool {
        self.control.is_exported(physical)
    }

    /// Resolves a pin for callers that need to report why it is unusable.
    pub fn resolve_pin(&self, logical: usize) -> Result<PhysicalPin, AppError> {
        if logical >= GPIO_PINS {
            return Err(AppError::NotFoundPin(logical.to_string()));
        }
        self.physical_pin(logical)
            .ok_or(AppError::PinUnavailable(logical))
    }

    /// Exports the pin if its control files are missing, then sets direction.
    pub fn configure_pin(&self, logical: usize, mode: PinMode) {
        let physical = self.physical_pin(logical);
        if physical.is_none() {
            return;
        }

        if !self.control.is_exported(physical) && self.control.try_export(physical) {
            self.control.registry().set_exported(logical, true);
        }
        self.control.set_direction(physical, mode);
    }

    pub fn set_polarity(&self, logical: usize, pull: Pull) {
        self.control.set_polarity(logical, pull);
    }

    pub fn read_level(&self, logical: usize) -> u8 {
        self.control.read_level(logical)
    }

    pub fn write_level(&self, logical: usize, value: u8) {
        self.control.write_level(logical, value);
    }

    /// Arms the pin for the poller. Direction and export state are left to
    /// [`configure_pin`](Self::configure_pin).
    pub fn register_interrupt(
        &self,
        logical: usize,
        edge: EdgeDetect,
        callback: InterruptCallback,
    ) {
        if self.physical_pin(logical).is_none() {
            return;
        }
        self.control.registry().set_interrupt(logical, edge, callback);
    }

    pub fn clear_interrupt(&self, logical: usize) {
        self.control.registry().clear_interrupt(logical);
    }

    /// Unexports a pin previously exported by this manager.
    pub fn unexport_pin(&self, logical: usize) {
        let exported = self
            .control
            .registry()
            .get(logical)
            .is_some_and(|record| record.exported);
        if !exported {
            return;
        }

        if self.control.try_unexport(self.physical_pin(logical)) {
            self.control
                .registry()
                .update(logical, |record| *record = Default::default());
        } else {
            warn!("pin {logical} left exported");
        }
    }

    pub fn teardown_all(&self) {
        let exported = self.control.registry().exported_pins();
        if exported.is_empty() {
            return;
        }

        info!("unexporting {} pin(s)", exported.len());
        for logical in exported {
            self.unexport_pin(logical);
        }
    }

    pub fn stats(&self) -> GpioStats {
        self.control.stats()
    }

    pub fn pin_status(&self, logical: usize) -> Result<PinStatus, AppError> {
        let record = self
            .control
            .registry()
            .get(logical)
            .ok_or_else(|| AppError::NotFoundPin(logical.to_string()))?;

        Ok(PinStatus {
            pin: logical,
            physical: self.physical_pin(logical),
            label: self.config.labels.get(&logical).cloned(),
            exported: record.exported,
            active_low: record.active_low,
            edge: record.edge(),
        })
    }

    pub fn list_pins(&self) -> Vec<PinStatus> {
        (0..GPIO_PINS)
            .filter_map(|logical| self.pin_status(logical).ok())
            .collect()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EdgeEvent> {
        self.event_handler.subscribe()
    }

    pub fn get_events(
        &self,
        logical: usize,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeEvent>, AppError> {
        self.resolve_pin(logical)?;
        Ok(self.event_handler.history(logical, limit))
    }

    pub fn get_last_event(&self, logical: usize) -> Result<Option<EdgeEvent>, AppError> {
        self.resolve_pin(logical)?;
        Ok(self.event_handler.last(logical))
    }
}

impl<B: GpioBackend + 'static> Drop for GenericGpioManager<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
