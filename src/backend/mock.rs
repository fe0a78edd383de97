use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::board::PhysicalPin;
use crate::config::PinMode;
use crate::error::AppError;

use super::GpioBackend;

/// In-memory pin control store.
///
/// Behaves like a plain key-value store: values are stored and returned as
/// written, with no kernel-side `active_low` handling. Test hooks allow
/// driving input levels from outside and injecting access failures.
#[derive(Default)]
pub struct MockGpioBackend {
    pins: RwLock<FxHashMap<PhysicalPin, Mutex<MockPinState>>>, // keyed by physical pin
    failing: RwLock<FxHashSet<PhysicalPin>>,
    unexported: Mutex<Vec<PhysicalPin>>,
}

#[derive(Debug, Clone, Default)]
struct MockPinState {
    direction: Option<PinMode>,
    active_low: bool,
    value: u8,
}

impl MockGpioBackend {
    /// Simulate an externally driven level on an exported pin.
    pub fn set_input_level(&self, pin: PhysicalPin, value: u8) {
        if let Some(entry) = self.pins.read().get(&pin) {
            entry.lock().value = value.min(1);
        }
    }

    /// Make every access to `pin` fail, as if its control files vanished.
    pub fn set_failing(&self, pin: PhysicalPin, failing: bool) {
        let mut set = self.failing.write();
        if failing {
            set.insert(pin);
        } else {
            set.remove(&pin);
        }
    }

    pub fn direction(&self, pin: PhysicalPin) -> Option<PinMode> {
        self.pins
            .read()
            .get(&pin)
            .and_then(|entry| entry.lock().direction)
    }

    pub fn active_low(&self, pin: PhysicalPin) -> Option<bool> {
        self.pins.read().get(&pin).map(|entry| entry.lock().active_low)
    }

    pub fn raw_value(&self, pin: PhysicalPin) -> Option<u8> {
        self.pins.read().get(&pin).map(|entry| entry.lock().value)
    }

    /// Pins currently exported, in ascending order.
    pub fn exported_pins(&self) -> Vec<PhysicalPin> {
        let mut pins: Vec<_> = self.pins.read().keys().copied().collect();
        pins.sort_unstable();
        pins
    }

    /// Every successful unexport, in call order.
    pub fn unexport_log(&self) -> Vec<PhysicalPin> {
        self.unexported.lock().clone()
    }

    fn check(&self, pin: PhysicalPin) -> Result<(), AppError> {
        if self.failing.read().contains(&pin) {
            return Err(AppError::ResourceUnavailable(format!(
                "injected failure on gpio{pin}"
            )));
        }
        Ok(())
    }

    fn with_pin<T>(
        &self,
        pin: PhysicalPin,
        f: impl FnOnce(&mut MockPinState) -> T,
    ) -> Result<T, AppError> {
        self.check(pin)?;
        let pins = self.pins.read();
        let entry = pins
            .get(&pin)
            .ok_or_else(|| AppError::ResourceUnavailable(format!("gpio{pin} is not exported")))?;
        let mut state = entry.lock();
        Ok(f(&mut *state))
    }
}

impl GpioBackend for MockGpioBackend {
    fn is_exported(&self, pin: PhysicalPin) -> bool {
        self.pins.read().contains_key(&pin)
    }

    fn export(&self, pin: PhysicalPin) -> Result<(), AppError> {
        self.check(pin)?;
        let mut pins = self.pins.write();
        if pins.contains_key(&pin) {
            return Err(AppError::ResourceUnavailable(format!(
                "gpio{pin} is already exported"
            )));
        }
        pins.insert(pin, Mutex::new(MockPinState::default()));
        Ok(())
    }

    fn unexport(&self, pin: PhysicalPin) -> Result<(), AppError> {
        self.check(pin)?;
        self.pins
            .write()
            .remove(&pin)
            .ok_or_else(|| AppError::ResourceUnavailable(format!("gpio{pin} is not exported")))?;
        self.unexported.lock().push(pin);
        Ok(())
    }

    fn set_direction(&self, pin: PhysicalPin, mode: PinMode) -> Result<(), AppError> {
        self.with_pin(pin, |state| state.direction = Some(mode))
    }

    fn set_active_low(&self, pin: PhysicalPin, active_low: bool) -> Result<(), AppError> {
        self.with_pin(pin, |state| state.active_low = active_low)
    }

    fn read_value(&self, pin: PhysicalPin) -> Result<u8, AppError> {
        self.with_pin(pin, |state| state.value)
    }

    fn write_value(&self, pin: PhysicalPin, value: u8) -> Result<(), AppError> {
        self.with_pin(pin, |state| state.value = if value != 0 { 1 } else { 0 })
    }
}
