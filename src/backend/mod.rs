//! Pin control stores.
//!
//! A backend is the key-value file store the kernel exposes per physical pin:
//! a global `export`/`unexport` pair plus `direction`, `active_low` and
//! `value` entries under `gpio{P}`. Backends store and return raw values
//! only; polarity handling lives in [`crate::control`].

pub mod mock;
pub mod sysfs;

pub use mock::MockGpioBackend;
pub use sysfs::SysfsBackend;

use crate::board::PhysicalPin;
use crate::config::PinMode;
use crate::error::AppError;

pub trait GpioBackend: Send + Sync {
    /// Whether the control directory for `pin` exists.
    fn is_exported(&self, pin: PhysicalPin) -> bool;
    fn export(&self, pin: PhysicalPin) -> Result<(), AppError>;
    fn unexport(&self, pin: PhysicalPin) -> Result<(), AppError>;
    fn set_direction(&self, pin: PhysicalPin, mode: PinMode) -> Result<(), AppError>;
    fn set_active_low(&self, pin: PhysicalPin, active_low: bool) -> Result<(), AppError>;
    /// Raw level as stored, `1` only if the first byte is `'1'`.
    fn read_value(&self, pin: PhysicalPin) -> Result<u8, AppError>;
    fn write_value(&self, pin: PhysicalPin, value: u8) -> Result<(), AppError>;
}
