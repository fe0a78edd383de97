use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::board::PhysicalPin;
use crate::config::PinMode;
use crate::error::AppError;

use super::GpioBackend;

/// Backend over the legacy `/sys/class/gpio` interface.
///
/// Every call opens, accesses and closes the relevant file; nothing is cached.
pub struct SysfsBackend {
    root: PathBuf,
}

impl SysfsBackend {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn pin_dir(&self, pin: PhysicalPin) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn pin_file(&self, pin: PhysicalPin, name: &str) -> PathBuf {
        self.pin_dir(pin).join(name)
    }

    fn open_for_write(path: &Path) -> Result<File, AppError> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| AppError::ResourceUnavailable(format!("open {}: {e}", path.display())))
    }

    fn write_to(path: &Path, contents: &[u8]) -> Result<(), AppError> {
        let mut file = Self::open_for_write(path)?;
        file.write_all(contents)
            .map_err(|e| AppError::ResourceUnavailable(format!("write {}: {e}", path.display())))
    }
}

impl GpioBackend for SysfsBackend {
    fn is_exported(&self, pin: PhysicalPin) -> bool {
        self.pin_dir(pin).is_dir()
    }

    fn export(&self, pin: PhysicalPin) -> Result<(), AppError> {
        Self::write_to(&self.root.join("export"), pin.to_string().as_bytes())
    }

    fn unexport(&self, pin: PhysicalPin) -> Result<(), AppError> {
        Self::write_to(&self.root.join("unexport"), pin.to_string().as_bytes())
    }

    fn set_direction(&self, pin: PhysicalPin, mode: PinMode) -> Result<(), AppError> {
        Self::write_to(&self.pin_file(pin, "direction"), mode.as_str().as_bytes())
    }

    fn set_active_low(&self, pin: PhysicalPin, active_low: bool) -> Result<(), AppError> {
        let flag: &[u8] = if active_low { b"1" } else { b"0" };
        Self::write_to(&self.pin_file(pin, "active_low"), flag)
    }

    fn read_value(&self, pin: PhysicalPin) -> Result<u8, AppError> {
        let path = self.pin_file(pin, "value");
        let mut file = File::open(&path)
            .map_err(|e| AppError::ResourceUnavailable(format!("open {}: {e}", path.display())))?;

        let mut buf = [0u8; 1];
        let read = file
            .read(&mut buf)
            .map_err(|e| AppError::ResourceUnavailable(format!("read {}: {e}", path.display())))?;

        Ok(if read == 1 && buf[0] == b'1' { 1 } else { 0 })
    }

    fn write_value(&self, pin: PhysicalPin, value: u8) -> Result<(), AppError> {
        let level: &[u8] = if value != 0 { b"1" } else { b"0" };
        Self::write_to(&self.pin_file(pin, "value"), level)
    }
}
