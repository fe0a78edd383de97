use std::{fs, path::Path, path::PathBuf, time::Duration};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::board::{BootMedia, GPIO_PINS};
use crate::error::AppError;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PinMode {
    #[serde(alias = "in")]
    Input,
    #[serde(alias = "out")]
    Output,
}

impl PinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinMode::Input => "in",
            PinMode::Output => "out",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Pull {
    #[serde(alias = "up")]
    PullUp,
    #[serde(alias = "down")]
    PullDown,
    Off,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeDetect {
    None,
    Rising,
    Falling,
    Both,
}

impl Default for EdgeDetect {
    fn default() -> Self {
        EdgeDetect::None
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GpioConfig {
    pub sysfs_root: PathBuf,
    pub boot_media: BootMedia,
    pub poll_interval_ms: u64,
    pub broadcast_capacity: usize,
    pub event_history_capacity: usize,
    pub labels: FxHashMap<usize, String>,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            boot_media: BootMedia::default(),
            poll_interval_ms: 1,
            broadcast_capacity: 64,
            event_history_capacity: 32,
            labels: FxHashMap::default(),
        }
    }
}

impl GpioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be positive".into()));
        }
        if self.broadcast_capacity == 0 {
            return Err(AppError::Config("broadcast_capacity must be positive".into()));
        }
        if self.event_history_capacity == 0 {
            return Err(AppError::Config(
                "event_history_capacity must be positive".into(),
            ));
        }
        if let Some(pin) = self.labels.keys().find(|pin| **pin >= GPIO_PINS) {
            return Err(AppError::Config(format!(
                "label given for pin {pin}, valid pins are 0..{GPIO_PINS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.gpio.validate()?;
        Ok(config)
    }
}
