//! GPIO layer for the Rock64 over the sysfs pin-control interface, with
//! edge interrupts emulated by polling.

pub mod backend;
pub mod board;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod gpio;
pub mod poller;
pub mod registry;
pub mod routes;

pub use backend::{GpioBackend, MockGpioBackend, SysfsBackend};
pub use board::{BootMedia, GPIO_PINS, PhysicalPin, PinMap};
pub use config::{AppConfig, EdgeDetect, GpioConfig, HttpConfig, PinMode, Pull};
pub use control::{GpioStats, PinControl};
pub use error::AppError;
pub use events::EdgeEvent;
pub use gpio::{GenericGpioManager, GpioManager, PinStatus};
pub use registry::{InterruptCallback, PinRecord, PinRegistry};
pub use routes::AppState;
