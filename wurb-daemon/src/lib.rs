//! WURB daemon library
//!
//! Everything behind the `wurb-daemon` binary, exposed for integration tests.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod gpio;
pub mod housekeeping;
pub mod ipc;
pub mod logging;
pub mod mouse;
pub mod schedule;
pub mod solar;
pub mod stamp;
pub mod system;
pub mod version;

pub use app::Appliance;
pub use config::DaemonConfig;
pub use controller::{Controller, ControllerSettings, Mode, RecordingControl, SystemActions};
pub use error::{DaemonError, Result};
