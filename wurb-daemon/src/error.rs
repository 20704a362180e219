//! Error types for the daemon library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Recorder error: {0}")]
    Audio(#[from] wurb_audio::AudioError),

    #[error("GPS error: {0}")]
    Gps(#[from] wurb_gps::GpsError),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
