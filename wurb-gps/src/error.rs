//! Error types for the GPS reader

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpsError>;

#[derive(Error, Debug)]
pub enum GpsError {
    #[error("gpsd connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed gpsd report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid GPS time '{0}'")]
    InvalidTime(String),

    #[error("Invalid timezone '{0}', expected UTC, local or an offset like +02:00")]
    InvalidZone(String),
}
