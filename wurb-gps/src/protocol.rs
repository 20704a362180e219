//! The subset of the gpsd JSON protocol the recorder listens to
//!
//! gpsd sends one JSON object per line, tagged by `class`. Only `TPV`
//! (time-position-velocity) matters here; `VERSION`, `DEVICES`, `SKY` and
//! friends are parsed as [`Report::Other`] and skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{GpsError, Result};

/// Sent after connecting to start the report stream
pub const WATCH_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true}\n";

#[derive(Debug, Deserialize)]
#[serde(tag = "class")]
pub enum Report {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tpv {
    /// ISO 8601, e.g. `2016-08-02T21:50:06.000Z`
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// 0/1 no fix, 2 = 2D, 3 = 3D
    #[serde(default)]
    pub mode: Option<u8>,
}

impl Tpv {
    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        self.time.as_deref().and_then(|t| parse_time(t).ok())
    }
}

pub fn parse_report(line: &str) -> Result<Report> {
    Ok(serde_json::from_str(line)?)
}

pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| GpsError::InvalidTime(text.to_string()))
}
