//! Last known GPS time and position

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Tpv;

/// Text used in file names when nothing better is known
pub const NO_POSITION: &str = "No-position";

/// Time and position from the latest TPV report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsFix {
    pub time_utc: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GpsFix {
    /// Replace every field with what the report carries, clearing the missing ones.
    pub fn apply(&mut self, tpv: &Tpv) {
        self.time_utc = tpv.time_utc();
        self.latitude = tpv.lat;
        self.longitude = tpv.lon;
    }

    pub fn has_position(&self) -> bool {
        matches!((self.latitude, self.longitude), (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0)
    }

    /// `N57.6620E12.6389`, or `None` without a usable position.
    pub fn latlong_string(&self) -> Option<String> {
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => (lat, lon),
            _ => return None,
        };

        Some(format!(
            "{}{:.4}{}{:.4}",
            lat_prefix(lat),
            lat.abs(),
            lon_prefix(lon),
            lon.abs()
        ))
    }
}

/// Position string for a configured default location.
///
/// Zero in either coordinate means "not configured" and gives `No-position`.
pub fn format_position(latitude: f64, longitude: f64) -> String {
    if latitude == 0.0 || longitude == 0.0 {
        return NO_POSITION.to_string();
    }
    format!(
        "{}{}{}{}",
        lat_prefix(latitude),
        latitude.abs(),
        lon_prefix(longitude),
        longitude.abs()
    )
}

fn lat_prefix(lat: f64) -> char {
    if lat >= 0.0 {
        'N'
    } else {
        'S'
    }
}

fn lon_prefix(lon: f64) -> char {
    if lon >= 0.0 {
        'E'
    } else {
        'W'
    }
}
