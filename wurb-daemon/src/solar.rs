//! Sunset, sunrise and civil twilight from the NOAA solar equations
//!
//! Accuracy is a minute or two at mid latitudes, far better than bats care
//! about. Times are returned as local wall-clock times in the configured zone.

use chrono::{Datelike, NaiveDate, NaiveTime};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

use wurb_gps::Zone;

/// Sun's upper limb on the horizon, corrected for refraction
const ZENITH_SUNRISE: f64 = 90.833;

/// Civil twilight: sun 6 degrees below the horizon
const ZENITH_CIVIL: f64 = 96.0;

const MINUTES_PER_DAY: f64 = 1440.0;

/// Solar events for one place and day. `None` when the event does not happen,
/// as in polar day or polar night.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolarTimes {
    pub dawn: Option<NaiveTime>,
    pub sunrise: Option<NaiveTime>,
    pub sunset: Option<NaiveTime>,
    pub dusk: Option<NaiveTime>,
}

type CacheKey = (i64, i64, NaiveDate);

pub struct SolarCalculator {
    zone: Zone,
    cache: Mutex<HashMap<CacheKey, SolarTimes>>,
}

impl SolarCalculator {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn solar_times(&self, latitude: f64, longitude: f64, date: NaiveDate) -> SolarTimes {
        let key = (
            (latitude * 10_000.0).round() as i64,
            (longitude * 10_000.0).round() as i64,
            date,
        );

        if let Some(times) = self.cache.lock().get(&key) {
            return *times;
        }

        let times = self.compute(latitude, longitude, date);
        debug!(
            "Solar times for {:.4},{:.4} on {}: {:?}",
            latitude, longitude, date, times
        );
        self.cache.lock().insert(key, times);
        times
    }

    fn compute(&self, latitude: f64, longitude: f64, date: NaiveDate) -> SolarTimes {
        let offset_minutes = self.zone.offset_on(date).local_minus_utc() as f64 / 60.0;
        let (eqtime, decl) = equation_of_time_and_declination(date);

        let event = |zenith: f64, rising: bool| -> Option<NaiveTime> {
            let ha = hour_angle_deg(latitude, decl, zenith)?;
            let ha = if rising { ha } else { -ha };
            let utc_minutes = 720.0 - 4.0 * (longitude + ha) - eqtime;
            minutes_to_time(utc_minutes + offset_minutes)
        };

        SolarTimes {
            dawn: event(ZENITH_CIVIL, true),
            sunrise: event(ZENITH_SUNRISE, true),
            sunset: event(ZENITH_SUNRISE, false),
            dusk: event(ZENITH_CIVIL, false),
        }
    }
}

/// Equation of time in minutes and solar declination in radians
fn equation_of_time_and_declination(date: NaiveDate) -> (f64, f64) {
    let days_in_year = NaiveDate::from_ymd_opt(date.year(), 12, 31)
        .map(|last| last.ordinal())
        .unwrap_or(365) as f64;
    let gamma = 2.0 * PI / days_in_year * (date.ordinal() as f64 - 1.0);

    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    (eqtime, decl)
}

/// Hour angle in degrees, `None` if the sun never reaches `zenith` that day
fn hour_angle_deg(latitude: f64, decl: f64, zenith: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let cos_ha = zenith.to_radians().cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    Some(cos_ha.acos().to_degrees())
}

fn minutes_to_time(minutes: f64) -> Option<NaiveTime> {
    if !minutes.is_finite() {
        return None;
    }
    let wrapped = minutes.rem_euclid(MINUTES_PER_DAY);
    let seconds = (wrapped * 60.0).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
}
