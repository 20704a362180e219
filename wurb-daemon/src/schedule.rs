//! Daily recording window and the scheduler task that follows it

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use wurb_gps::{GpsHandle, Zone};

use crate::controller::Controller;
use crate::error::{DaemonError, Result};
use crate::solar::{SolarCalculator, SolarTimes};

/// What starts or stops the nightly recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    Sunset,
    Dusk,
    Dawn,
    Sunrise,
    /// Fixed wall-clock time
    Clock(NaiveTime),
}

impl ScheduleEvent {
    /// Time of the event, or its fallback when the sun does not cooperate
    pub fn time(&self, solar: &SolarTimes) -> NaiveTime {
        let (event, fallback) = match self {
            ScheduleEvent::Sunset => (solar.sunset, (18, 0)),
            ScheduleEvent::Dusk => (solar.dusk, (18, 20)),
            ScheduleEvent::Dawn => (solar.dawn, (5, 40)),
            ScheduleEvent::Sunrise => (solar.sunrise, (6, 0)),
            ScheduleEvent::Clock(time) => return *time,
        };
        event.unwrap_or_else(|| {
            NaiveTime::from_hms_opt(fallback.0, fallback.1, 0).unwrap_or_default()
        })
    }
}

impl FromStr for ScheduleEvent {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sunset" => Ok(ScheduleEvent::Sunset),
            "dusk" => Ok(ScheduleEvent::Dusk),
            "dawn" => Ok(ScheduleEvent::Dawn),
            "sunrise" => Ok(ScheduleEvent::Sunrise),
            other => NaiveTime::parse_from_str(other, "%H:%M")
                .map(ScheduleEvent::Clock)
                .map_err(|_| {
                    DaemonError::config(format!(
                        "unknown schedule event '{}', expected sunset, dusk, dawn, sunrise or HH:MM",
                        s
                    ))
                }),
        }
    }
}

impl fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleEvent::Sunset => f.write_str("sunset"),
            ScheduleEvent::Dusk => f.write_str("dusk"),
            ScheduleEvent::Dawn => f.write_str("dawn"),
            ScheduleEvent::Sunrise => f.write_str("sunrise"),
            ScheduleEvent::Clock(time) => write!(f, "{}", time.format("%H:%M")),
        }
    }
}

/// Start and stop times for one day, local wall-clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordingWindow {
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl RecordingWindow {
    pub fn compute(
        start: ScheduleEvent,
        start_adjust_min: i32,
        stop: ScheduleEvent,
        stop_adjust_min: i32,
        solar: &SolarTimes,
    ) -> Self {
        Self {
            start: adjust(start.time(solar), start_adjust_min),
            stop: adjust(stop.time(solar), stop_adjust_min),
        }
    }

    /// A window with `start` after `stop` runs over midnight.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start < self.stop {
            self.start <= now && now <= self.stop
        } else {
            !(self.stop <= now && now <= self.start)
        }
    }
}

impl fmt::Display for RecordingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.stop.format("%H:%M")
        )
    }
}

fn adjust(time: NaiveTime, minutes: i32) -> NaiveTime {
    time.overflowing_add_signed(ChronoDuration::minutes(minutes as i64))
        .0
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub start_event: ScheduleEvent,
    pub start_adjust_min: i32,
    pub stop_event: ScheduleEvent,
    pub stop_adjust_min: i32,
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub only_use_gps_time_and_pos: bool,
    pub poll_interval: Duration,
    pub zone: Zone,
}

/// Decides from time and position whether the recorder should be running.
pub struct Scheduler {
    settings: SchedulerSettings,
    solar: SolarCalculator,
    gps: GpsHandle,
    window: Option<(NaiveDate, RecordingWindow)>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, gps: GpsHandle) -> Self {
        Self {
            solar: SolarCalculator::new(settings.zone),
            settings,
            gps,
            window: None,
        }
    }

    pub fn window(&self) -> Option<RecordingWindow> {
        self.window.map(|(_, w)| w)
    }

    /// GPS time in the configured zone, or the system clock without a fix
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        self.gps
            .time_local(&self.settings.zone)
            .unwrap_or_else(|| self.settings.zone.now())
    }

    fn position(&self) -> Option<(f64, f64)> {
        let fix = self.gps.fix();
        if fix.has_position() {
            if let (Some(lat), Some(lon)) = (fix.latitude, fix.longitude) {
                return Some((lat, lon));
            }
        }
        if self.settings.only_use_gps_time_and_pos {
            return None;
        }
        Some((self.settings.default_latitude, self.settings.default_longitude))
    }

    /// The window for `today`, recomputed when the date changes.
    ///
    /// `None` while waiting for GPS in GPS-only mode.
    pub fn window_for(&mut self, today: NaiveDate) -> Option<RecordingWindow> {
        if let Some((date, window)) = self.window {
            if date == today {
                return Some(window);
            }
        }

        if self.settings.only_use_gps_time_and_pos && self.gps.time_utc().is_none() {
            debug!("Scheduler: waiting for GPS time");
            return None;
        }
        let Some((lat, lon)) = self.position() else {
            debug!("Scheduler: waiting for GPS position");
            return None;
        };

        let solar = self.solar.solar_times(lat, lon, today);
        let s = &self.settings;
        let window = RecordingWindow::compute(
            s.start_event,
            s.start_adjust_min,
            s.stop_event,
            s.stop_adjust_min,
            &solar,
        );

        info!(
            "Scheduler: sunset {} dusk {} dawn {} sunrise {} at {:.4},{:.4}",
            fmt_time(solar.sunset),
            fmt_time(solar.dusk),
            fmt_time(solar.dawn),
            fmt_time(solar.sunrise),
            lat,
            lon
        );
        info!(
            "Scheduler: start {} ({:+} min), stop {} ({:+} min): recording {}",
            s.start_event, s.start_adjust_min, s.stop_event, s.stop_adjust_min, window
        );

        self.window = Some((today, window));
        Some(window)
    }

    /// Should the recorder run at `now`? `None` while no window is known.
    pub fn tick_at(&mut self, now: DateTime<FixedOffset>) -> Option<bool> {
        let window = self.window_for(now.date_naive())?;
        Some(window.contains(now.time()))
    }

    pub fn tick(&mut self) -> Option<bool> {
        let now = self.local_now();
        self.tick_at(now)
    }

    /// Poll until `stop` flips, driving the controller while it has the scheduler active.
    pub async fn run(mut self, controller: Arc<Controller>, mut stop: watch::Receiver<bool>) {
        let period = self.settings.poll_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        info!("Scheduler started, polling every {:?}", period);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.changed() => break,
            }

            let decision = self.tick();
            controller.set_window(self.window());

            let Some(active) = decision else { continue };
            if !controller.is_scheduler_active() {
                continue;
            }

            let result = controller
                .run_blocking(move |c| {
                    if active {
                        c.scheduler_rec_active()
                    } else {
                        c.scheduler_rec_inactive()
                    }
                })
                .await;

            if let Err(e) = result {
                error!("Scheduler: controller task failed: {}", e);
                break;
            }
        }

        info!("Scheduler stopped");
    }
}

fn fmt_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wurb_gps::GpsFix;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn settings(start: &str, stop: &str) -> SchedulerSettings {
        SchedulerSettings {
            start_event: start.parse().unwrap(),
            start_adjust_min: 0,
            stop_event: stop.parse().unwrap(),
            stop_adjust_min: 0,
            default_latitude: 57.662,
            default_longitude: 12.639,
            only_use_gps_time_and_pos: false,
            poll_interval: Duration::from_secs(10),
            zone: Zone::Utc,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        chrono::Utc
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .fixed_offset()
    }

    #[test]
    fn test_parse_events() {
        assert_eq!("Sunset".parse::<ScheduleEvent>().unwrap(), ScheduleEvent::Sunset);
        assert_eq!("dawn".parse::<ScheduleEvent>().unwrap(), ScheduleEvent::Dawn);
        assert_eq!(
            "21:45".parse::<ScheduleEvent>().unwrap(),
            ScheduleEvent::Clock(hm(21, 45))
        );
        assert!("noon".parse::<ScheduleEvent>().is_err());
        assert!("25:00".parse::<ScheduleEvent>().is_err());
        assert_eq!(ScheduleEvent::Clock(hm(6, 5)).to_string(), "06:05");
    }

    #[test]
    fn test_missing_events_use_fallbacks() {
        let none = SolarTimes::default();
        assert_eq!(ScheduleEvent::Sunset.time(&none), hm(18, 0));
        assert_eq!(ScheduleEvent::Dusk.time(&none), hm(18, 20));
        assert_eq!(ScheduleEvent::Dawn.time(&none), hm(5, 40));
        assert_eq!(ScheduleEvent::Sunrise.time(&none), hm(6, 0));
    }

    #[test]
    fn test_adjust_wraps_around_midnight() {
        let solar = SolarTimes {
            sunset: Some(hm(23, 50)),
            sunrise: Some(hm(0, 10)),
            ..SolarTimes::default()
        };
        let window = RecordingWindow::compute(
            ScheduleEvent::Sunset,
            20,
            ScheduleEvent::Sunrise,
            -30,
            &solar,
        );
        assert_eq!(window.start, hm(0, 10));
        assert_eq!(window.stop, hm(23, 40));
    }

    #[test]
    fn test_same_day_window() {
        let window = RecordingWindow {
            start: hm(10, 0),
            stop: hm(12, 0),
        };
        assert!(!window.contains(hm(9, 59)));
        assert!(window.contains(hm(10, 0)));
        assert!(window.contains(hm(11, 0)));
        assert!(window.contains(hm(12, 0)));
        assert!(!window.contains(hm(12, 1)));
    }

    #[test]
    fn test_overnight_window() {
        let window = RecordingWindow {
            start: hm(21, 30),
            stop: hm(4, 0),
        };
        assert!(window.contains(hm(23, 0)));
        assert!(window.contains(hm(0, 0)));
        assert!(window.contains(hm(3, 59)));
        assert!(!window.contains(hm(4, 0)));
        assert!(!window.contains(hm(12, 0)));
        assert!(!window.contains(hm(21, 30)));
        assert!(window.contains(hm(21, 31)));
    }

    #[test]
    fn test_scheduler_uses_default_position_without_gps() {
        let mut scheduler = Scheduler::new(settings("sunset", "sunrise"), GpsHandle::default());

        assert_eq!(scheduler.tick_at(utc(2016, 8, 2, 12, 0)), Some(false));
        assert_eq!(scheduler.tick_at(utc(2016, 8, 2, 22, 0)), Some(true));

        let window = scheduler.window().unwrap();
        assert_eq!(window.start.format("%H").to_string(), "19");
        assert_eq!(window.stop.format("%H").to_string(), "03");
    }

    #[test]
    fn test_window_recomputed_on_new_date() {
        let mut scheduler = Scheduler::new(settings("sunset", "sunrise"), GpsHandle::default());

        scheduler.tick_at(utc(2016, 8, 2, 12, 0));
        let august = scheduler.window().unwrap();
        scheduler.tick_at(utc(2016, 8, 2, 23, 0));
        assert_eq!(scheduler.window().unwrap(), august);

        scheduler.tick_at(utc(2016, 10, 2, 12, 0));
        let october = scheduler.window().unwrap();
        assert!(october.start < august.start, "sunset is earlier in October");
    }

    #[test]
    fn test_gps_only_waits_for_fix() {
        let gps = GpsHandle::default();
        let mut s = settings("sunset", "sunrise");
        s.only_use_gps_time_and_pos = true;
        let mut scheduler = Scheduler::new(s, gps.clone());

        assert_eq!(scheduler.tick_at(utc(2016, 8, 2, 22, 0)), None);

        gps.set_fix(GpsFix {
            time_utc: Some(chrono::Utc.with_ymd_and_hms(2016, 8, 2, 21, 50, 6).unwrap()),
            latitude: Some(57.662),
            longitude: None,
        });
        assert_eq!(scheduler.tick_at(utc(2016, 8, 2, 22, 0)), None);

        gps.set_fix(GpsFix {
            time_utc: Some(chrono::Utc.with_ymd_and_hms(2016, 8, 2, 21, 50, 6).unwrap()),
            latitude: Some(57.662),
            longitude: Some(12.639),
        });
        assert_eq!(scheduler.tick_at(utc(2016, 8, 2, 22, 0)), Some(true));
    }

    #[test]
    fn test_gps_time_preferred() {
        let gps = GpsHandle::default();
        let mut s = settings("10:00", "12:00");
        s.zone = "+02:00".parse().unwrap();
        let mut scheduler = Scheduler::new(s, gps.clone());

        gps.set_fix(GpsFix {
            time_utc: Some(chrono::Utc.with_ymd_and_hms(2021, 6, 21, 9, 0, 0).unwrap()),
            latitude: None,
            longitude: None,
        });
        let now = scheduler.local_now();
        assert_eq!(now.time(), hm(11, 0));
        assert_eq!(scheduler.tick(), Some(true));
    }
}
