//! File name time and position from GPS, with the system clock as fallback

use wurb_audio::wave::DATETIME_FORMAT;
use wurb_audio::NameStamp;
use wurb_gps::{GpsHandle, Zone};

pub struct GpsStamp {
    gps: GpsHandle,
    zone: Zone,
}

impl GpsStamp {
    pub fn new(gps: GpsHandle, zone: Zone) -> Self {
        Self { gps, zone }
    }
}

impl NameStamp for GpsStamp {
    fn datetime_string(&self) -> String {
        self.gps
            .time_local_string(&self.zone)
            .unwrap_or_else(|| self.zone.now().format(DATETIME_FORMAT).to_string())
    }

    fn position_string(&self) -> Option<String> {
        self.gps.latlong_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wurb_gps::GpsFix;

    #[test]
    fn test_uses_gps_fix() {
        let gps = GpsHandle::default();
        gps.set_fix(GpsFix {
            time_utc: Some(Utc.with_ymd_and_hms(2016, 8, 2, 21, 30, 5).unwrap()),
            latitude: Some(57.662),
            longitude: Some(12.6389),
        });

        let stamp = GpsStamp::new(gps, "+02:00".parse().unwrap());
        assert_eq!(stamp.datetime_string(), "20160802T233005+0200");
        assert_eq!(stamp.position_string().as_deref(), Some("N57.6620E12.6389"));
    }

    #[test]
    fn test_falls_back_without_fix() {
        let stamp = GpsStamp::new(GpsHandle::default(), Zone::Utc);
        assert_eq!(stamp.position_string(), None);

        let text = stamp.datetime_string();
        assert_eq!(text.len(), "20160802T233005+0000".len());
        assert!(text.ends_with("+0000"));
    }
}
