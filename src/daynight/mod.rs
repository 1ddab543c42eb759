//! Day/night determination
//!
//! Resolution is tiered. The remote lookup service is asked first; if it has
//! no answer, official sunrise and sunset are computed locally with the
//! `sunrise` crate; if that is impossible too, a fixed daytime-hours window
//! in local time decides.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sunrise::{Coordinates, SolarDay, SolarEvent};
use tracing::{debug, warn};

use crate::models::Coordinate;

pub mod sunrise_sunset;

pub use sunrise_sunset::SunriseSunsetApi;

/// First and last local hour (inclusive) treated as daytime by the heuristic
const DAYTIME_HOURS: std::ops::RangeInclusive<u32> = 7..=18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayNight {
    Day,
    Night,
}

/// Remote day/night lookup.
///
/// `date` is the local calendar date `now` falls on, which west of UTC is
/// often the day before `now`'s UTC date. `None` means the service could not
/// decide (network failure, bad response, polar day or night).
#[async_trait]
pub trait DayNightService: Send + Sync {
    async fn query(
        &self,
        latitude: &str,
        longitude: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<DayNight>;
}

/// Time zone used for the calendar date and the hour-of-day heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    /// The zone the process runs in
    System,
    Named(Tz),
}

impl LocalZone {
    /// Parse an IANA zone name, or use the system zone when absent
    pub fn from_name(name: Option<&str>) -> Result<Self> {
        match name {
            None => Ok(Self::System),
            Some(name) => {
                let tz: Tz = name
                    .parse()
                    .map_err(|e| anyhow::anyhow!("{e}"))
                    .with_context(|| format!("Unknown time zone: {name}"))?;
                Ok(Self::Named(tz))
            }
        }
    }

    #[must_use]
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::System => now.with_timezone(&Local).date_naive(),
            Self::Named(tz) => now.with_timezone(tz).date_naive(),
        }
    }

    #[must_use]
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match self {
            Self::System => now.with_timezone(&Local).hour(),
            Self::Named(tz) => now.with_timezone(tz).hour(),
        }
    }
}

/// Official sunrise and sunset for a coordinate on a calendar date.
///
/// Fails for out-of-range coordinates and when the sun does not rise or set
/// that day (polar day or night).
pub fn get_sunrise_sunset(
    coordinate: &Coordinate,
    date: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let coordinates =
        Coordinates::new(coordinate.latitude, coordinate.longitude).with_context(|| {
            format!(
                "Invalid coordinates: lat={}, lng={}",
                coordinate.latitude, coordinate.longitude
            )
        })?;

    let solar_day = SolarDay::new(coordinates, date);

    let sunrise = solar_day
        .event_time(SolarEvent::Sunrise)
        .with_context(|| format!("No sunrise on {date}"))?;
    let sunset = solar_day
        .event_time(SolarEvent::Sunset)
        .with_context(|| format!("No sunset on {date}"))?;

    Ok((sunrise, sunset))
}

/// Decides whether it is day or night at a coordinate
pub struct DayNightResolver {
    service: Arc<dyn DayNightService>,
    zone: LocalZone,
}

impl DayNightResolver {
    #[must_use]
    pub fn new(service: Arc<dyn DayNightService>, zone: LocalZone) -> Self {
        Self { service, zone }
    }

    /// Resolve day/night. Every tier is tried at most once and the call
    /// always produces an answer.
    pub async fn resolve(&self, coordinate: Coordinate, now: DateTime<Utc>) -> DayNight {
        let latitude = coordinate.latitude.to_string();
        let longitude = coordinate.longitude.to_string();
        let date = self.zone.local_date(now);
        if let Some(day_night) = self.service.query(&latitude, &longitude, date, now).await {
            debug!(?day_night, "Day/night answered by lookup service");
            return day_night;
        }

        match self.from_sun_times(&coordinate, now) {
            Ok(day_night) => day_night,
            Err(e) => {
                warn!("Sunrise/sunset calculation failed, using daytime hours: {e:#}");
                self.from_local_hour(now)
            }
        }
    }

    fn from_sun_times(&self, coordinate: &Coordinate, now: DateTime<Utc>) -> Result<DayNight> {
        let date = self.zone.local_date(now);
        let (sunrise, sunset) = get_sunrise_sunset(coordinate, date)?;
        debug!(%now, %sunrise, %sunset, "Computed official sunrise and sunset");

        if now >= sunrise && now < sunset {
            Ok(DayNight::Day)
        } else {
            Ok(DayNight::Night)
        }
    }

    fn from_local_hour(&self, now: DateTime<Utc>) -> DayNight {
        if DAYTIME_HOURS.contains(&self.zone.local_hour(now)) {
            DayNight::Day
        } else {
            DayNight::Night
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnswer {
        answer: Option<DayNight>,
        calls: AtomicUsize,
        dates: std::sync::Mutex<Vec<NaiveDate>>,
    }

    impl FixedAnswer {
        fn new(answer: Option<DayNight>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
                dates: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DayNightService for FixedAnswer {
        async fn query(
            &self,
            _: &str,
            _: &str,
            date: NaiveDate,
            _: DateTime<Utc>,
        ) -> Option<DayNight> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dates.lock().unwrap().push(date);
            self.answer
        }
    }

    fn san_francisco() -> Coordinate {
        Coordinate::new(37.7, -122.4)
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn make_resolver(answer: Option<DayNight>) -> (DayNightResolver, Arc<FixedAnswer>) {
        make_zoned_resolver(answer, Tz::UTC)
    }

    fn make_zoned_resolver(
        answer: Option<DayNight>,
        tz: Tz,
    ) -> (DayNightResolver, Arc<FixedAnswer>) {
        let service = FixedAnswer::new(answer);
        let resolver = DayNightResolver::new(service.clone(), LocalZone::Named(tz));
        (resolver, service)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_service_answer_short_circuits() {
        // 03:00 local in San Francisco, but the service says day
        let (resolver, service) = make_resolver(Some(DayNight::Day));
        let result = resolver.resolve(san_francisco(), utc(2024, 6, 21, 10, 0)).await;
        assert_eq!(result, DayNight::Day);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let (resolver, _) = make_resolver(Some(DayNight::Night));
        let result = resolver.resolve(san_francisco(), utc(2024, 6, 21, 20, 0)).await;
        assert_eq!(result, DayNight::Night);
    }

    #[tokio::test]
    async fn test_unknown_falls_back_to_sun_times() {
        let (resolver, service) = make_resolver(None);
        // 13:00 PDT, well between sunrise and sunset
        assert_eq!(
            resolver.resolve(san_francisco(), utc(2024, 6, 21, 20, 0)).await,
            DayNight::Day
        );
        // 03:00 PDT, before sunrise
        assert_eq!(
            resolver.resolve(san_francisco(), utc(2024, 6, 21, 10, 0)).await,
            DayNight::Night
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_calculation_falls_back_to_hours() {
        let (resolver, _) = make_resolver(None);
        let invalid = Coordinate::new(95.0, 0.0);
        assert_eq!(resolver.resolve(invalid, utc(2024, 1, 1, 7, 0)).await, DayNight::Day);
        assert_eq!(resolver.resolve(invalid, utc(2024, 1, 1, 18, 59)).await, DayNight::Day);
        assert_eq!(resolver.resolve(invalid, utc(2024, 1, 1, 19, 0)).await, DayNight::Night);
        assert_eq!(resolver.resolve(invalid, utc(2024, 1, 1, 6, 59)).await, DayNight::Night);
    }

    #[tokio::test]
    async fn test_service_gets_local_date() {
        let (resolver, service) =
            make_zoned_resolver(Some(DayNight::Day), chrono_tz::America::Los_Angeles);
        // 20:00 PDT on June 21
        resolver.resolve(san_francisco(), utc(2024, 6, 22, 3, 0)).await;
        assert_eq!(*service.dates.lock().unwrap(), vec![date(2024, 6, 21)]);
    }

    #[tokio::test]
    async fn test_sunrise_and_sunset_edges() {
        let (resolver, _) = make_zoned_resolver(None, chrono_tz::America::Los_Angeles);
        let (sunrise, sunset) = get_sunrise_sunset(&san_francisco(), date(2024, 6, 21)).unwrap();

        assert_eq!(resolver.resolve(san_francisco(), sunrise).await, DayNight::Day);
        assert_eq!(resolver.resolve(san_francisco(), sunset).await, DayNight::Night);
        assert_eq!(
            resolver
                .resolve(san_francisco(), sunset - chrono::Duration::seconds(1))
                .await,
            DayNight::Day
        );
    }

    #[tokio::test]
    async fn test_polar_day_and_night_fall_back_to_hours() {
        let longyearbyen = Coordinate::new(78.2, 15.6);
        assert!(get_sunrise_sunset(&longyearbyen, date(2024, 6, 21)).is_err());
        assert!(get_sunrise_sunset(&longyearbyen, date(2024, 12, 21)).is_err());

        // The sun never sets in June nor rises in December; only the clock decides
        let (resolver, _) = make_resolver(None);
        assert_eq!(resolver.resolve(longyearbyen, utc(2024, 6, 21, 12, 0)).await, DayNight::Day);
        assert_eq!(resolver.resolve(longyearbyen, utc(2024, 6, 21, 3, 0)).await, DayNight::Night);
        assert_eq!(resolver.resolve(longyearbyen, utc(2024, 12, 21, 12, 0)).await, DayNight::Day);
        assert_eq!(resolver.resolve(longyearbyen, utc(2024, 12, 21, 22, 0)).await, DayNight::Night);
    }

    #[test]
    fn test_sunrise_before_sunset() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let (sunrise, sunset) = get_sunrise_sunset(&san_francisco(), date).unwrap();
        assert!(sunrise < sunset);
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let err = get_sunrise_sunset(&Coordinate::new(120.0, 0.0), date).unwrap_err();
        assert!(err.to_string().contains("Invalid coordinates"));
    }

    #[test]
    fn test_local_zone_parsing() {
        assert_eq!(LocalZone::from_name(None).unwrap(), LocalZone::System);
        assert_eq!(
            LocalZone::from_name(Some("Europe/Berlin")).unwrap(),
            LocalZone::Named(chrono_tz::Europe::Berlin)
        );
        assert!(LocalZone::from_name(Some("Mars/Olympus_Mons")).is_err());
    }

    #[test]
    fn test_named_zone_hour_and_date() {
        let zone = LocalZone::Named(chrono_tz::America::Los_Angeles);
        let now = utc(2024, 6, 21, 3, 0);
        assert_eq!(zone.local_hour(now), 20);
        assert_eq!(zone.local_date(now), NaiveDate::from_ymd_opt(2024, 6, 20).unwrap());
    }
}
