//! Weather resolution for the device's current location
//!
//! Every step of [`WeatherResolutionService::get_result_at`] is a hard gate.
//! A failure anywhere is logged and reported as [`WeatherResult::error`];
//! callers never see why a resolution failed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ResolverError;
use crate::condition::map_condition;
use crate::config::{LocationProviderKind, ResolverConfig};
use crate::daynight::{DayNightResolver, LocalZone, SunriseSunsetApi};
use crate::http::{CachingFetcher, DiskCache, FetchError, TcpProbe};
use crate::location::{
    FixedLocationProvider, IpLocationProvider, LocationAcquirer, LocationProvider,
};
use crate::models::{Coordinate, WeatherResult};
use crate::page::{ExtractionError, extract_fields};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Location unavailable: {0}")]
    LocationUnavailable(&'static str),

    #[error("Fetching the weather page failed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("Extracting weather fields failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
}

pub struct WeatherResolutionService {
    acquirer: LocationAcquirer,
    fetcher: CachingFetcher,
    day_night: DayNightResolver,
    base_url: String,
}

impl WeatherResolutionService {
    #[must_use]
    pub fn new(
        acquirer: LocationAcquirer,
        fetcher: CachingFetcher,
        day_night: DayNightResolver,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            acquirer,
            fetcher,
            day_night,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Wire up the production collaborators described by `config`
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let provider: Arc<dyn LocationProvider> = match config.location.provider {
            LocationProviderKind::Fixed => {
                let (Some(latitude), Some(longitude)) =
                    (config.location.latitude, config.location.longitude)
                else {
                    return Err(ResolverError::config(
                        "Fixed location provider requires latitude and longitude",
                    )
                    .into());
                };
                Arc::new(FixedLocationProvider::new(Coordinate::new(latitude, longitude)))
            }
            LocationProviderKind::Ip => Arc::new(IpLocationProvider::new(
                config.location.ip_lookup_url.as_str(),
                config.location_timeout(),
            )?),
        };

        let cache_path = config.cache_path();
        let cache = DiskCache::open(&cache_path, config.cache_capacity_bytes())
            .map_err(|e| ResolverError::cache(format!("{e:#}")))
            .with_context(|| format!("Failed to open HTTP cache at {}", cache_path.display()))?;

        let connectivity = Arc::new(TcpProbe::new(
            config.connectivity.probe_address.as_str(),
            Duration::from_millis(config.connectivity.probe_timeout_ms),
        ));

        let settings = config.fetcher_settings();
        let fetcher = CachingFetcher::new(&settings, Arc::new(cache), connectivity)?;

        let zone = LocalZone::from_name(config.daynight.timezone.as_deref())?;
        let service = SunriseSunsetApi::new(config.daynight.service_url.as_str(), settings.timeout)?;

        Ok(Self::new(
            LocationAcquirer::new(provider),
            fetcher,
            DayNightResolver::new(Arc::new(service), zone),
            config.weather.base_url.as_str(),
        ))
    }

    #[must_use]
    pub fn acquirer(&self) -> &LocationAcquirer {
        &self.acquirer
    }

    /// Begin acquiring a location fix; coalesced with a query already running
    pub fn start_location_query(&self, timeout: Duration) -> bool {
        self.acquirer.start(timeout)
    }

    pub async fn get_weather_result(&self) -> WeatherResult {
        self.get_result_at(Utc::now()).await
    }

    /// Resolve the weather as of `now`
    #[tracing::instrument(skip(self))]
    pub async fn get_result_at(&self, now: DateTime<Utc>) -> WeatherResult {
        match self.resolve(now).await {
            Ok(result) => {
                info!(
                    condition = %result.condition,
                    celsius = result.temperature_celsius,
                    "Weather resolved"
                );
                result
            }
            Err(e) => {
                warn!("Weather resolution failed: {e}");
                WeatherResult::error()
            }
        }
    }

    async fn resolve(&self, now: DateTime<Utc>) -> Result<WeatherResult, ResolveError> {
        if self.acquirer.is_running() {
            return Err(ResolveError::LocationUnavailable("query still running"));
        }
        let fix = self
            .acquirer
            .last_fix()
            .ok_or(ResolveError::LocationUnavailable("no fix"))?;

        let url = weather_url(&self.base_url, &fix.coordinate);
        let body = self.fetcher.fetch(&url).await?;

        let day_night = self.day_night.resolve(fix.coordinate, now).await;
        let fields = extract_fields(&body)?;
        debug!(?fields, ?day_night, "Extracted weather fields");

        let condition = map_condition(&fields.raw_condition_token, day_night);
        Ok(WeatherResult::success(condition, fields.temperature_fahrenheit))
    }
}

/// The "today" page for a coordinate
#[must_use]
pub fn weather_url(base_url: &str, coordinate: &Coordinate) -> String {
    format!(
        "{}/weather/today/l/{},{}?par=google",
        base_url.trim_end_matches('/'),
        coordinate.latitude,
        coordinate.longitude
    )
}
