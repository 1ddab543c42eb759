//! Configuration management for the weather resolver
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::ResolverError;
use crate::http::FetcherSettings;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Weather page source
    pub weather: WeatherConfig,
    /// HTTP response cache
    pub cache: CacheConfig,
    /// Location acquisition
    pub location: LocationConfig,
    /// Day/night determination
    pub daynight: DayNightConfig,
    /// Network availability probe
    pub connectivity: ConnectivityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Weather page settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the weather site
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// Connect and read timeout in seconds
    #[serde(default = "default_weather_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Maximum cache size in MB
    #[serde(default = "default_cache_max_size")]
    pub max_size_mb: u32,
    /// Minimum freshness given to uncacheable responses
    #[serde(default = "default_freshness_floor")]
    pub freshness_floor_seconds: u32,
    /// Maximum age of a cached page served while offline
    #[serde(default = "default_max_stale")]
    pub max_stale_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationProviderKind {
    /// Geolocate the public IP address
    Ip,
    /// Use `latitude`/`longitude` from the configuration
    Fixed,
}

/// Location acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_location_provider")]
    pub provider: LocationProviderKind,
    /// Deadline of one location query in milliseconds
    #[serde(default = "default_location_timeout")]
    pub timeout_ms: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
}

/// Day/night lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayNightConfig {
    #[serde(default = "default_daynight_service_url")]
    pub service_url: String,
    /// IANA zone name for local dates and hours; system zone when unset
    pub timezone: Option<String>,
}

/// Connectivity probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// `host:port` opened over TCP to detect network availability
    #[serde(default = "default_probe_address")]
    pub probe_address: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_weather_base_url() -> String {
    "https://weather.com".to_string()
}

fn default_weather_timeout() -> u32 {
    30
}

fn default_user_agent() -> String {
    format!("weather-resolver/{}", crate::VERSION)
}

fn default_cache_location() -> String {
    dirs::cache_dir()
        .map(|dir| dir.join("weather-resolver").join("http"))
        .unwrap_or_else(|| PathBuf::from(".cache/weather-resolver/http"))
        .to_string_lossy()
        .into_owned()
}

fn default_cache_max_size() -> u32 {
    10
}

fn default_freshness_floor() -> u32 {
    10
}

fn default_max_stale() -> u32 {
    3 * 60 * 60
}

fn default_location_provider() -> LocationProviderKind {
    LocationProviderKind::Ip
}

fn default_location_timeout() -> u64 {
    30_000
}

fn default_ip_lookup_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_daynight_service_url() -> String {
    "https://api.sunrise-sunset.org".to_string()
}

fn default_probe_address() -> String {
    "1.1.1.1:53".to_string()
}

fn default_probe_timeout() -> u64 {
    1500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            timeout_seconds: default_weather_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
            max_size_mb: default_cache_max_size(),
            freshness_floor_seconds: default_freshness_floor(),
            max_stale_seconds: default_max_stale(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: default_location_provider(),
            timeout_ms: default_location_timeout(),
            latitude: None,
            longitude: None,
            ip_lookup_url: default_ip_lookup_url(),
        }
    }
}

impl Default for DayNightConfig {
    fn default() -> Self {
        Self {
            service_url: default_daynight_service_url(),
            timezone: None,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_address: default_probe_address(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load and validate configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Self::read_from_path(config_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from specified path without validating it.
    ///
    /// Callers that layer further overrides on top must call
    /// [`ResolverConfig::validate`] once they are applied.
    pub fn read_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. WEATHER_RESOLVER_CACHE__MAX_SIZE_MB
        builder = builder.add_source(
            Environment::with_prefix("WEATHER_RESOLVER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: ResolverConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("weather-resolver").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.weather.base_url.is_empty() {
            self.weather.base_url = default_weather_base_url();
        }
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_weather_timeout();
        }
        if self.weather.user_agent.is_empty() {
            self.weather.user_agent = default_user_agent();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.max_size_mb == 0 {
            self.cache.max_size_mb = default_cache_max_size();
        }
        if self.cache.freshness_floor_seconds == 0 {
            self.cache.freshness_floor_seconds = default_freshness_floor();
        }
        if self.location.timeout_ms == 0 {
            self.location.timeout_ms = default_location_timeout();
        }
        if self.location.ip_lookup_url.is_empty() {
            self.location.ip_lookup_url = default_ip_lookup_url();
        }
        if self.daynight.service_url.is_empty() {
            self.daynight.service_url = default_daynight_service_url();
        }
        if self.connectivity.probe_address.is_empty() {
            self.connectivity.probe_address = default_probe_address();
        }
        if self.connectivity.probe_timeout_ms == 0 {
            self.connectivity.probe_timeout_ms = default_probe_timeout();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.validate_location()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.weather.timeout_seconds > 300 {
            return Err(ResolverError::config("Weather timeout cannot exceed 300 seconds").into());
        }

        if self.location.timeout_ms > 300_000 {
            return Err(
                ResolverError::config("Location timeout cannot exceed 300000 ms").into(),
            );
        }

        if self.connectivity.probe_timeout_ms > 300_000 {
            return Err(
                ResolverError::config("Connectivity probe timeout cannot exceed 300000 ms").into(),
            );
        }

        if self.cache.max_size_mb > 1000 {
            return Err(ResolverError::config("Cache max size cannot exceed 1000 MB").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(ResolverError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(ResolverError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Weather base URL", &self.weather.base_url),
            ("Day/night service URL", &self.daynight.service_url),
            ("IP lookup URL", &self.location.ip_lookup_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ResolverError::config(format!(
                    "{name} must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        if let Some(timezone) = &self.daynight.timezone {
            if timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(
                    ResolverError::config(format!("Unknown time zone '{timezone}'")).into(),
                );
            }
        }

        Ok(())
    }

    fn validate_location(&self) -> Result<()> {
        if self.location.provider != LocationProviderKind::Fixed {
            return Ok(());
        }

        let (Some(latitude), Some(longitude)) = (self.location.latitude, self.location.longitude)
        else {
            return Err(ResolverError::config(
                "Fixed location provider requires location.latitude and location.longitude",
            )
            .into());
        };

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ResolverError::config(format!(
                "Fixed location out of range: {latitude}, {longitude}"
            ))
            .into());
        }

        Ok(())
    }

    /// Cache directory with a leading `~/` expanded
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        match (self.cache.location.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.cache.location),
        }
    }

    #[must_use]
    pub fn cache_capacity_bytes(&self) -> u64 {
        u64::from(self.cache.max_size_mb) * 1024 * 1024
    }

    #[must_use]
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location.timeout_ms)
    }

    #[must_use]
    pub fn fetcher_settings(&self) -> FetcherSettings {
        FetcherSettings {
            timeout: Duration::from_secs(u64::from(self.weather.timeout_seconds)),
            user_agent: self.weather.user_agent.clone(),
            freshness_floor: Duration::from_secs(u64::from(self.cache.freshness_floor_seconds)),
            max_stale: Duration::from_secs(u64::from(self.cache.max_stale_seconds)),
        }
    }
}
