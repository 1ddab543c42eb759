//! `weather-resolver` - current weather condition for the device's location
//!
//! Acquires a location fix under a deadline, fetches the weather page through
//! a disk-backed HTTP cache that keeps working offline, extracts temperature
//! and condition icon, decides day or night at the location and maps
//! everything to a normalized [`WeatherResult`].

pub mod condition;
pub mod config;
pub mod daynight;
pub mod error;
pub mod http;
pub mod location;
pub mod models;
pub mod page;
pub mod service;
pub mod telemetry;

// Re-export core types for public API
pub use condition::{Condition, map_condition};
pub use config::ResolverConfig;
pub use daynight::{DayNight, DayNightResolver, DayNightService};
pub use error::ResolverError;
pub use http::{CachingFetcher, FetchError};
pub use location::{LocationAcquirer, LocationProvider, QueryStatus};
pub use models::{Coordinate, LocationFix, WeatherResult, WeatherStatus};
pub use service::WeatherResolutionService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
