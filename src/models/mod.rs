//! Data models for the weather resolver
//!
//! - Location: coordinates and location fixes
//! - Weather: scraped page fields and the caller-facing result

pub mod location;
pub mod weather;

pub use location::{Coordinate, LocationFix};
pub use weather::{RawWeatherFields, WeatherResult, WeatherStatus, fahrenheit_to_celsius};
