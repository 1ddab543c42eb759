//! Weather fields extracted from a page and the result handed to callers

use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Raw values scraped from the weather page before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWeatherFields {
    /// Temperature as printed on the page, in Fahrenheit
    pub temperature_fahrenheit: i32,
    /// Class attribute of the condition icon, e.g. `"icon-sunny weather-icon"`
    pub raw_condition_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherStatus {
    Success,
    Error,
}

/// Outcome of one weather resolution.
///
/// An `Error` result never carries data: the condition is empty and both
/// temperatures are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherResult {
    pub status: WeatherStatus,
    /// Normalized condition identifier, empty on error
    pub condition: String,
    pub temperature_celsius: i32,
    pub temperature_fahrenheit: i32,
}

impl WeatherResult {
    #[must_use]
    pub fn success(condition: Condition, temperature_fahrenheit: i32) -> Self {
        Self {
            status: WeatherStatus::Success,
            condition: condition.as_str().to_string(),
            temperature_celsius: fahrenheit_to_celsius(temperature_fahrenheit),
            temperature_fahrenheit,
        }
    }

    #[must_use]
    pub fn error() -> Self {
        Self {
            status: WeatherStatus::Error,
            condition: String::new(),
            temperature_celsius: 0,
            temperature_fahrenheit: 0,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == WeatherStatus::Success
    }
}

/// Convert Fahrenheit to whole degrees Celsius, rounding half away from zero.
///
/// An integer Fahrenheit value never lands exactly on a .5 Celsius boundary,
/// so the tie rule does not affect any real input.
#[must_use]
pub fn fahrenheit_to_celsius(fahrenheit: i32) -> i32 {
    let celsius = (f64::from(fahrenheit) - 32.0) * 5.0 / 9.0;
    celsius.round() as i32
}
