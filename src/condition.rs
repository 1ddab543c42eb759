//! Mapping from weather page icon classes to normalized condition identifiers

use serde::{Deserialize, Serialize};

use crate::daynight::DayNight;

/// Closed set of condition identifiers produced by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    PartlyCloudy,
    PartlyCloudyNight,
    MostlyCloudy,
    MostlyCloudyNight,
    Cloudy,
    ClearNight,
    MostlyClearNight,
    Sunny,
    MostlySunny,
    ScatteredShowers,
    ScatteredShowersNight,
    Rain,
    Windy,
    Snow,
    ScatteredThunderstorms,
    ScatteredThunderstormsNight,
    IsolatedThunderstorms,
    IsolatedThunderstormsNight,
    Thunderstorms,
    Foggy,
}

impl Condition {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartlyCloudy => "partly-cloudy",
            Self::PartlyCloudyNight => "partly-cloudy-night",
            Self::MostlyCloudy => "mostly-cloudy",
            Self::MostlyCloudyNight => "mostly-cloudy-night",
            Self::Cloudy => "cloudy",
            Self::ClearNight => "clear-night",
            Self::MostlyClearNight => "mostly-clear-night",
            Self::Sunny => "sunny",
            Self::MostlySunny => "mostly-sunny",
            Self::ScatteredShowers => "scattered-showers",
            Self::ScatteredShowersNight => "scattered-showers-night",
            Self::Rain => "rain",
            Self::Windy => "windy",
            Self::Snow => "snow",
            Self::ScatteredThunderstorms => "scattered-thunderstorms",
            Self::ScatteredThunderstormsNight => "scattered-thunderstorms-night",
            Self::IsolatedThunderstorms => "isolated-thunderstorms",
            Self::IsolatedThunderstormsNight => "isolated-thunderstorms-night",
            Self::Thunderstorms => "thunderstorms",
            Self::Foggy => "foggy",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table entry result: either fixed, or split on day/night
#[derive(Debug, Clone, Copy)]
enum Mapped {
    Fixed(Condition),
    DayNight { day: Condition, night: Condition },
}

impl Mapped {
    fn resolve(self, day_night: DayNight) -> Condition {
        match (self, day_night) {
            (Mapped::Fixed(condition), _) => condition,
            (Mapped::DayNight { day, .. }, DayNight::Day) => day,
            (Mapped::DayNight { night, .. }, DayNight::Night) => night,
        }
    }
}

const SCATTERED_SHOWERS: Mapped = Mapped::DayNight {
    day: Condition::ScatteredShowers,
    night: Condition::ScatteredShowersNight,
};
const SCATTERED_THUNDERSTORMS: Mapped = Mapped::DayNight {
    day: Condition::ScatteredThunderstorms,
    night: Condition::ScatteredThunderstormsNight,
};
const ISOLATED_THUNDERSTORMS: Mapped = Mapped::DayNight {
    day: Condition::IsolatedThunderstorms,
    night: Condition::IsolatedThunderstormsNight,
};
const FALLBACK: Mapped = Mapped::DayNight {
    day: Condition::MostlyCloudy,
    night: Condition::MostlyCloudyNight,
};

// Order matters: the first entry found in the class string wins.
const ICON_TABLE: &[(&str, Mapped)] = &[
    ("icon-partly-cloudy", Mapped::Fixed(Condition::PartlyCloudy)),
    ("icon-partly-cloudy-night", Mapped::Fixed(Condition::PartlyCloudyNight)),
    ("icon-mostly-cloudy", Mapped::Fixed(Condition::MostlyCloudy)),
    ("icon-mostly-cloudy-night", Mapped::Fixed(Condition::MostlyCloudyNight)),
    ("icon-cloudy", Mapped::Fixed(Condition::Cloudy)),
    ("icon-clear-night", Mapped::Fixed(Condition::ClearNight)),
    ("icon-mostly-clear-night", Mapped::Fixed(Condition::MostlyClearNight)),
    ("icon-sunny", Mapped::Fixed(Condition::Sunny)),
    ("icon-mostly-sunny", Mapped::Fixed(Condition::MostlySunny)),
    ("icon-scattered-showers", SCATTERED_SHOWERS),
    ("icon-isolated-showers", Mapped::Fixed(Condition::Rain)),
    ("icon-showers", Mapped::Fixed(Condition::Rain)),
    ("icon-rain", Mapped::Fixed(Condition::Rain)),
    ("icon-wind", Mapped::Fixed(Condition::Windy)),
    ("icon-snow", Mapped::Fixed(Condition::Snow)),
    ("icon-rain-snow", Mapped::Fixed(Condition::Snow)),
    ("icon-scattered-snow", Mapped::Fixed(Condition::Snow)),
    ("icon-isolated-snow", Mapped::Fixed(Condition::Snow)),
    ("icon-freezing-drizzle", Mapped::Fixed(Condition::Snow)),
    ("icon-scattered-thunderstorms", SCATTERED_THUNDERSTORMS),
    ("icon-isolated-thunderstorms", ISOLATED_THUNDERSTORMS),
    ("icon-thunderstorms", Mapped::Fixed(Condition::Thunderstorms)),
    ("icon-foggy", Mapped::Fixed(Condition::Foggy)),
];

/// Map an icon class string and the day/night state to a condition.
///
/// A table pattern only matches when it is immediately followed by
/// whitespace inside `raw_token`. Unknown tokens map to mostly-cloudy.
#[must_use]
pub fn map_condition(raw_token: &str, day_night: DayNight) -> Condition {
    let mapped = ICON_TABLE
        .iter()
        .find(|(pattern, _)| contains_bounded(raw_token, pattern))
        .map_or(FALLBACK, |(_, mapped)| *mapped);

    let condition = mapped.resolve(day_night);
    tracing::debug!(raw_token, ?day_night, %condition, "Mapped weather condition");
    condition
}

fn contains_bounded(haystack: &str, pattern: &str) -> bool {
    haystack.match_indices(pattern).any(|(start, _)| {
        haystack[start + pattern.len()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace)
    })
}
