//! Field extraction from the weather.com "today" page

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::models::RawWeatherFields;

const TEMPERATURE_SELECTOR: &str = "div[class=today_nowcard-temp] span";
const CONDITION_ICON_SELECTOR: &str =
    r#"div[class="today_nowcard-section today_nowcard-condition"] div icon"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Invalid selector {selector}: {reason}")]
    InvalidSelector {
        selector: &'static str,
        reason: String,
    },

    #[error("No element matches {0}")]
    MissingElement(&'static str),

    #[error("Element matching {0} is empty")]
    Empty(&'static str),

    #[error("Temperature is not a number: {0:?}")]
    InvalidTemperature(String),
}

/// Extract the current temperature and condition icon class from a page
pub fn extract_fields(body: &str) -> Result<RawWeatherFields, ExtractionError> {
    let document = Html::parse_document(body);

    let temperature = select_first(&document, TEMPERATURE_SELECTOR)?
        .text()
        .collect::<String>()
        .replace('°', "");
    let temperature = temperature.trim();
    if temperature.is_empty() {
        return Err(ExtractionError::Empty(TEMPERATURE_SELECTOR));
    }
    let temperature_fahrenheit = temperature
        .parse::<i32>()
        .map_err(|_| ExtractionError::InvalidTemperature(temperature.to_string()))?;

    let icon = select_first(&document, CONDITION_ICON_SELECTOR)?;
    let raw_condition_token = icon.value().attr("class").unwrap_or_default().trim();
    if raw_condition_token.is_empty() {
        return Err(ExtractionError::Empty(CONDITION_ICON_SELECTOR));
    }

    Ok(RawWeatherFields {
        temperature_fahrenheit,
        raw_condition_token: raw_condition_token.to_string(),
    })
}

fn select_first<'a>(
    document: &'a Html,
    selector: &'static str,
) -> Result<ElementRef<'a>, ExtractionError> {
    let parsed = Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector,
        reason: e.to_string(),
    })?;
    document
        .select(&parsed)
        .next()
        .ok_or(ExtractionError::MissingElement(selector))
}

#[cfg(test)]
pub(crate) fn sample_page(temperature: &str, icon_class: &str) -> String {
    format!(
        r#"<html><body>
        <div class="today_nowcard-temp"><span>{temperature}</span></div>
        <div class="today_nowcard-section today_nowcard-condition">
          <div class="today_nowcard-icon"><icon class="{icon_class}"></icon></div>
        </div>
        </body></html>"#
    )
}
