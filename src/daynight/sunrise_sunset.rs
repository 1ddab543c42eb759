use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{DayNight, DayNightService};

/// Client for the sunrise-sunset.org lookup service
pub struct SunriseSunsetApi {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    results: Option<ApiResults>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiResults {
    sunrise: DateTime<Utc>,
    sunset: DateTime<Utc>,
}

impl SunriseSunsetApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create sunrise-sunset HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_sun_times(
        &self,
        latitude: &str,
        longitude: &str,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let url = format!(
            "{}/json?lat={}&lng={}&date={}&formatted=0",
            self.base_url,
            latitude,
            longitude,
            date.format("%Y-%m-%d")
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Sunrise-sunset request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Sunrise-sunset request failed with status {status}"));
        }

        let body: ApiResponse = response
            .json()
            .await
            .context("Failed to parse sunrise-sunset response")?;

        if body.status != "OK" {
            return Err(anyhow!("Sunrise-sunset returned status {}", body.status));
        }

        let results = body
            .results
            .ok_or_else(|| anyhow!("Sunrise-sunset response has no results"))?;

        // Polar day and night come back as timestamps at the Unix epoch
        if results.sunrise.timestamp() <= 1 || results.sunset.timestamp() <= 1 {
            return Err(anyhow!("Sun does not rise or set on this date"));
        }

        Ok((results.sunrise, results.sunset))
    }
}

#[async_trait]
impl DayNightService for SunriseSunsetApi {
    async fn query(
        &self,
        latitude: &str,
        longitude: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<DayNight> {
        match self.fetch_sun_times(latitude, longitude, date).await {
            Ok((sunrise, sunset)) if now >= sunrise && now < sunset => Some(DayNight::Day),
            Ok(_) => Some(DayNight::Night),
            Err(e) => {
                debug!("Day/night lookup unavailable: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daynight::{DayNightResolver, LocalZone};
    use crate::models::Coordinate;
    use chrono::TimeZone;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn midsummer() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap()
    }

    fn api(server: &MockServer) -> SunriseSunsetApi {
        SunriseSunsetApi::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    async fn mount(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/json"))
            .and(query_param("lat", "52.5"))
            .and(query_param("lng", "13.4"))
            .and(query_param("date", "2024-06-21"))
            .and(query_param("formatted", "0"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_day_between_sunrise_and_sunset() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "sunrise": "2024-06-21T02:43:00+00:00",
                    "sunset": "2024-06-21T19:33:00+00:00"
                },
                "status": "OK"
            })),
        )
        .await;

        assert_eq!(
            api(&server).query("52.5", "13.4", midsummer(), noon()).await,
            Some(DayNight::Day)
        );
    }

    #[tokio::test]
    async fn test_night_after_sunset() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "sunrise": "2024-06-21T02:43:00+00:00",
                    "sunset": "2024-06-21T11:00:00+00:00"
                },
                "status": "OK"
            })),
        )
        .await;

        assert_eq!(
            api(&server).query("52.5", "13.4", midsummer(), noon()).await,
            Some(DayNight::Night)
        );
    }

    #[tokio::test]
    async fn test_unknown_on_bad_status_field() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "INVALID_REQUEST"
            })),
        )
        .await;

        assert_eq!(api(&server).query("52.5", "13.4", midsummer(), noon()).await, None);
    }

    #[tokio::test]
    async fn test_unknown_on_server_error() {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(503)).await;

        assert_eq!(api(&server).query("52.5", "13.4", midsummer(), noon()).await, None);
    }

    #[tokio::test]
    async fn test_unknown_for_polar_placeholder() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "sunrise": "1970-01-01T00:00:01+00:00",
                    "sunset": "1970-01-01T00:00:01+00:00"
                },
                "status": "OK"
            })),
        )
        .await;

        assert_eq!(api(&server).query("52.5", "13.4", midsummer(), noon()).await, None);
    }

    /// Mounts real San Francisco times for June 21 only
    async fn mount_san_francisco(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/json"))
            .and(query_param("lat", "37.7"))
            .and(query_param("lng", "-122.4"))
            .and(query_param("date", "2024-06-21"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "sunrise": "2024-06-21T12:48:00+00:00",
                    "sunset": "2024-06-22T03:35:00+00:00"
                },
                "status": "OK"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_evening_west_of_utc_asks_for_local_date() {
        let server = MockServer::start().await;
        mount_san_francisco(&server).await;

        // 20:00 PDT on June 21 is already June 22 in UTC
        let evening = Utc.with_ymd_and_hms(2024, 6, 22, 3, 0, 0).unwrap();
        assert_eq!(
            api(&server).query("37.7", "-122.4", midsummer(), evening).await,
            Some(DayNight::Day)
        );
    }

    #[tokio::test]
    async fn test_resolver_passes_local_date_to_service() {
        let server = MockServer::start().await;
        mount_san_francisco(&server).await;

        let resolver = DayNightResolver::new(
            Arc::new(api(&server)),
            LocalZone::Named(chrono_tz::America::Los_Angeles),
        );
        let evening = Utc.with_ymd_and_hms(2024, 6, 22, 3, 0, 0).unwrap();
        assert_eq!(
            resolver.resolve(Coordinate::new(37.7, -122.4), evening).await,
            DayNight::Day
        );
    }
}
