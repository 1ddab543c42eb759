use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{LocationEvent, LocationProvider, LocationRequest};
use crate::models::{Coordinate, LocationFix};

/// Approximates the device location by geolocating its public IP address.
///
/// Speaks the ip-api.com JSON format.
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLocationProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create IP geolocation HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn lookup(client: Client, url: String, timeout: Duration) -> Result<Coordinate> {
        let response = client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .context("IP geolocation request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("IP geolocation failed with status {status}"));
        }

        let body: IpLookupResponse = response
            .json()
            .await
            .context("Failed to parse IP geolocation response")?;

        if body.status != "success" {
            return Err(anyhow!(
                "IP geolocation unsuccessful: {}",
                body.message.unwrap_or(body.status)
            ));
        }

        let (Some(lat), Some(lon)) = (body.lat, body.lon) else {
            return Err(anyhow!("IP geolocation response has no coordinates"));
        };
        let coordinate = Coordinate::new(lat, lon);
        if !coordinate.is_valid() {
            return Err(anyhow!(
                "IP geolocation returned invalid coordinates: {}",
                coordinate.format_coordinates()
            ));
        }
        Ok(coordinate)
    }
}

impl LocationProvider for IpLocationProvider {
    fn request_one_update(&self, request: &LocationRequest) -> BoxStream<'static, LocationEvent> {
        let client = self.client.clone();
        let url = self.url.clone();
        let expiration = request.expiration;

        stream::once(async move {
            match Self::lookup(client, url, expiration).await {
                Ok(coordinate) => {
                    info!("Located device at {}", coordinate.format_coordinates());
                    LocationEvent::Update(LocationFix::now(coordinate))
                }
                Err(e) => LocationEvent::Failure(format!("{e:#}")),
            }
        })
        .boxed()
    }

    fn cancel_updates(&self) {
        // The lookup is owned by the returned stream and stops when it is dropped
        debug!("IP location updates cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn first_event(server: &MockServer) -> LocationEvent {
        let provider = IpLocationProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
        let request = LocationRequest::single_update(Duration::from_secs(5));
        provider
            .request_one_update(&request)
            .next()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "lat": 52.52,
                "lon": 13.405,
                "city": "Berlin"
            })))
            .mount(&server)
            .await;

        match first_event(&server).await {
            LocationEvent::Update(fix) => {
                assert_eq!(fix.coordinate, Coordinate::new(52.52, 13.405));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "reserved range"
            })))
            .mount(&server)
            .await;

        match first_event(&server).await {
            LocationEvent::Failure(reason) => assert!(reason.contains("reserved range")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        assert!(matches!(first_event(&server).await, LocationEvent::Failure(_)));
    }
}
