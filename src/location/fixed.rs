use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::debug;

use super::{LocationEvent, LocationProvider, LocationRequest};
use crate::models::{Coordinate, LocationFix};

/// Reports a configured coordinate as the device location
#[derive(Debug, Clone)]
pub struct FixedLocationProvider {
    coordinate: Coordinate,
}

impl FixedLocationProvider {
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self { coordinate }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn request_one_update(&self, _request: &LocationRequest) -> BoxStream<'static, LocationEvent> {
        let event = if self.coordinate.is_valid() {
            LocationEvent::Update(LocationFix::now(self.coordinate))
        } else {
            LocationEvent::Failure(format!(
                "Configured coordinate out of range: {}",
                self.coordinate.format_coordinates()
            ))
        };
        stream::once(async move { event }).boxed()
    }

    fn cancel_updates(&self) {
        debug!("Fixed location provider has no outstanding updates");
    }
}
