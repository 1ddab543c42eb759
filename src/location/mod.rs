//! Location acquisition
//!
//! Providers deliver raw fixes as a stream of [`LocationEvent`]s;
//! [`LocationAcquirer`] turns one request into a bounded-time query cycle.

use std::time::Duration;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::LocationFix;

pub mod acquirer;
pub mod fixed;
pub mod ip;

pub use acquirer::{LocationAcquirer, QueryStatus};
pub use fixed::FixedLocationProvider;
pub use ip::IpLocationProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    HighAccuracy,
    BalancedPowerAccuracy,
    LowPower,
    NoPower,
}

/// Parameters of a location update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    pub priority: Priority,
    pub interval: Duration,
    pub fastest_interval: Duration,
    pub num_updates: u32,
    /// Providers stop delivering after this long
    pub expiration: Duration,
}

impl LocationRequest {
    /// A request for exactly one fix within `timeout`
    #[must_use]
    pub fn single_update(timeout: Duration) -> Self {
        Self {
            priority: Priority::BalancedPowerAccuracy,
            interval: Duration::from_millis(4000),
            fastest_interval: Duration::from_millis(2000),
            num_updates: 1,
            expiration: timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Update(LocationFix),
    Failure(String),
    Cancelled,
}

/// Source of location fixes
pub trait LocationProvider: Send + Sync {
    /// Register for updates. The stream ends or goes quiet after the
    /// request's update count or expiration is reached.
    fn request_one_update(&self, request: &LocationRequest) -> BoxStream<'static, LocationEvent>;

    /// Deregister any outstanding updates
    fn cancel_updates(&self);
}
