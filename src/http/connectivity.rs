use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Answers whether the network can currently be reached
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_network_available(&self) -> bool;
}

/// Probes connectivity by opening a TCP connection to a well-known address
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_network_available(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(address = %self.address, "Connectivity probe failed: {e}");
                false
            }
            Err(_) => {
                debug!(address = %self.address, "Connectivity probe timed out");
                false
            }
        }
    }
}

/// Connectivity with a switchable, fixed answer
#[derive(Debug)]
pub struct FixedConnectivity {
    online: AtomicBool,
}

impl FixedConnectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for FixedConnectivity {
    async fn is_network_available(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
