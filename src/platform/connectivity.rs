use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkState {
    pub is_connected: bool,
    pub probe_latency_ms: Option<u64>,
}

impl NetworkState {
    pub fn connected(probe_latency_ms: Option<u64>) -> Self {
        Self {
            is_connected: true,
            probe_latency_ms,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            probe_latency_ms: None,
        }
    }
}

/// Authoritative source for the gateway's connectivity preflight.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn fetch(&self) -> NetworkState;
}

/// Reports connectivity by opening a TCP connection to the backend host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn for_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::validation(format!("Base URL has no host: {}", base_url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::validation(format!("Base URL has no port: {}", base_url)))?;

        Ok(Self::new(host, port, timeout))
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn fetch(&self) -> NetworkState {
        let started = Instant::now();
        let target = (self.host.as_str(), self.port);

        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                let latency = started.elapsed().as_millis() as u64;
                debug!("Reached {}:{} in {}ms", self.host, self.port, latency);
                NetworkState::connected(Some(latency))
            }
            Ok(Err(e)) => {
                debug!("Connectivity probe to {}:{} failed: {}", self.host, self.port, e);
                NetworkState::disconnected()
            }
            Err(_) => {
                debug!("Connectivity probe to {}:{} timed out", self.host, self.port);
                NetworkState::disconnected()
            }
        }
    }
}

/// Probe whose answer is set by the caller; used for offline mode and tests.
#[derive(Debug)]
pub struct ManualProbe {
    connected: AtomicBool,
}

impl ManualProbe {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn fetch(&self) -> NetworkState {
        if self.connected.load(Ordering::SeqCst) {
            NetworkState::connected(None)
        } else {
            NetworkState::disconnected()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(probe.fetch().await.is_connected);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert_eq!(probe.fetch().await, NetworkState::disconnected());
    }

    #[test]
    fn test_probe_from_base_url() {
        let probe = TcpProbe::for_base_url("https://api.example.com/api", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.host, "api.example.com");
        assert_eq!(probe.port, 443);

        let probe = TcpProbe::for_base_url("http://10.0.0.2:5002/api", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.port, 5002);
    }

    #[tokio::test]
    async fn test_manual_probe_toggle() {
        let probe = ManualProbe::new(false);
        assert!(!probe.fetch().await.is_connected);

        probe.set_connected(true);
        assert!(probe.fetch().await.is_connected);
    }
}
