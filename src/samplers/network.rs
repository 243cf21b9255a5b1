use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::NetworkProbe;
use crate::config::GATEWAY_TARGET;
use crate::{NetworkMetrics, NetworkStatus};

/// Raw failures needed before the network is reported as down
pub const FAILURES_BEFORE_DOWN: u32 = 2;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Well-known public resolver used to check that a default route exists
const ROUTE_CHECK_ADDR: &str = "1.1.1.1:53";

const PROBE_PORTS: [u16; 2] = [80, 443];

/// Probes reachability with plain sockets.
///
/// `"gateway"` checks that the OS has a route to the internet; any other target is a host
/// that must accept a TCP connection on port 80 or 443.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl SystemProbe {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn route_check(&self) -> bool {
        let check = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(ROUTE_CHECK_ADDR).await
        };

        match timeout(self.timeout, check).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("route check failed: {e}");
                false
            }
            Err(_) => {
                debug!("route check timed out");
                false
            }
        }
    }

    async fn tcp_check(&self, host: &str) -> bool {
        for port in PROBE_PORTS {
            match timeout(self.timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!("{host}:{port} unreachable: {e}"),
                Err(_) => debug!("{host}:{port} timed out"),
            }
        }
        false
    }
}

#[async_trait]
impl NetworkProbe for SystemProbe {
    #[instrument(skip(self))]
    async fn probe(&self, target: &str) -> bool {
        if target == GATEWAY_TARGET {
            self.route_check().await
        } else {
            self.tcp_check(target).await
        }
    }
}

/// Network reachability with failure debouncing.
pub struct NetworkSampler {
    probe: Arc<dyn NetworkProbe>,
    consecutive_failures: u32,
    last_ok: f64,
}

impl NetworkSampler {
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        Self {
            probe,
            consecutive_failures: 0,
            last_ok: 0.0,
        }
    }

    /// Probes `target` once. A single failure still reports `normal`; only
    /// [`FAILURES_BEFORE_DOWN`] failures in a row report `down`.
    pub async fn sample(&mut self, target: &str, now: f64) -> NetworkMetrics {
        if self.probe.probe(target).await {
            self.consecutive_failures = 0;
            self.last_ok = now;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            debug!(
                "network probe to {target} failed ({} in a row)",
                self.consecutive_failures
            );
        }

        let status = if self.consecutive_failures >= FAILURES_BEFORE_DOWN {
            NetworkStatus::Down
        } else {
            NetworkStatus::Normal
        };

        NetworkMetrics {
            status,
            last_ok_timestamp: self.last_ok,
        }
    }
}

impl std::fmt::Debug for NetworkSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSampler")
            .field("consecutive_failures", &self.consecutive_failures)
            .field("last_ok", &self.last_ok)
            .finish()
    }
}
