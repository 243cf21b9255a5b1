//! DeviceDiscovery - finds agents on the local network by well-known host names
//!
//! Every 15s each configured prefix is probed as `http://<prefix>.local:17890/api/v1/status`.
//! Anything that answers like an agent (200, or 503 before its first sample) is handed to
//! [`DeviceRegistry::device_seen`], the same upsert path used for manually added devices.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace};

use super::{LoopSlot, is_stopped};
use crate::api::STATUS_PATH;
use crate::config::SettingsProvider;
use crate::devices::DeviceRegistry;
use crate::util::get_default_port;

pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(15);
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

const NAME: &str = "device discovery";

/// Host name probed for a configured entry. Bare prefixes get `.local` appended; anything
/// that already looks like a host or address is used as is.
pub fn candidate_host(entry: &str) -> String {
    let entry = entry.trim();
    if entry.contains('.') || entry.contains(':') {
        entry.to_string()
    } else {
        format!("{entry}.local")
    }
}

struct Inner {
    registry: DeviceRegistry,
    settings: Arc<dyn SettingsProvider>,
    client: reqwest::Client,
    port: u16,
}

#[derive(Clone)]
pub struct DeviceDiscovery {
    inner: Arc<Inner>,
    slot: Arc<LoopSlot>,
}

impl std::fmt::Debug for DeviceDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDiscovery")
            .field("port", &self.inner.port)
            .field("running", &self.is_running())
            .finish()
    }
}

impl DeviceDiscovery {
    pub fn new(
        registry: DeviceRegistry,
        settings: Arc<dyn SettingsProvider>,
    ) -> anyhow::Result<Self> {
        Self::with_port(registry, settings, get_default_port())
    }

    /// Discovery probing `port` instead of the default agent port.
    pub fn with_port(
        registry: DeviceRegistry,
        settings: Arc<dyn SettingsProvider>,
        port: u16,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                settings,
                client,
                port,
            }),
            slot: Arc::new(LoopSlot::default()),
        })
    }

    pub fn start(&self) -> bool {
        let inner = self.inner.clone();
        self.slot.start(NAME, move |stop_rx| run(inner, stop_rx))
    }

    pub fn stop(&self) -> bool {
        self.slot.stop(NAME)
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Probes every configured host once and returns the ids of devices that answered.
    pub async fn discover_once(&self) -> Vec<String> {
        self.inner.discover(None).await
    }
}

impl Inner {
    async fn discover(&self, stop_rx: Option<&watch::Receiver<bool>>) -> Vec<String> {
        let hosts = self
            .settings
            .current()
            .discovery_hostnames
            .iter()
            .map(|entry| candidate_host(entry))
            .collect::<Vec<_>>();

        let answered = join_all(hosts.iter().map(|host| self.probe(host))).await;
        if stop_rx.is_some_and(is_stopped) {
            return Vec::new();
        }

        let mut found = Vec::new();
        for host in hosts
            .iter()
            .zip(answered)
            .filter_map(|(host, answered)| answered.then_some(host))
        {
            found.push(self.registry.device_seen(host, host, self.port).await);
        }

        if !found.is_empty() {
            info!("discovered {} agents", found.len());
        }
        found
    }

    #[instrument(skip(self))]
    async fn probe(&self, host: &str) -> bool {
        let url = format!("http://{host}:{}{STATUS_PATH}", self.port);
        let token = self.settings.current().http_server_token;

        match self.client.get(&url).bearer_auth(token).send().await {
            Ok(response) => {
                let status = response.status();
                trace!("{host} answered {status}");
                matches!(status, StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE)
            }
            Err(e) => {
                debug!("{host} not reachable: {e}");
                false
            }
        }
    }
}

async fn run(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval(DISCOVERY_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            _ = ticker.tick() => {
                inner.discover(Some(&stop_rx)).await;
            }
        }
    }

    debug!("{NAME} loop exited");
}
