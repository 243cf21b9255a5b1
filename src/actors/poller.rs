//! RemotePoller - polls every enabled device's status on a fixed cadence
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick (5s) → for each enabled device, in parallel:
//!     local  → latest snapshot from the MetricStore → DeviceRegistry
//!     remote → GET /api/v1/status (3s timeout) → DeviceRegistry + AlertEngine
//! ```
//!
//! A failed poll marks the device offline (or error on 401) but keeps the last snapshot.
//! A snapshot the peer already reported is not evaluated or added to the series again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use reqwest::StatusCode;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use super::{LoopSlot, is_stopped};
use crate::alerts::AlertEngine;
use crate::api::{STATUS_PATH, StatusResponse};
use crate::config::SettingsProvider;
use crate::devices::{Device, DeviceRegistry, DeviceStatus};
use crate::store::SharedStore;
use crate::util::unix_now;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(3);

const NAME: &str = "remote poller";

/// Why polling a peer failed
#[derive(Debug)]
pub enum PollError {
    /// The peer rejected our token
    Unauthorized,
    /// Any other non-success status
    Status(StatusCode),
    /// Connection, timeout or decoding failure
    Request(reqwest::Error),
}

impl PollError {
    /// Device status a failure of this kind results in
    pub fn device_status(&self) -> DeviceStatus {
        match self {
            PollError::Unauthorized => DeviceStatus::Error,
            _ => DeviceStatus::Offline,
        }
    }
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Unauthorized => f.write_str("token rejected"),
            PollError::Status(status) => write!(f, "unexpected status {status}"),
            PollError::Request(e) => write!(f, "request failed: {e}"),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        PollError::Request(e)
    }
}

struct Inner {
    registry: DeviceRegistry,
    engine: AlertEngine,
    store: SharedStore,
    settings: Arc<dyn SettingsProvider>,
    /// HTTP client (reused across requests)
    client: reqwest::Client,
}

#[derive(Clone)]
pub struct RemotePoller {
    inner: Arc<Inner>,
    slot: Arc<LoopSlot>,
}

impl fmt::Debug for RemotePoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePoller")
            .field("running", &self.is_running())
            .finish()
    }
}

impl RemotePoller {
    pub fn new(
        registry: DeviceRegistry,
        engine: AlertEngine,
        store: SharedStore,
        settings: Arc<dyn SettingsProvider>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(POLL_TIMEOUT).build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                engine,
                store,
                settings,
                client,
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

    /// Polls every enabled device once.
    pub async fn poll_all(&self) {
        self.inner.poll_all(None).await;
    }

    /// Fetches one peer's status without touching any state.
    pub async fn fetch_status(&self, device: &Device) -> Result<StatusResponse, PollError> {
        self.inner.fetch_status(device).await
    }
}

impl Inner {
    async fn poll_all(&self, stop_rx: Option<&watch::Receiver<bool>>) {
        self.registry
            .set_series_capacity(self.settings.current().series_capacity)
            .await;

        let devices = self.registry.enabled_devices().await;
        trace!("polling {} devices", devices.len());

        join_all(
            devices
                .iter()
                .map(|device| self.poll_device(device, stop_rx)),
        )
        .await;
    }

    #[instrument(skip(self, device, stop_rx), fields(device = %device.name))]
    async fn poll_device(&self, device: &Device, stop_rx: Option<&watch::Receiver<bool>>) {
        if device.is_local() {
            let latest = self.store.read().await.latest_snapshot().cloned();
            if let Some(snapshot) = latest {
                self.registry
                    .record_success(&device.id, snapshot, Utc::now())
                    .await;
            }
            return;
        }

        let result = self.fetch_status(device).await;
        if stop_rx.is_some_and(is_stopped) {
            debug!("stopped while polling, discarding result");
            return;
        }

        match result {
            Ok(response) => {
                let snapshot = response.into_snapshot();
                let is_new_sample = self
                    .registry
                    .record_success(&device.id, snapshot.clone(), Utc::now())
                    .await;
                if is_new_sample {
                    self.engine
                        .evaluate(&device.identity(), &snapshot, unix_now())
                        .await;
                }
            }
            Err(e) => {
                warn!("failed to poll {} at {}: {e}", device.name, device.base_url());
                self.registry
                    .record_failure(&device.id, e.device_status())
                    .await;
            }
        }
    }

    async fn fetch_status(&self, device: &Device) -> Result<StatusResponse, PollError> {
        let token = self.settings.current().http_server_token;
        let url = format!("{}{STATUS_PATH}", device.base_url());

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<StatusResponse>().await?),
            StatusCode::UNAUTHORIZED => Err(PollError::Unauthorized),
            status => Err(PollError::Status(status)),
        }
    }
}

async fn run(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            _ = ticker.tick() => {
                inner.poll_all(Some(&stop_rx)).await;
            }
        }
    }

    debug!("{NAME} loop exited");
}
