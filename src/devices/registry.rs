use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use super::{Device, DeviceMetrics, DeviceStatus, LOCAL_DEVICE_ID};
use crate::MetricSnapshot;
use crate::storage::StateFile;
use crate::store::{DEFAULT_SERIES_CAPACITY, MetricSeries, MetricStore};

#[derive(Debug, Default)]
struct Inner {
    devices: Vec<Device>,
    metrics: HashMap<String, DeviceMetrics>,
    series: HashMap<String, MetricStore>,
    series_capacity: usize,
}

/// Known devices and the latest metrics retrieved for each.
///
/// The device list is persisted; metrics and series only live in memory.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<Inner>>,
    file: Option<StateFile>,
}

impl DeviceRegistry {
    /// Registry that is not persisted, containing only the local device.
    pub fn in_memory(local_hostname: &str) -> Self {
        Self::with_devices(Vec::new(), local_hostname, None)
    }

    /// Restores the device list from `file`. The local device is created on first start.
    pub fn load(file: StateFile, local_hostname: &str) -> Self {
        let devices = file.load_or_default::<Vec<Device>>();
        Self::with_devices(devices, local_hostname, Some(file))
    }

    fn with_devices(mut devices: Vec<Device>, local_hostname: &str, file: Option<StateFile>) -> Self {
        let mut created = false;
        if !devices.iter().any(|device| device.id == LOCAL_DEVICE_ID) {
            info!("registering local device {local_hostname}");
            devices.insert(0, Device::local(local_hostname));
            created = true;
        }

        if created && let Some(file) = &file {
            file.save_logged(&devices);
        }

        Self {
            inner: Arc::new(RwLock::new(Inner {
                devices,
                metrics: HashMap::new(),
                series: HashMap::new(),
                series_capacity: DEFAULT_SERIES_CAPACITY,
            })),
            file,
        }
    }

    async fn persist(&self, inner: &Inner) {
        if let Some(file) = &self.file {
            file.save_logged_async(&inner.devices).await;
        }
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.inner.read().await.devices.clone()
    }

    pub async fn device(&self, id: &str) -> Option<Device> {
        self.inner
            .read()
            .await
            .devices
            .iter()
            .find(|device| device.id == id)
            .cloned()
    }

    pub async fn local_device(&self) -> Option<Device> {
        self.device(LOCAL_DEVICE_ID).await
    }

    pub async fn enabled_devices(&self) -> Vec<Device> {
        self.inner
            .read()
            .await
            .devices
            .iter()
            .filter(|device| device.enabled)
            .cloned()
            .collect()
    }

    pub async fn online_devices(&self) -> Vec<Device> {
        self.inner
            .read()
            .await
            .devices
            .iter()
            .filter(|device| device.status == DeviceStatus::Online)
            .cloned()
            .collect()
    }

    /// Adds `device`, or updates the address of a known device with the same hostname.
    ///
    /// Returns the id of the stored device.
    pub async fn upsert_device(&self, device: Device) -> String {
        let mut inner = self.inner.write().await;
        let id = upsert(&mut inner.devices, device);
        self.persist(&inner).await;
        id
    }

    /// Records that an agent answered at `address:port`, adding it if unknown.
    pub async fn device_seen(&self, hostname: &str, address: &str, port: u16) -> String {
        let name = hostname.trim_end_matches(".local");
        let mut device = Device::remote(name, hostname, address, port);
        device.status = DeviceStatus::Online;
        device.last_seen = Some(Utc::now());
        self.upsert_device(device).await
    }

    /// Replaces the stored device with the same id.
    pub async fn update(&self, device: Device) -> bool {
        let mut inner = self.inner.write().await;
        let Some(existing) = inner.devices.iter_mut().find(|d| d.id == device.id) else {
            return false;
        };
        *existing = device;
        self.persist(&inner).await;
        true
    }

    /// Removes a device and its cached metrics. The local device cannot be removed.
    pub async fn remove(&self, id: &str) -> bool {
        if id == LOCAL_DEVICE_ID {
            warn!("refusing to remove the local device");
            return false;
        }

        let mut inner = self.inner.write().await;
        let before = inner.devices.len();
        inner.devices.retain(|device| device.id != id);
        if inner.devices.len() == before {
            return false;
        }
        inner.metrics.remove(id);
        inner.series.remove(id);
        self.persist(&inner).await;
        true
    }

    /// Flips the enabled flag and returns the new value.
    pub async fn toggle_enabled(&self, id: &str) -> Option<bool> {
        let mut inner = self.inner.write().await;
        let device = inner.devices.iter_mut().find(|device| device.id == id)?;
        device.enabled = !device.enabled;
        let enabled = device.enabled;
        self.persist(&inner).await;
        Some(enabled)
    }

    /// Marks the device announced under `hostname` as offline.
    pub async fn device_disconnected(&self, hostname: &str) {
        let mut inner = self.inner.write().await;
        if let Some(device) = inner
            .devices
            .iter_mut()
            .find(|device| device.hostname == hostname)
        {
            debug!("{hostname} disconnected");
            device.status = DeviceStatus::Offline;
            self.persist(&inner).await;
        }
    }

    /// Stores a retrieved snapshot and marks the device online.
    ///
    /// Returns `false` when the snapshot carries the same timestamp as the previous one, i.e.
    /// the device has not sampled since the last poll. Only `last_seen` and `received_at`
    /// are refreshed then; the series is left untouched.
    pub async fn record_success(
        &self,
        id: &str,
        snapshot: MetricSnapshot,
        at: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Inner {
            devices,
            metrics,
            series,
            series_capacity,
        } = &mut *inner;

        let Some(device) = devices.iter_mut().find(|device| device.id == id) else {
            debug!("dropping snapshot for unknown device {id}");
            return false;
        };

        let status_changed = device.status != DeviceStatus::Online;
        device.status = DeviceStatus::Online;
        device.last_seen = Some(at);

        let is_new_sample = metrics
            .get(id)
            .is_none_or(|previous| previous.snapshot.timestamp != snapshot.timestamp);

        if is_new_sample {
            series
                .entry(id.to_string())
                .or_insert_with(|| MetricStore::new(*series_capacity))
                .add_snapshot(snapshot.clone());

            metrics.insert(
                id.to_string(),
                DeviceMetrics {
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    hostname: device.hostname.clone(),
                    snapshot,
                    received_at: at,
                },
            );
        } else if let Some(previous) = metrics.get_mut(id) {
            trace!("{} has not sampled since the last poll", device.name);
            previous.received_at = at;
        }

        if status_changed {
            self.persist(&inner).await;
        }
        is_new_sample
    }

    /// Marks a failed poll. Previously retrieved metrics are kept.
    pub async fn record_failure(&self, id: &str, status: DeviceStatus) {
        let mut inner = self.inner.write().await;
        let Some(device) = inner.devices.iter_mut().find(|device| device.id == id) else {
            return;
        };
        if device.status != status {
            device.status = status;
            self.persist(&inner).await;
        }
    }

    pub async fn device_metrics(&self, id: &str) -> Option<DeviceMetrics> {
        self.inner.read().await.metrics.get(id).cloned()
    }

    pub async fn all_metrics(&self) -> Vec<DeviceMetrics> {
        self.inner.read().await.metrics.values().cloned().collect()
    }

    pub async fn device_series(&self, id: &str, points: Option<usize>) -> MetricSeries {
        self.inner
            .read()
            .await
            .series
            .get(id)
            .map(|store| store.series(points))
            .unwrap_or_default()
    }

    pub async fn set_series_capacity(&self, capacity: usize) {
        let mut inner = self.inner.write().await;
        inner.series_capacity = capacity;
        for store in inner.series.values_mut() {
            store.set_capacity(capacity);
        }
    }
}

fn upsert(devices: &mut Vec<Device>, device: Device) -> String {
    if let Some(existing) = devices
        .iter_mut()
        .find(|existing| existing.id == device.id || existing.hostname == device.hostname)
    {
        if existing.is_local() {
            return existing.id.clone();
        }
        existing.address = device.address;
        existing.port = device.port;
        if device.last_seen.is_some() {
            existing.last_seen = device.last_seen;
            existing.status = device.status;
        }
        return existing.id.clone();
    }

    info!("new device {} at {}", device.hostname, device.base_url());
    let id = device.id.clone();
    devices.push(device);
    id
}
