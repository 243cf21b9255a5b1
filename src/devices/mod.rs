//! Monitored machines: the local agent plus any peers polled over HTTP

pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MetricSnapshot;
use crate::util::{get_default_port, to_unix};

pub use registry::DeviceRegistry;

/// Well-known id of the machine this agent runs on
pub const LOCAL_DEVICE_ID: &str = "local";

/// Seconds without a fresh snapshot after which device metrics count as stale
pub const STALE_AFTER_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    Unknown,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Local,
    #[default]
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub status: DeviceStatus,
    pub connection: ConnectionType,
}

impl Device {
    /// A remote peer reachable at `address:port`.
    pub fn remote(name: &str, hostname: &str, address: &str, port: u16) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            hostname: hostname.to_string(),
            address: address.to_string(),
            port,
            enabled: true,
            last_seen: None,
            status: DeviceStatus::Unknown,
            connection: ConnectionType::Remote,
        }
    }

    pub fn local(hostname: &str) -> Self {
        Self {
            id: LOCAL_DEVICE_ID.to_string(),
            name: hostname.to_string(),
            hostname: hostname.to_string(),
            address: "127.0.0.1".to_string(),
            port: get_default_port(),
            enabled: true,
            last_seen: None,
            status: DeviceStatus::Online,
            connection: ConnectionType::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self.connection == ConnectionType::Local
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.id, &self.name)
    }

    /// Base URL of the peer's HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Who a snapshot belongs to, as far as alerting is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub id: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// The most recent snapshot retrieved for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub device_id: String,
    pub device_name: String,
    pub hostname: String,
    pub snapshot: MetricSnapshot,
    pub received_at: DateTime<Utc>,
}

impl DeviceMetrics {
    /// Whether the snapshot is older than [`STALE_AFTER_SECS`] at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        to_unix(now) - to_unix(self.received_at) > STALE_AFTER_SECS
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }
}
