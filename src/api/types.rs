//! Wire types of the agent API
//!
//! These are shared between the server and the remote poller, so both ends always agree on
//! the format. Envelope keys are camelCase; the nested metric readings keep their
//! snake_case keys.

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertState, AlertStatus, AlertType};
use crate::config::Settings;
use crate::store::MetricSeries;
use crate::{CpuMetrics, DiskMetrics, MemoryMetrics, MetricSnapshot, NetworkMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
}

/// Whether an alert is currently firing, as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertItemStatus {
    Normal,
    Alerting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertItem {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub status: AlertItemStatus,
    /// Unix seconds, 0 when the alert is not active
    #[serde(default)]
    pub since_timestamp: f64,
    /// Unix seconds, 0 when no notification is pending
    #[serde(default)]
    pub next_sound_timestamp: f64,
}

impl From<&AlertStatus> for AlertItem {
    fn from(status: &AlertStatus) -> Self {
        let since = match status.state {
            AlertState::Alerting { since } => Some(since),
            _ => status.active_since,
        };

        Self {
            alert_type: status.alert_type,
            status: if status.is_active() {
                AlertItemStatus::Alerting
            } else {
                AlertItemStatus::Normal
            },
            since_timestamp: since.unwrap_or(0.0),
            next_sound_timestamp: status.next_notify_at.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsSummary {
    pub active: bool,
    pub items: Vec<AlertItem>,
}

/// Body of `GET /api/v1/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timestamp: f64,
    pub metrics: Metrics,
    pub alerts: AlertsSummary,
}

impl StatusResponse {
    pub fn new(snapshot: &MetricSnapshot, statuses: &[AlertStatus]) -> Self {
        let items = statuses.iter().map(AlertItem::from).collect::<Vec<_>>();
        Self {
            timestamp: snapshot.timestamp,
            metrics: Metrics {
                memory: snapshot.memory,
                cpu: snapshot.cpu,
                disk: snapshot.disk,
                network: snapshot.network,
            },
            alerts: AlertsSummary {
                active: items
                    .iter()
                    .any(|item| item.status == AlertItemStatus::Alerting),
                items,
            },
        }
    }

    /// The snapshot a peer reported
    pub fn into_snapshot(self) -> MetricSnapshot {
        MetricSnapshot {
            timestamp: self.timestamp,
            memory: self.metrics.memory,
            cpu: self.metrics.cpu,
            disk: self.metrics.disk,
            network: self.metrics.network,
        }
    }
}

/// Body of `GET /api/v1/series`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub timestamp: f64,
    pub series: MetricSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub disk_percent: f64,
}

/// Body of `GET /api/v1/config`. The token is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub refresh_interval_seconds: u64,
    pub thresholds: Thresholds,
    pub network_probe_target: String,
    pub port: u16,
}

impl From<&Settings> for ConfigResponse {
    fn from(settings: &Settings) -> Self {
        Self {
            refresh_interval_seconds: settings.refresh_interval_seconds,
            thresholds: Thresholds {
                memory_percent: settings.memory_threshold_percent,
                cpu_percent: settings.cpu_threshold_percent,
                disk_percent: settings.disk_threshold_percent,
            },
            network_probe_target: settings.network_probe_target.clone(),
            port: settings.http_server_port,
        }
    }
}
