pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod devices;
pub mod samplers;
pub mod storage;
pub mod store;
pub mod util;

use serde::{Deserialize, Serialize};

/// One consistent reading of every tracked metric, taken at a single timestamp.
///
/// Field names of the nested readings are part of the peer wire format and must stay
/// snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Seconds since the unix epoch
    pub timestamp: f64,
    pub memory: MemoryMetrics,
    pub cpu: CpuMetrics,
    pub disk: DiskMetrics,
    pub network: NetworkMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage_percent: f64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_used_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskMetrics {
    /// Used share of the root volume
    pub used_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Normal,
    Down,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Normal => "normal",
            NetworkStatus::Down => "down",
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub status: NetworkStatus,
    /// Time of the last successful probe, 0 if none ever succeeded
    pub last_ok_timestamp: f64,
}
