//! Test helpers shared by the integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use hostmon::{
    CpuMetrics, DiskMetrics, MemoryMetrics, MetricSnapshot, NetworkMetrics, NetworkStatus,
    alerts::{AlertEngine, AlertHistory, SilenceManager, notifier::CountingNotifier},
    api::{ApiState, loopback_config, spawn_api_server},
    config::{Settings, SettingsProvider, SettingsStore},
    devices::LOCAL_DEVICE_ID,
    samplers::{
        NetworkSampler, SamplerSet,
        fixed::{FixedProbe, FixedSampler},
    },
    store::{MetricStore, SharedStore},
};

pub const TOKEN: &str = "test-token";

/// Default settings with a known token
pub fn test_settings() -> Settings {
    Settings {
        http_server_token: TOKEN.to_string(),
        ..Settings::default()
    }
}

pub fn snapshot(
    timestamp: f64,
    memory_percent: f64,
    cpu_percent: f64,
    disk_percent: f64,
    network: NetworkStatus,
) -> MetricSnapshot {
    MetricSnapshot {
        timestamp,
        memory: MemoryMetrics {
            total_bytes: 16 * 1024 * 1024 * 1024,
            used_bytes: (16.0 * 1024.0 * 1024.0 * 1024.0 * memory_percent / 100.0) as u64,
            used_percent: memory_percent,
            compressed_bytes: None,
            swap_used_bytes: None,
        },
        cpu: CpuMetrics {
            usage_percent: cpu_percent,
            load1: 1.0,
            load5: 0.8,
            load15: 0.5,
        },
        disk: DiskMetrics {
            used_percent: disk_percent,
        },
        network: NetworkMetrics {
            status: network,
            last_ok_timestamp: if network == NetworkStatus::Normal {
                timestamp
            } else {
                0.0
            },
        },
    }
}

/// A healthy snapshot except for memory
pub fn memory_snapshot(timestamp: f64, memory_percent: f64) -> MetricSnapshot {
    snapshot(timestamp, memory_percent, 10.0, 40.0, NetworkStatus::Normal)
}

/// Samplers that always report the given readings
pub fn fixed_samplers(memory_percent: f64, network_up: bool) -> SamplerSet {
    SamplerSet {
        cpu: Box::new(FixedSampler(CpuMetrics {
            usage_percent: 12.5,
            ..Default::default()
        })),
        memory: Box::new(FixedSampler(MemoryMetrics {
            total_bytes: 1000,
            used_bytes: (memory_percent * 10.0) as u64,
            used_percent: memory_percent,
            ..Default::default()
        })),
        disk: Box::new(FixedSampler(DiskMetrics { used_percent: 55.0 })),
        network: NetworkSampler::new(Arc::new(FixedProbe(network_up))),
    }
}

/// Everything one agent needs, wired in memory.
pub struct TestAgent {
    pub settings: Arc<SettingsStore>,
    pub store: SharedStore,
    pub engine: AlertEngine,
    pub notifier: Arc<CountingNotifier>,
}

impl TestAgent {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(SettingsStore::in_memory(settings));
        let notifier = Arc::new(CountingNotifier::default());
        let engine = AlertEngine::new(
            AlertHistory::new(),
            SilenceManager::new(),
            notifier.clone(),
            settings.clone(),
        );

        Self {
            store: MetricStore::shared(settings.current().series_capacity),
            settings,
            engine,
            notifier,
        }
    }

    pub fn provider(&self) -> Arc<dyn SettingsProvider> {
        self.settings.clone()
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(
            self.store.clone(),
            self.engine.clone(),
            self.provider(),
            LOCAL_DEVICE_ID,
        )
    }

    /// Serves this agent's API on an ephemeral loopback port.
    pub async fn serve(&self) -> SocketAddr {
        spawn_api_server(loopback_config(), self.api_state())
            .await
            .expect("failed to start API server")
    }
}
