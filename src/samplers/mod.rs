//! Leaf collectors for the local machine
//!
//! Every sampler returns a best-effort reading. OS failures degrade to zero readings
//! and are logged, they never reach the caller as errors.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;

use async_trait::async_trait;

use crate::{CpuMetrics, DiskMetrics, MemoryMetrics, MetricSnapshot};

pub use cpu::CpuSampler;
pub use disk::DiskSampler;
pub use memory::MemorySampler;
pub use network::{NetworkSampler, SystemProbe};

/// A synchronous collector producing one reading per call.
pub trait Sampler: Send {
    type Reading;

    fn sample(&mut self) -> Self::Reading;
}

/// Outbound reachability check used by the network sampler.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// `true` if `target` could be reached. Implementations must bound their runtime.
    async fn probe(&self, target: &str) -> bool;
}

/// All samplers needed to build a [`MetricSnapshot`].
pub struct SamplerSet {
    pub cpu: Box<dyn Sampler<Reading = CpuMetrics>>,
    pub memory: Box<dyn Sampler<Reading = MemoryMetrics>>,
    pub disk: Box<dyn Sampler<Reading = DiskMetrics>>,
    pub network: NetworkSampler,
}

impl SamplerSet {
    /// Samplers backed by the real system.
    pub fn system() -> Self {
        Self {
            cpu: Box::new(CpuSampler::new()),
            memory: Box::new(MemorySampler::new()),
            disk: Box::new(DiskSampler::new()),
            network: NetworkSampler::new(std::sync::Arc::new(SystemProbe::default())),
        }
    }

    /// Takes one reading from every sampler and stamps all of them with `timestamp`.
    ///
    /// The network probe runs concurrently with the local readings.
    pub async fn snapshot(&mut self, timestamp: f64, probe_target: &str) -> MetricSnapshot {
        let Self {
            cpu,
            memory,
            disk,
            network,
        } = self;

        let local = async { (cpu.sample(), memory.sample(), disk.sample()) };
        let ((cpu, memory, disk), network) =
            tokio::join!(local, network.sample(probe_target, timestamp));

        MetricSnapshot {
            timestamp,
            memory,
            cpu,
            disk,
            network,
        }
    }
}

impl std::fmt::Debug for SamplerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerSet")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Samplers returning fixed readings, for tests and dry runs.
pub mod fixed {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub struct FixedSampler<R>(pub R);

    impl<R: Copy + Send> Sampler for FixedSampler<R> {
        type Reading = R;

        fn sample(&mut self) -> R {
            self.0
        }
    }

    /// Probe whose answer never changes.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedProbe(pub bool);

    #[async_trait]
    impl NetworkProbe for FixedProbe {
        async fn probe(&self, _target: &str) -> bool {
            self.0
        }
    }
}
