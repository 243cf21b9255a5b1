use sysinfo::System;
use tracing::warn;

use super::Sampler;
use crate::MemoryMetrics;

#[derive(Debug)]
pub struct MemorySampler {
    sys: System,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for MemorySampler {
    type Reading = MemoryMetrics;

    fn sample(&mut self) -> MemoryMetrics {
        self.sys.refresh_memory();

        let total_bytes = self.sys.total_memory();
        let used_bytes = self.sys.used_memory();
        if total_bytes == 0 {
            warn!("total memory reported as 0, reporting empty reading");
            return MemoryMetrics::default();
        }

        MemoryMetrics {
            total_bytes,
            used_bytes,
            used_percent: used_percent(used_bytes, total_bytes),
            // not exposed by sysinfo
            compressed_bytes: None,
            swap_used_bytes: (self.sys.total_swap() > 0).then(|| self.sys.used_swap()),
        }
    }
}

fn used_percent(used: u64, total: u64) -> f64 {
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
