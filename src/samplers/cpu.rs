use sysinfo::System;

use super::Sampler;
use crate::CpuMetrics;

/// Global CPU usage and load averages.
///
/// Usage is computed by sysinfo from the difference between two refreshes, so the same
/// [`System`] is kept across ticks. The very first reading is therefore 0.
#[derive(Debug)]
pub struct CpuSampler {
    sys: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for CpuSampler {
    type Reading = CpuMetrics;

    fn sample(&mut self) -> CpuMetrics {
        self.sys.refresh_cpu_usage();

        let usage = f64::from(self.sys.global_cpu_usage());
        let load = System::load_average();

        CpuMetrics {
            usage_percent: if usage.is_finite() {
                usage.clamp(0.0, 100.0)
            } else {
                0.0
            },
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
        }
    }
}
