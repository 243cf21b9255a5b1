use std::path::Path;

use sysinfo::Disks;
use tracing::warn;

use super::Sampler;
use crate::DiskMetrics;

/// Used share of the root volume, falling back to the first listed disk.
#[derive(Debug)]
pub struct DiskSampler {
    disks: Disks,
}

impl DiskSampler {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for DiskSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for DiskSampler {
    type Reading = DiskMetrics;

    fn sample(&mut self) -> DiskMetrics {
        self.disks.refresh(true);

        let root = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .or_else(|| self.disks.iter().next());

        let Some(disk) = root else {
            warn!("no disks found");
            return DiskMetrics::default();
        };

        DiskMetrics {
            used_percent: used_percent(disk.total_space(), disk.available_space()),
        }
    }
}

fn used_percent(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
