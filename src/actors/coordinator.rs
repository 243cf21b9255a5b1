//! SamplingCoordinator - samples the local machine on the configured interval
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → SamplerSet::snapshot → MetricStore::add_snapshot → AlertEngine::evaluate
//!     ↑
//!     └─── interval re-read from settings on every tick
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, instrument, trace};

use super::{LoopSlot, is_stopped};
use crate::MetricSnapshot;
use crate::alerts::AlertEngine;
use crate::config::SettingsProvider;
use crate::devices::DeviceIdentity;
use crate::samplers::SamplerSet;
use crate::store::SharedStore;
use crate::util::unix_now;

const NAME: &str = "sampling coordinator";

struct Inner {
    /// Locked for a whole tick, so ticks never overlap
    samplers: Mutex<SamplerSet>,
    store: SharedStore,
    engine: AlertEngine,
    settings: Arc<dyn SettingsProvider>,
    device: DeviceIdentity,
}

/// Drives local sampling. Cheap to clone; all clones control the same loop.
#[derive(Clone)]
pub struct SamplingCoordinator {
    inner: Arc<Inner>,
    slot: Arc<LoopSlot>,
}

impl std::fmt::Debug for SamplingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingCoordinator")
            .field("device", &self.inner.device)
            .field("running", &self.is_running())
            .finish()
    }
}

fn ticker(start: Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl SamplingCoordinator {
    pub fn new(
        samplers: SamplerSet,
        store: SharedStore,
        engine: AlertEngine,
        settings: Arc<dyn SettingsProvider>,
        device: DeviceIdentity,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                samplers: Mutex::new(samplers),
                store,
                engine,
                settings,
                device,
            }),
            slot: Arc::new(LoopSlot::default()),
        }
    }

    /// Starts the sampling loop; the first sample is taken immediately.
    /// Does nothing if the loop is already running.
    pub fn start(&self) -> bool {
        let inner = self.inner.clone();
        self.slot.start(NAME, move |stop_rx| run(inner, stop_rx))
    }

    /// Stops the loop. An in-flight sample is discarded.
    pub fn stop(&self) -> bool {
        self.slot.stop(NAME)
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Takes one sample right away, outside the timer.
    pub async fn sample_now(&self) -> MetricSnapshot {
        let (snapshot, _samplers) = self.inner.sample().await;
        self.inner.publish(&snapshot).await;
        snapshot
    }
}

impl Inner {
    /// Samples everything with a single timestamp. Holds the sampler lock until the
    /// returned guard is dropped.
    async fn sample(&self) -> (MetricSnapshot, tokio::sync::MutexGuard<'_, SamplerSet>) {
        let settings = self.settings.current();
        let mut samplers = self.samplers.lock().await;
        let snapshot = samplers
            .snapshot(unix_now(), &settings.network_probe_target)
            .await;
        (snapshot, samplers)
    }

    async fn publish(&self, snapshot: &MetricSnapshot) {
        let capacity = self.settings.current().series_capacity;
        {
            let mut store = self.store.write().await;
            if store.capacity() != capacity {
                debug!("series capacity changed to {capacity}");
                store.set_capacity(capacity);
            }
            store.add_snapshot(snapshot.clone());
        }

        self.engine
            .evaluate(&self.device, snapshot, snapshot.timestamp)
            .await;
    }

    #[instrument(skip_all)]
    async fn tick(&self, stop_rx: &watch::Receiver<bool>) {
        let (snapshot, _samplers) = self.sample().await;
        if is_stopped(stop_rx) {
            debug!("stopped while sampling, discarding snapshot");
            return;
        }

        trace!(
            "sampled cpu {:.1}% mem {:.1}% disk {:.1}% net {}",
            snapshot.cpu.usage_percent,
            snapshot.memory.used_percent,
            snapshot.disk.used_percent,
            snapshot.network.status
        );
        self.publish(&snapshot).await;
    }
}

async fn run(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut period = inner.settings.current().refresh_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("sampling every {}s", period.as_secs());

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            _ = ticker.tick() => {
                let configured = inner.settings.current().refresh_interval();
                if configured != period {
                    info!(
                        "refresh interval changed from {}s to {}s",
                        period.as_secs(),
                        configured.as_secs()
                    );
                    period = configured;
                    ticker = self::ticker(Instant::now() + period, period);
                }

                inner.tick(&stop_rx).await;
            }
        }
    }

    debug!("{NAME} loop exited");
}
