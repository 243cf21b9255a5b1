//! Periodic background tasks
//!
//! Each task owns a ticker and runs on the tokio runtime until it is stopped:
//!
//! ```text
//!   SamplingCoordinator  every 5/10/30s  samplers → MetricStore → AlertEngine (local device)
//!   RemotePoller         every 5s        peers' /api/v1/status → DeviceRegistry → AlertEngine
//!   DeviceDiscovery      every 15s       <prefix>.local probes → DeviceRegistry::device_seen
//! ```
//!
//! ## Lifecycle
//!
//! `start()` and `stop()` are synchronous and idempotent. Stopping signals the loop through
//! a `watch` channel; the loop exits before its next tick. A tick that is already running
//! is allowed to finish, but its result is discarded.

pub mod coordinator;
pub mod discovery;
pub mod poller;

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub use coordinator::SamplingCoordinator;
pub use discovery::DeviceDiscovery;
pub use poller::RemotePoller;

#[derive(Debug)]
struct LoopTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Holds at most one running loop of a background task.
#[derive(Debug, Default)]
pub(crate) struct LoopSlot {
    task: Mutex<Option<LoopTask>>,
}

impl LoopSlot {
    fn lock(&self) -> MutexGuard<'_, Option<LoopTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the loop built by `make` unless one is already running.
    ///
    /// Returns `false` if nothing was started.
    pub(crate) fn start<F, Fut>(&self, name: &str, make: F) -> bool
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.lock();
        if task.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!("{name} already running");
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("cannot start {name} outside of a tokio runtime");
            return false;
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(make(stop_rx));
        debug!("{name} started");
        *task = Some(LoopTask { stop_tx, handle });
        true
    }

    /// Signals the running loop to exit. Returns `false` if nothing was running.
    pub(crate) fn stop(&self, name: &str) -> bool {
        let Some(task) = self.lock().take() else {
            return false;
        };

        // the receiver is gone if the loop already ended
        let _ = task.stop_tx.send(true);
        debug!("{name} stopped");
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

/// `true` once a stop was signalled on `stop_rx`
pub(crate) fn is_stopped(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow() || stop_rx.has_changed().is_err()
}
