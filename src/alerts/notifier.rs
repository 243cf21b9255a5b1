use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{trace, warn};

use super::AlertType;

/// Audible or visual cue for a firing alert. Must not block.
pub trait Notifier: Send + Sync {
    fn play(&self, device_name: &str, alert_type: AlertType, message: &str);
}

/// Rings the terminal bell and logs the alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn play(&self, device_name: &str, alert_type: AlertType, message: &str) {
        warn!("[{device_name}] {} alert: {message}", alert_type.display_name());

        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            trace!("could not ring bell: {e}");
        }
    }
}

/// Counts notifications instead of playing them.
#[derive(Debug, Default)]
pub struct CountingNotifier {
    plays: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl Notifier for CountingNotifier {
    fn play(&self, _device_name: &str, _alert_type: AlertType, _message: &str) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }
}
