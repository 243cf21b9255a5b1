//! Threshold alerting
//!
//! ```text
//!   snapshot ──▶ AlertEngine::evaluate ──▶ state::AlertStatus::step   (per device, per type)
//!                      │
//!                      ├── StartsToExceed ──▶ AlertHistory::record ──┐
//!                      ├── Repeat ───────────────────────────────────┼──▶ SilenceManager ──▶ Notifier
//!                      └── BackToOk ─────▶ AlertHistory::resolve_latest
//! ```
//!
//! Silence only suppresses the notifier. State transitions and history are recorded
//! regardless.

pub mod engine;
pub mod history;
pub mod notifier;
pub mod silence;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MetricSnapshot;
use crate::config::Settings;

pub use engine::AlertEngine;
pub use history::{AlertEvent, AlertHistory, HistoryFilter};
pub use notifier::{Notifier, TerminalBell};
pub use silence::{SilenceDuration, SilenceManager, SilenceSchedule};
pub use state::{AlertEvaluation, AlertPolicy, AlertState, AlertStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Memory,
    Cpu,
    Disk,
    Network,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::Memory,
        AlertType::Cpu,
        AlertType::Disk,
        AlertType::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Memory => "memory",
            AlertType::Cpu => "cpu",
            AlertType::Disk => "disk",
            AlertType::Network => "network",
        }
    }

    /// Human readable name used in messages and exports
    pub fn display_name(&self) -> &'static str {
        match self {
            AlertType::Memory => "Memory",
            AlertType::Cpu => "CPU",
            AlertType::Disk => "Disk",
            AlertType::Network => "Network",
        }
    }

    /// Observed value and threshold for this type, or `None` for network which is judged
    /// by status only.
    pub fn reading(&self, snapshot: &MetricSnapshot, settings: &Settings) -> Option<(f64, f64)> {
        match self {
            AlertType::Memory => Some((
                snapshot.memory.used_percent,
                settings.memory_threshold_percent,
            )),
            AlertType::Cpu => Some((snapshot.cpu.usage_percent, settings.cpu_threshold_percent)),
            AlertType::Disk => Some((snapshot.disk.used_percent, settings.disk_threshold_percent)),
            AlertType::Network => None,
        }
    }

    /// Whether `snapshot` violates the configured limit for this type.
    pub fn is_violating(&self, snapshot: &MetricSnapshot, settings: &Settings) -> bool {
        match self.reading(snapshot, settings) {
            Some((value, threshold)) => value > threshold,
            None => snapshot.network.status == crate::NetworkStatus::Down,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Severity from how far `value` overshoots `threshold`.
    ///
    /// Memory and CPU become critical more than 20 points over, disk more than 10.
    /// Losing the network is always critical.
    pub fn classify(alert_type: AlertType, value: f64, threshold: f64) -> AlertSeverity {
        let margin = match alert_type {
            AlertType::Memory | AlertType::Cpu => 20.0,
            AlertType::Disk => 10.0,
            AlertType::Network => return AlertSeverity::Critical,
        };

        if value - threshold > margin {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
