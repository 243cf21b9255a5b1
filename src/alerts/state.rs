//! Per (device, alert type) state machine
//!
//! ```text
//! not violating:
//!   Alerting/Throttled            → BackToOk        (state = Normal, counters reset)
//!   Normal                        → Ok              (counters reset)
//!
//! violating (counter incremented first):
//!   counter < k                   → Exceeding       (no state change)
//!   Normal                        → StartsToExceed  (state = Alerting(since = now))
//!   active, now >= next_notify_at → Repeat          (state = Throttled(until = next))
//!   active, now <  next_notify_at → StillExceeding  (no state change)
//! ```
//!
//! `next_notify_at` is moved `repeat_secs` ahead every time a notification is due, so an
//! ongoing alert produces exactly one notification per repeat interval.

use serde::{Deserialize, Serialize};

use super::AlertType;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Normal,
    Alerting {
        since: f64,
    },
    Throttled {
        until: f64,
    },
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertState::Normal)
    }
}

/// Outcome of one evaluation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvaluation {
    /// Not violating and nothing was active
    Ok,
    /// Violating, but not for enough consecutive samples yet
    Exceeding,
    /// Alert fired on this sample
    StartsToExceed,
    /// Alert is active and the next notification is not due yet
    StillExceeding,
    /// Alert is active and a repeat notification is due
    Repeat,
    /// Active alert recovered on this sample
    BackToOk,
}

impl AlertEvaluation {
    /// Whether this outcome should reach the notifier
    pub fn notifies(&self) -> bool {
        matches!(self, AlertEvaluation::StartsToExceed | AlertEvaluation::Repeat)
    }
}

/// Debounce and throttle parameters, read fresh from settings on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub required_consecutive: u32,
    pub repeat_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatus {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub state: AlertState,
    pub consecutive_violations: u32,
    pub next_notify_at: Option<f64>,
    /// When the current alert fired; kept while throttled
    pub active_since: Option<f64>,
}

impl AlertStatus {
    pub fn new(alert_type: AlertType) -> Self {
        Self {
            alert_type,
            state: AlertState::Normal,
            consecutive_violations: 0,
            next_notify_at: None,
            active_since: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn reset(&mut self) {
        self.state = AlertState::Normal;
        self.consecutive_violations = 0;
        self.next_notify_at = None;
        self.active_since = None;
    }

    /// Advances the state machine by one sample.
    pub fn step(&mut self, violating: bool, now: f64, policy: AlertPolicy) -> AlertEvaluation {
        if !violating {
            let was_active = self.is_active();
            self.reset();
            return if was_active {
                AlertEvaluation::BackToOk
            } else {
                AlertEvaluation::Ok
            };
        }

        self.consecutive_violations = self.consecutive_violations.saturating_add(1);
        if self.consecutive_violations < policy.required_consecutive.max(1) {
            return AlertEvaluation::Exceeding;
        }

        if !self.is_active() {
            self.state = AlertState::Alerting { since: now };
            self.active_since = Some(now);
            self.next_notify_at = Some(now + policy.repeat_secs);
            return AlertEvaluation::StartsToExceed;
        }

        if self.next_notify_at.is_none_or(|next| now >= next) {
            let next = now + policy.repeat_secs;
            self.next_notify_at = Some(next);
            self.state = AlertState::Throttled { until: next };
            return AlertEvaluation::Repeat;
        }

        AlertEvaluation::StillExceeding
    }
}
