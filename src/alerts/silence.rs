//! Notification suppression
//!
//! Two independent mechanisms, either of which silences the notifier:
//!
//! - a manual silence for a fixed duration or until ended explicitly
//! - recurring weekly schedules with a daily time-of-day window
//!
//! Manual silences expire through a background timer, and [`SilenceManager::should_silence`]
//! also clears an expired silence itself, so a missed or late timer never keeps alerts muted.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::storage::StateFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Time of day not in `HH:MM` format
    InvalidTime(String),
    /// Weekday outside 0 (Sunday) ..= 6 (Saturday)
    InvalidWeekday(u8),
    NotFound(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::InvalidTime(time) => {
                write!(f, "invalid time of day '{time}', expected HH:MM")
            }
            ScheduleError::InvalidWeekday(day) => {
                write!(f, "invalid weekday {day}, expected 0 (Sunday) to 6 (Saturday)")
            }
            ScheduleError::NotFound(id) => write!(f, "no silence schedule with id {id}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

fn parse_time(time: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| ScheduleError::InvalidTime(time.to_string()))
}

/// Recurring daily window, active on the listed weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceSchedule {
    pub id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// 0 = Sunday ..= 6 = Saturday
    pub weekdays: BTreeSet<u8>,
    pub enabled: bool,
}

impl SilenceSchedule {
    /// Builds a schedule from `HH:MM` times.
    pub fn new(
        start: &str,
        end: &str,
        weekdays: impl IntoIterator<Item = u8>,
        enabled: bool,
    ) -> Result<Self, ScheduleError> {
        let weekdays = weekdays.into_iter().collect::<BTreeSet<_>>();
        if let Some(day) = weekdays.iter().find(|day| **day > 6) {
            return Err(ScheduleError::InvalidWeekday(*day));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            start: parse_time(start)?,
            end: parse_time(end)?,
            weekdays,
            enabled,
        })
    }

    /// Whether the window covers `at`.
    ///
    /// A window with `end < start` wraps past midnight; `start == end` covers the whole
    /// day. The weekday is always the one of `at` itself.
    pub fn is_active_at<T: Datelike + Timelike>(&self, at: &T) -> bool {
        if !self.enabled {
            return false;
        }

        let weekday = at.weekday().num_days_from_sunday() as u8;
        if !self.weekdays.contains(&weekday) {
            return false;
        }

        let Some(current) = NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second()) else {
            return false;
        };

        if self.start < self.end {
            current >= self.start && current < self.end
        } else if self.end < self.start {
            current >= self.start || current < self.end
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceDuration {
    OneHour,
    FourHours,
    OneDay,
    Indefinite,
    For(Duration),
}

impl SilenceDuration {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            SilenceDuration::OneHour => Some(Duration::from_secs(3600)),
            SilenceDuration::FourHours => Some(Duration::from_secs(4 * 3600)),
            SilenceDuration::OneDay => Some(Duration::from_secs(24 * 3600)),
            SilenceDuration::Indefinite => None,
            SilenceDuration::For(duration) => Some(*duration),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSilence {
    pub started_at: DateTime<Utc>,
    /// `None` silences until ended explicitly
    pub until: Option<DateTime<Utc>>,
}

impl ManualSilence {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.until.is_some_and(|until| now >= until)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PersistedSilence {
    manual: Option<ManualSilence>,
    schedules: Vec<SilenceSchedule>,
}

#[derive(Debug, Default)]
struct Inner {
    manual: Option<ManualSilence>,
    schedules: Vec<SilenceSchedule>,
    expiry_task: Option<JoinHandle<()>>,
}

impl Inner {
    fn persisted(&self) -> PersistedSilence {
        PersistedSilence {
            manual: self.manual,
            schedules: self.schedules.clone(),
        }
    }

    fn abort_expiry(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

/// Shared handle to the silence state.
#[derive(Debug, Clone, Default)]
pub struct SilenceManager {
    inner: Arc<Mutex<Inner>>,
    file: Option<StateFile>,
}

impl SilenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores silence state from `file`. An already expired manual silence is dropped.
    pub fn load(file: StateFile) -> Self {
        let mut persisted = file.load_or_default::<PersistedSilence>();
        if persisted
            .manual
            .is_some_and(|manual| manual.is_expired_at(Utc::now()))
        {
            debug!("dropping expired manual silence");
            persisted.manual = None;
        }

        let manager = Self {
            inner: Arc::new(Mutex::new(Inner {
                manual: persisted.manual,
                schedules: persisted.schedules,
                expiry_task: None,
            })),
            file: Some(file),
        };

        if let Some(until) = persisted.manual.and_then(|manual| manual.until) {
            manager.schedule_expiry(&mut manager.lock(), until);
        }
        manager
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &Inner) {
        if let Some(file) = &self.file {
            file.save_logged(&inner.persisted());
        }
    }

    /// Spawns the auto-expiry timer for a silence ending at `until`. Without a runtime
    /// only the lazy check applies.
    fn schedule_expiry(&self, inner: &mut Inner, until: DateTime<Utc>) {
        inner.abort_expiry();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, manual silence expires lazily");
            return;
        };

        let after = (until - Utc::now()).to_std().unwrap_or_default();
        let manager = self.clone();
        inner.expiry_task = Some(runtime.spawn(async move {
            tokio::time::sleep(after).await;
            manager.expire(until);
        }));
    }

    /// Timer callback. Only clears the silence it was started for.
    fn expire(&self, until: DateTime<Utc>) {
        let mut inner = self.lock();
        if inner.manual.is_some_and(|manual| manual.until == Some(until)) {
            inner.manual = None;
            inner.expiry_task = None;
            info!("manual silence expired");
            self.persist(&inner);
        }
    }

    /// Silences notifications for `duration`, replacing any previous manual silence.
    pub fn silence(&self, duration: SilenceDuration) {
        let now = Utc::now();
        let until = duration
            .as_duration()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d);

        let mut inner = self.lock();
        inner.manual = Some(ManualSilence {
            started_at: now,
            until,
        });
        match until {
            Some(until) => self.schedule_expiry(&mut inner, until),
            None => inner.abort_expiry(),
        }
        self.persist(&inner);

        match until {
            Some(until) => info!("alerts silenced until {until}"),
            None => info!("alerts silenced until further notice"),
        }
    }

    pub fn end_silence(&self) {
        let mut inner = self.lock();
        inner.abort_expiry();
        if inner.manual.take().is_some() {
            info!("manual silence ended");
            self.persist(&inner);
        }
    }

    fn clear_if_expired(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();
        if inner.manual.is_some_and(|manual| manual.is_expired_at(now)) {
            inner.manual = None;
            inner.abort_expiry();
            info!("manual silence expired");
            self.persist(&inner);
        }
    }

    pub fn manual_silence(&self) -> Option<ManualSilence> {
        let now = Utc::now();
        self.lock()
            .manual
            .filter(|manual| !manual.is_expired_at(now))
    }

    /// Whether notifications should be suppressed right now (local wall clock).
    pub fn should_silence(&self) -> bool {
        self.should_silence_at(&Local::now())
    }

    /// Whether notifications are suppressed at `at`. Clears an expired manual silence.
    pub fn should_silence_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        let now = at.with_timezone(&Utc);
        self.clear_if_expired(now);

        let inner = self.lock();
        if inner.manual.is_some() {
            return true;
        }
        inner
            .schedules
            .iter()
            .any(|schedule| schedule.is_active_at(at))
    }

    pub fn schedules(&self) -> Vec<SilenceSchedule> {
        self.lock().schedules.clone()
    }

    pub fn add_schedule(&self, schedule: SilenceSchedule) {
        let mut inner = self.lock();
        debug!("adding silence schedule {}", schedule.id);
        inner.schedules.push(schedule);
        self.persist(&inner);
    }

    pub fn update_schedule(&self, schedule: SilenceSchedule) -> Result<(), ScheduleError> {
        let mut inner = self.lock();
        let existing = inner
            .schedules
            .iter_mut()
            .find(|existing| existing.id == schedule.id)
            .ok_or_else(|| ScheduleError::NotFound(schedule.id.clone()))?;
        *existing = schedule;
        self.persist(&inner);
        Ok(())
    }

    pub fn remove_schedule(&self, id: &str) -> Result<(), ScheduleError> {
        let mut inner = self.lock();
        let before = inner.schedules.len();
        inner.schedules.retain(|schedule| schedule.id != id);
        if inner.schedules.len() == before {
            return Err(ScheduleError::NotFound(id.to_string()));
        }
        self.persist(&inner);
        Ok(())
    }

    /// Flips the enabled flag and returns the new value.
    pub fn toggle_schedule(&self, id: &str) -> Result<bool, ScheduleError> {
        let mut inner = self.lock();
        let schedule = inner
            .schedules
            .iter_mut()
            .find(|schedule| schedule.id == id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        schedule.enabled = !schedule.enabled;
        let enabled = schedule.enabled;
        self.persist(&inner);
        Ok(enabled)
    }
}
