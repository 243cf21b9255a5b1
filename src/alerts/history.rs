//! Bounded log of fired alerts
//!
//! Events are kept newest-first. Retention is applied after every insert and on load:
//! at most [`MAX_EVENTS`] entries, none older than [`RETENTION_DAYS`] days.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{AlertSeverity, AlertType};
use crate::storage::{StateFile, StorageResult};

pub const MAX_EVENTS: usize = 1000;
pub const RETENTION_DAYS: i64 = 30;

const CSV_HEADER: &str = "Time,Device,Type,Severity,Message,Value,Threshold,Status,Duration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Builds the event for an alert that just fired, with message and severity derived
    /// from the reading.
    pub fn fired(
        device_id: &str,
        device_name: &str,
        alert_type: AlertType,
        value: f64,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            alert_type,
            severity: AlertSeverity::classify(alert_type, value, threshold),
            message: message_for(alert_type, value, threshold),
            value,
            threshold,
            triggered_at: at,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Time from firing to recovery, `None` while still active
    pub fn duration(&self) -> Option<Duration> {
        self.resolved_at
            .map(|resolved_at| resolved_at - self.triggered_at)
    }

    fn csv_row(&self) -> String {
        let status = if self.is_resolved() {
            "Resolved"
        } else {
            "Active"
        };
        let duration = self
            .duration()
            .map(|d| format!("{:.0}", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_default();

        format!(
            "{},{},{},{},{},{:.1},{:.1},{},{}",
            self.triggered_at.to_rfc3339(),
            csv_field(&self.device_name),
            self.alert_type.display_name(),
            self.severity,
            csv_field(&self.message),
            self.value,
            self.threshold,
            status,
            duration
        )
    }
}

fn csv_field(text: &str) -> String {
    text.replace(',', ";").replace(['\n', '\r'], " ")
}

pub fn message_for(alert_type: AlertType, value: f64, threshold: f64) -> String {
    match alert_type {
        AlertType::Network => "Network connection lost".to_string(),
        _ => format!(
            "{} usage {value:.1}% exceeds threshold {threshold:.1}%",
            alert_type.display_name()
        ),
    }
}

/// Optional filters, combined with AND. The time range is inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub device_id: Option<String>,
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub resolved: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn matches(&self, event: &AlertEvent) -> bool {
        self.device_id
            .as_ref()
            .is_none_or(|id| *id == event.device_id)
            && self.alert_type.is_none_or(|t| t == event.alert_type)
            && self.severity.is_none_or(|s| s == event.severity)
            && self.resolved.is_none_or(|r| r == event.is_resolved())
            && self.from.is_none_or(|from| event.triggered_at >= from)
            && self.to.is_none_or(|to| event.triggered_at <= to)
    }
}

/// Shared handle to the alert log.
#[derive(Debug, Clone, Default)]
pub struct AlertHistory {
    events: Arc<RwLock<Vec<AlertEvent>>>,
    file: Option<StateFile>,
}

fn apply_retention(events: &mut Vec<AlertEvent>, now: DateTime<Utc>) {
    let cutoff = now - Duration::days(RETENTION_DAYS);
    events.retain(|event| event.triggered_at >= cutoff);
    events.truncate(MAX_EVENTS);
}

impl AlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the log from `file`, dropping entries that are past retention.
    pub fn load(file: StateFile) -> Self {
        let mut events = file.load_or_default::<Vec<AlertEvent>>();
        events.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        apply_retention(&mut events, Utc::now());
        debug!("loaded {} alert events", events.len());

        Self {
            events: Arc::new(RwLock::new(events)),
            file: Some(file),
        }
    }

    async fn persist(&self, events: &[AlertEvent]) {
        if let Some(file) = &self.file {
            file.save_logged_async(events).await;
        }
    }

    /// Inserts a new event at the front and applies retention.
    pub async fn record(&self, event: AlertEvent) {
        trace!("recording alert event {}", event.id);
        let mut events = self.events.write().await;
        let now = Utc::now().max(event.triggered_at);
        events.insert(0, event);
        apply_retention(&mut events, now);
        self.persist(&events).await;
    }

    /// Stamps `resolved_at` on the newest unresolved event for (device, type).
    ///
    /// Returns the resolved event, if there was one.
    pub async fn resolve_latest(
        &self,
        device_id: &str,
        alert_type: AlertType,
        at: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let mut events = self.events.write().await;
        let event = events.iter_mut().find(|event| {
            event.device_id == device_id && event.alert_type == alert_type && !event.is_resolved()
        })?;

        event.resolved_at = Some(at.max(event.triggered_at));
        let resolved = event.clone();
        self.persist(&events).await;
        Some(resolved)
    }

    /// Resolves a specific event. Already resolved events are left untouched.
    pub async fn resolve(&self, id: &str, at: DateTime<Utc>) -> bool {
        let mut events = self.events.write().await;
        let Some(event) = events
            .iter_mut()
            .find(|event| event.id == id && !event.is_resolved())
        else {
            return false;
        };

        event.resolved_at = Some(at.max(event.triggered_at));
        self.persist(&events).await;
        true
    }

    /// Matching events, newest first.
    pub async fn events(&self, filter: &HistoryFilter) -> Vec<AlertEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Number of events per alert type triggered within the trailing `window`
    /// (24 hours if `None`).
    pub async fn statistics(&self, window: Option<Duration>) -> BTreeMap<AlertType, usize> {
        let from = Utc::now() - window.unwrap_or_else(|| Duration::hours(24));
        let mut counts = AlertType::ALL
            .into_iter()
            .map(|alert_type| (alert_type, 0))
            .collect::<BTreeMap<_, _>>();

        for event in self.events.read().await.iter() {
            if event.triggered_at >= from {
                *counts.entry(event.alert_type).or_default() += 1;
            }
        }
        counts
    }

    /// Comma separated export of the matching events, newest first.
    pub async fn export_csv(&self, filter: &HistoryFilter) -> String {
        let events = self.events(filter).await;
        let mut csv = String::from(CSV_HEADER);
        csv.push('\n');
        for event in &events {
            csv.push_str(&event.csv_row());
            csv.push('\n');
        }
        csv
    }

    /// Pretty printed JSON export of the matching events, newest first.
    pub async fn export_json(&self, filter: &HistoryFilter) -> StorageResult<String> {
        let events = self.events(filter).await;
        Ok(serde_json::to_string_pretty(&events)?)
    }

    pub async fn clear(&self) {
        let mut events = self.events.write().await;
        events.clear();
        self.persist(&events).await;
    }
}
