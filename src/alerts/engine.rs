use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

use super::history::{AlertEvent, AlertHistory, message_for};
use super::notifier::Notifier;
use super::silence::SilenceManager;
use super::state::{AlertEvaluation, AlertPolicy, AlertStatus};
use super::AlertType;
use crate::MetricSnapshot;
use crate::config::SettingsProvider;
use crate::devices::DeviceIdentity;
use crate::storage::StateFile;
use crate::util::from_unix;

type DeviceStatuses = BTreeMap<AlertType, AlertStatus>;

/// Evaluates snapshots against the configured limits and drives notifications.
///
/// One engine serves every device; statuses are keyed by device id. The status map lock
/// is held for a whole evaluation, so two evaluations never interleave.
#[derive(Clone)]
pub struct AlertEngine {
    statuses: Arc<Mutex<HashMap<String, DeviceStatuses>>>,
    history: AlertHistory,
    silence: SilenceManager,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsProvider>,
    file: Option<StateFile>,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("history", &self.history)
            .field("silence", &self.silence)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    pub fn new(
        history: AlertHistory,
        silence: SilenceManager,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
            history,
            silence,
            notifier,
            settings,
            file: None,
        }
    }

    /// Restores alert statuses from `file` and persists them there on every state transition.
    ///
    /// Violation counters are not written on their own; after a restart a pending streak
    /// starts over.
    pub fn with_state_file(mut self, file: StateFile) -> Self {
        let persisted = file.load_or_default::<HashMap<String, Vec<AlertStatus>>>();
        let statuses = persisted
            .into_iter()
            .map(|(device_id, statuses)| {
                let statuses = statuses
                    .into_iter()
                    .map(|status| (status.alert_type, status))
                    .collect::<DeviceStatuses>();
                (device_id, statuses)
            })
            .collect();

        self.statuses = Arc::new(Mutex::new(statuses));
        self.file = Some(file);
        self
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }

    pub fn silence(&self) -> &SilenceManager {
        &self.silence
    }

    async fn persist(&self, statuses: &HashMap<String, DeviceStatuses>) {
        let Some(file) = &self.file else {
            return;
        };

        let persisted = statuses
            .iter()
            .map(|(device_id, statuses)| {
                (device_id.clone(), statuses.values().cloned().collect::<Vec<_>>())
            })
            .collect::<HashMap<_, _>>();
        file.save_logged_async(&persisted).await;
    }

    /// Runs one evaluation step for every alert type of `device`.
    ///
    /// `now` is the evaluation time in epoch seconds.
    #[instrument(skip(self, device, snapshot), fields(device = %device.id))]
    pub async fn evaluate(
        &self,
        device: &DeviceIdentity,
        snapshot: &MetricSnapshot,
        now: f64,
    ) -> Vec<(AlertType, AlertEvaluation)> {
        let settings = self.settings.current();
        let policy = AlertPolicy {
            required_consecutive: settings.consecutive_samples_to_trigger,
            repeat_secs: settings.alert_repeat_secs(),
        };

        let mut all = self.statuses.lock().await;
        let statuses = all.entry(device.id.clone()).or_default();

        let mut silenced = None;
        let mut transitioned = false;
        let mut results = Vec::with_capacity(AlertType::ALL.len());

        for alert_type in AlertType::ALL {
            let status = statuses
                .entry(alert_type)
                .or_insert_with(|| AlertStatus::new(alert_type));
            let before = status.state;

            let violating = alert_type.is_violating(snapshot, &settings);
            let evaluation = status.step(violating, now, policy);
            transitioned |= status.state != before;

            let (value, threshold) = alert_type.reading(snapshot, &settings).unwrap_or((0.0, 0.0));

            match evaluation {
                AlertEvaluation::StartsToExceed => {
                    info!("{alert_type} alert fired for {}", device.name);
                    self.history
                        .record(AlertEvent::fired(
                            &device.id,
                            &device.name,
                            alert_type,
                            value,
                            threshold,
                            from_unix(now),
                        ))
                        .await;
                }
                AlertEvaluation::BackToOk => {
                    info!("{alert_type} back to normal for {}", device.name);
                    self.history
                        .resolve_latest(&device.id, alert_type, from_unix(now))
                        .await;
                }
                AlertEvaluation::Exceeding => {
                    trace!(
                        "{alert_type} violating ({}/{})",
                        status.consecutive_violations, policy.required_consecutive
                    );
                }
                _ => {}
            }

            if evaluation.notifies() {
                let silenced = *silenced.get_or_insert_with(|| self.silence.should_silence());
                let message = message_for(alert_type, value, threshold);
                if silenced {
                    info!("notification suppressed (silenced): {message}");
                } else {
                    self.notifier.play(&device.name, alert_type, &message);
                }
            }

            results.push((alert_type, evaluation));
        }

        if transitioned {
            self.persist(&all).await;
        }

        debug!("evaluated {} alert types", results.len());
        results
    }

    /// Status of one alert type. Unknown devices and types read as `Normal`.
    pub async fn alert_status(&self, device_id: &str, alert_type: AlertType) -> AlertStatus {
        self.statuses
            .lock()
            .await
            .get(device_id)
            .and_then(|statuses| statuses.get(&alert_type))
            .cloned()
            .unwrap_or_else(|| AlertStatus::new(alert_type))
    }

    /// Statuses of every alert type for `device_id`, in [`AlertType::ALL`] order.
    pub async fn all_alert_statuses(&self, device_id: &str) -> Vec<AlertStatus> {
        let all = self.statuses.lock().await;
        let statuses = all.get(device_id);
        AlertType::ALL
            .into_iter()
            .map(|alert_type| {
                statuses
                    .and_then(|statuses| statuses.get(&alert_type))
                    .cloned()
                    .unwrap_or_else(|| AlertStatus::new(alert_type))
            })
            .collect()
    }

    pub async fn is_any_alert_active(&self, device_id: &str) -> bool {
        self.statuses
            .lock()
            .await
            .get(device_id)
            .is_some_and(|statuses| statuses.values().any(AlertStatus::is_active))
    }

    /// Forgets all alert state for `device_id`. History is left untouched.
    pub async fn reset_all(&self, device_id: &str) {
        let mut all = self.statuses.lock().await;
        if all.remove(device_id).is_some() {
            debug!("reset alert state of {device_id}");
            self.persist(&all).await;
        }
    }
}
