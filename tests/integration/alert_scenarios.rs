//! End-to-end alerting scenarios
//!
//! These tests verify that:
//! - Alerts fire on the k-th consecutive violation and resolve on the first normal sample
//! - Repeated notifications respect the repeat interval
//! - Silences suppress notifications but never history
//! - The sampling loop drives the whole pipeline

use std::time::Duration;

use assert_matches::assert_matches;
use hostmon::{
    NetworkStatus,
    actors::SamplingCoordinator,
    alerts::{
        AlertEvaluation, AlertSeverity, AlertState, AlertType, HistoryFilter, SilenceDuration,
        SilenceSchedule,
    },
    config::{Settings, SettingsProvider},
    devices::DeviceIdentity,
};
use pretty_assertions::assert_eq;

use crate::helpers::{TestAgent, fixed_samplers, memory_snapshot, snapshot, test_settings};

/// Whole seconds close to now, so history retention keeps the events and offsets stay exact
fn start_time() -> f64 {
    hostmon::util::unix_now().floor()
}

fn local() -> DeviceIdentity {
    DeviceIdentity::new("local", "Test Mac")
}

fn evaluation_of(
    results: &[(AlertType, AlertEvaluation)],
    alert_type: AlertType,
) -> AlertEvaluation {
    results
        .iter()
        .find(|(t, _)| *t == alert_type)
        .map(|(_, evaluation)| *evaluation)
        .expect("alert type missing from results")
}

#[tokio::test]
async fn test_memory_alert_lifecycle() {
    let agent = TestAgent::new(Settings {
        memory_threshold_percent: 85.0,
        consecutive_samples_to_trigger: 2,
        ..test_settings()
    });

    let t0 = start_time();
    let readings = [80.0, 90.0, 92.0, 70.0];
    let mut evaluations = Vec::new();
    for (i, memory) in readings.into_iter().enumerate() {
        let now = t0 + i as f64 * 5.0;
        let results = agent
            .engine
            .evaluate(&local(), &memory_snapshot(now, memory), now)
            .await;
        evaluations.push(evaluation_of(&results, AlertType::Memory));
    }

    assert_eq!(
        evaluations,
        vec![
            AlertEvaluation::Ok,
            AlertEvaluation::Exceeding,
            AlertEvaluation::StartsToExceed,
            AlertEvaluation::BackToOk,
        ]
    );
    assert_eq!(agent.notifier.count(), 1);

    let events = agent.engine.history().events(&HistoryFilter::default()).await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.alert_type, AlertType::Memory);
    assert_eq!(event.value, 92.0);
    assert_eq!(event.threshold, 85.0);
    assert_eq!(event.severity, AlertSeverity::Warning);
    assert_eq!(event.device_id, "local");
    assert!(event.is_resolved());
    assert_eq!(event.duration(), Some(chrono::Duration::seconds(5)));

    let status = agent.engine.alert_status("local", AlertType::Memory).await;
    assert_eq!(status.state, AlertState::Normal);
    assert_eq!(status.consecutive_violations, 0);
}

#[tokio::test]
async fn test_repeat_notifications_are_throttled() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 1,
        alert_repeat_minutes: 1,
        ..test_settings()
    });

    let t0 = start_time();
    for offset in [0.0, 30.0, 60.0, 90.0, 120.0] {
        let now = t0 + offset;
        agent
            .engine
            .evaluate(&local(), &snapshot(now, 10.0, 99.0, 40.0, NetworkStatus::Normal), now)
            .await;
    }

    // Notified at 0, 60 and 120
    assert_eq!(agent.notifier.count(), 3);
    let status = agent.engine.alert_status("local", AlertType::Cpu).await;
    assert_matches!(status.state, AlertState::Throttled { until } if until == t0 + 180.0);
    assert_eq!(status.active_since, Some(t0));

    // A repeat does not add history entries
    assert_eq!(agent.engine.history().len().await, 1);
}

#[tokio::test]
async fn test_settings_changes_apply_on_next_evaluation() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 3,
        ..test_settings()
    });

    agent.engine.evaluate(&local(), &memory_snapshot(0.0, 95.0), 0.0).await;
    assert!(!agent.engine.is_any_alert_active("local").await);

    agent.settings.set_consecutive_samples(2);
    let results = agent
        .engine
        .evaluate(&local(), &memory_snapshot(5.0, 95.0), 5.0)
        .await;
    assert_eq!(
        evaluation_of(&results, AlertType::Memory),
        AlertEvaluation::StartsToExceed
    );

    agent.settings.set_thresholds(99.0, 90.0, 90.0);
    let results = agent
        .engine
        .evaluate(&local(), &memory_snapshot(10.0, 95.0), 10.0)
        .await;
    assert_eq!(evaluation_of(&results, AlertType::Memory), AlertEvaluation::BackToOk);
}

#[tokio::test]
async fn test_manual_silence_suppresses_notifications_only() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 1,
        alert_repeat_minutes: 1,
        ..test_settings()
    });
    agent.engine.silence().silence(SilenceDuration::Indefinite);

    let t0 = start_time();
    let down = snapshot(t0, 10.0, 10.0, 40.0, NetworkStatus::Down);
    let results = agent.engine.evaluate(&local(), &down, t0).await;
    assert_eq!(
        evaluation_of(&results, AlertType::Network),
        AlertEvaluation::StartsToExceed
    );
    assert_eq!(agent.notifier.count(), 0);

    let events = agent.engine.history().events(&HistoryFilter::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, "Network connection lost");
    assert_eq!(events[0].severity, AlertSeverity::Critical);

    agent.engine.silence().end_silence();
    let results = agent.engine.evaluate(&local(), &down, t0 + 60.0).await;
    assert_eq!(evaluation_of(&results, AlertType::Network), AlertEvaluation::Repeat);
    assert_eq!(agent.notifier.count(), 1);
}

#[tokio::test]
async fn test_all_day_schedule_silences() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 1,
        ..test_settings()
    });
    let schedule = SilenceSchedule::new("00:00", "00:00", 0..=6, true).unwrap();
    let id = schedule.id.clone();
    agent.engine.silence().add_schedule(schedule);

    agent.engine.evaluate(&local(), &memory_snapshot(0.0, 99.0), 0.0).await;
    assert_eq!(agent.notifier.count(), 0);
    assert!(agent.engine.is_any_alert_active("local").await);

    assert_eq!(agent.engine.silence().toggle_schedule(&id), Ok(false));
    agent.engine.evaluate(&local(), &memory_snapshot(5.0, 50.0), 5.0).await;
    agent.engine.evaluate(&local(), &memory_snapshot(10.0, 99.0), 10.0).await;
    assert_eq!(agent.notifier.count(), 1);
}

#[tokio::test]
async fn test_history_filters_by_device() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 1,
        ..test_settings()
    });
    let peer = DeviceIdentity::new("peer-1", "Studio");
    let t0 = start_time();

    agent.engine.evaluate(&local(), &memory_snapshot(t0, 99.0), t0).await;
    agent.engine.evaluate(&peer, &memory_snapshot(t0, 99.0), t0).await;
    agent.engine.evaluate(&peer, &memory_snapshot(t0 + 5.0, 10.0), t0 + 5.0).await;

    let filter = HistoryFilter {
        device_id: Some("peer-1".to_string()),
        ..Default::default()
    };
    let events = agent.engine.history().events(&filter).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_name, "Studio");
    assert!(events[0].is_resolved());

    let unresolved = HistoryFilter {
        resolved: Some(false),
        ..Default::default()
    };
    let events = agent.engine.history().events(&unresolved).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "local");

    let csv = agent
        .engine
        .history()
        .export_csv(&HistoryFilter::default())
        .await;
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sampling_loop_fires_alert() {
    let agent = TestAgent::new(Settings {
        consecutive_samples_to_trigger: 2,
        ..test_settings()
    });
    let coordinator = SamplingCoordinator::new(
        fixed_samplers(95.0, true),
        agent.store.clone(),
        agent.engine.clone(),
        agent.provider(),
        local(),
    );

    assert!(coordinator.start());
    assert!(!coordinator.start());

    // Ticks at 0s and 5s
    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert!(coordinator.stop());
    assert!(!coordinator.is_running());

    assert_eq!(agent.store.read().await.series(None).len(), 2);
    assert!(agent.engine.is_any_alert_active("local").await);
    assert_eq!(agent.notifier.count(), 1);

    // Nothing is sampled once stopped
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(agent.store.read().await.series(None).len(), 2);
}
