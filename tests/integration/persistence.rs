//! Integration tests for state surviving an agent restart
//!
//! These tests verify that:
//! - Settings are written on first start and every change
//! - Devices, silences, alert history and alert statuses are reloaded from the data directory
//! - Corrupt files fall back to defaults instead of failing

use std::sync::Arc;

use hostmon::{
    alerts::{
        AlertEngine, AlertHistory, AlertState, AlertType, HistoryFilter, SilenceDuration,
        SilenceManager, SilenceSchedule, notifier::CountingNotifier,
    },
    config::{Settings, SettingsProvider, SettingsStore},
    devices::{Device, DeviceRegistry, DeviceStatus, LOCAL_DEVICE_ID},
    storage::{ALERT_HISTORY_FILE, ALERT_STATES_FILE, DEVICES_FILE, SILENCE_FILE, StateFile},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::memory_snapshot;

#[test]
fn test_settings_written_on_first_start() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.toml");

    let store = SettingsStore::load(&path);
    assert!(path.exists());
    let token = store.current().http_server_token;
    assert_eq!(token.len(), 32);

    store.set_refresh_interval_seconds(10);
    store.set_alert_repeat_minutes(15);

    let reloaded = SettingsStore::load(&path);
    let settings = reloaded.current();
    assert_eq!(settings.refresh_interval_seconds, 10);
    assert_eq!(settings.alert_repeat_minutes, 15);
    assert_eq!(settings.http_server_token, token);
}

#[test]
fn test_settings_file_is_repaired() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(
        &path,
        "refresh_interval_seconds = 7\ncpu_threshold_percent = 250.0\nhttp_server_token = \"abc\"\n",
    )
    .unwrap();

    let settings = SettingsStore::load(&path).current();
    assert_eq!(settings.refresh_interval_seconds, 5);
    assert_eq!(settings.cpu_threshold_percent, 100.0);
    assert_eq!(settings.http_server_token, "abc");
    assert_eq!(settings.memory_threshold_percent, 85.0);

    std::fs::write(&path, "this is [not toml").unwrap();
    let settings = SettingsStore::load(&path).current();
    assert_eq!(
        settings,
        Settings {
            http_server_token: settings.http_server_token.clone(),
            ..Settings::default()
        }
    );
}

#[tokio::test]
async fn test_devices_survive_restart() {
    let dir = tempdir().unwrap();
    let file = StateFile::in_dir(dir.path(), DEVICES_FILE);

    let registry = DeviceRegistry::load(file.clone(), "studio");
    let id = registry
        .upsert_device(Device::remote("Laptop", "laptop.local", "10.0.0.8", 17890))
        .await;
    registry
        .record_success(&id, memory_snapshot(1.0, 50.0), chrono::Utc::now())
        .await;

    let reloaded = DeviceRegistry::load(file, "studio");
    let devices = reloaded.devices().await;
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, LOCAL_DEVICE_ID);

    let laptop = reloaded.device(&id).await.unwrap();
    assert_eq!(laptop.address, "10.0.0.8");
    assert_eq!(laptop.status, DeviceStatus::Online);
    assert!(reloaded.device_metrics(&id).await.is_none());

    assert!(reloaded.remove(&id).await);
    let reloaded = DeviceRegistry::load(StateFile::in_dir(dir.path(), DEVICES_FILE), "studio");
    assert_eq!(reloaded.devices().await.len(), 1);
}

#[tokio::test]
async fn test_silences_survive_restart() {
    let dir = tempdir().unwrap();
    let file = StateFile::in_dir(dir.path(), SILENCE_FILE);

    let silence = SilenceManager::load(file.clone());
    silence.silence(SilenceDuration::Indefinite);
    let schedule = SilenceSchedule::new("22:00", "07:00", [1, 2, 3, 4, 5], true).unwrap();
    silence.add_schedule(schedule.clone());

    let reloaded = SilenceManager::load(file.clone());
    assert!(reloaded.manual_silence().is_some());
    assert!(reloaded.manual_silence().unwrap().until.is_none());
    assert_eq!(reloaded.schedules(), vec![schedule]);
    assert!(reloaded.should_silence());

    reloaded.end_silence();
    assert!(SilenceManager::load(file).manual_silence().is_none());
}

#[tokio::test]
async fn test_corrupt_state_files_start_empty() {
    let dir = tempdir().unwrap();
    for name in [ALERT_HISTORY_FILE, DEVICES_FILE, SILENCE_FILE] {
        std::fs::write(dir.path().join(name), "{ definitely not json").unwrap();
    }

    let history = AlertHistory::load(StateFile::in_dir(dir.path(), ALERT_HISTORY_FILE));
    assert!(history.is_empty().await);

    let registry = DeviceRegistry::load(StateFile::in_dir(dir.path(), DEVICES_FILE), "studio");
    assert_eq!(registry.devices().await.len(), 1);

    let silence = SilenceManager::load(StateFile::in_dir(dir.path(), SILENCE_FILE));
    assert!(silence.manual_silence().is_none());
    assert!(silence.schedules().is_empty());
}

fn engine_in(dir: &std::path::Path, settings: Arc<SettingsStore>) -> AlertEngine {
    AlertEngine::new(
        AlertHistory::load(StateFile::in_dir(dir, ALERT_HISTORY_FILE)),
        SilenceManager::load(StateFile::in_dir(dir, SILENCE_FILE)),
        Arc::new(CountingNotifier::default()),
        settings,
    )
    .with_state_file(StateFile::in_dir(dir, ALERT_STATES_FILE))
}

#[tokio::test]
async fn test_alert_resolves_after_restart() {
    let dir = tempdir().unwrap();
    let settings = Arc::new(SettingsStore::in_memory(Settings {
        consecutive_samples_to_trigger: 1,
        ..Settings::default()
    }));
    let device = hostmon::devices::DeviceIdentity::new(LOCAL_DEVICE_ID, "Studio");
    let t0 = hostmon::util::unix_now().floor();

    let engine = engine_in(dir.path(), settings.clone());
    engine.evaluate(&device, &memory_snapshot(t0, 99.0), t0).await;

    let restarted = engine_in(dir.path(), settings);
    let status = restarted.alert_status(LOCAL_DEVICE_ID, AlertType::Memory).await;
    assert_eq!(status.state, AlertState::Alerting { since: t0 });
    assert_eq!(restarted.history().len().await, 1);

    restarted
        .evaluate(&device, &memory_snapshot(t0 + 30.0, 10.0), t0 + 30.0)
        .await;
    let events = restarted.history().events(&HistoryFilter::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].duration(), Some(chrono::Duration::seconds(30)));
    assert!(!restarted.is_any_alert_active(LOCAL_DEVICE_ID).await);
}
