use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::util::{generate_token, get_default_port};

/// Refresh intervals the sampling coordinator accepts
pub const VALID_REFRESH_INTERVALS: [u64; 3] = [5, 10, 30];

pub const MIN_CONSECUTIVE_SAMPLES: u32 = 1;
pub const MAX_CONSECUTIVE_SAMPLES: u32 = 10;
pub const MIN_REPEAT_MINUTES: u32 = 1;
pub const MAX_REPEAT_MINUTES: u32 = 60;
pub const MIN_PORT: u16 = 1024;
pub const MAX_PORT: u16 = 65535;
pub const MIN_SERIES_CAPACITY: usize = 1;
pub const MAX_SERIES_CAPACITY: usize = 300;

/// Probe target meaning "is there a route to the outside at all"
pub const GATEWAY_TARGET: &str = "gateway";

/// Agent settings
///
/// Every write through a [`SettingsProvider`] passes [`Settings::sanitized`], so readers
/// can rely on all values being inside their documented ranges.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sampling period in seconds, one of 5, 10 or 30
    pub refresh_interval_seconds: u64,

    pub memory_threshold_percent: f64,
    pub cpu_threshold_percent: f64,
    pub disk_threshold_percent: f64,

    /// Consecutive violating samples before an alert fires (1-10)
    pub consecutive_samples_to_trigger: u32,

    /// Minutes between repeated notifications of an ongoing alert (1-60)
    pub alert_repeat_minutes: u32,

    /// `"gateway"` or a host name probed on ports 80/443
    pub network_probe_target: String,

    pub http_server_enabled: bool,
    pub http_server_bind: IpAddr,
    pub http_server_port: u16,
    pub http_server_token: String,

    /// Points kept per metric series (1-300)
    pub series_capacity: usize,

    pub discovery_enabled: bool,

    /// Host prefixes probed as `<prefix>.local`
    pub discovery_hostnames: Vec<String>,
}

// Hand-written so the token never ends up in logs
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("refresh_interval_seconds", &self.refresh_interval_seconds)
            .field("memory_threshold_percent", &self.memory_threshold_percent)
            .field("cpu_threshold_percent", &self.cpu_threshold_percent)
            .field("disk_threshold_percent", &self.disk_threshold_percent)
            .field(
                "consecutive_samples_to_trigger",
                &self.consecutive_samples_to_trigger,
            )
            .field("alert_repeat_minutes", &self.alert_repeat_minutes)
            .field("network_probe_target", &self.network_probe_target)
            .field("http_server_enabled", &self.http_server_enabled)
            .field("http_server_bind", &self.http_server_bind)
            .field("http_server_port", &self.http_server_port)
            .field("http_server_token", &"<redacted>")
            .field("series_capacity", &self.series_capacity)
            .field("discovery_enabled", &self.discovery_enabled)
            .field("discovery_hostnames", &self.discovery_hostnames)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 5,
            memory_threshold_percent: 85.0,
            cpu_threshold_percent: 90.0,
            disk_threshold_percent: 90.0,
            consecutive_samples_to_trigger: 2,
            alert_repeat_minutes: 3,
            network_probe_target: GATEWAY_TARGET.to_string(),
            http_server_enabled: true,
            http_server_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_server_port: get_default_port(),
            http_server_token: generate_token(),
            series_capacity: 60,
            discovery_enabled: false,
            discovery_hostnames: default_discovery_hostnames(),
        }
    }
}

fn default_discovery_hostnames() -> Vec<String> {
    [
        "macbook",
        "macbook-pro",
        "macbook-air",
        "imac",
        "mac-mini",
        "mac-studio",
        "macpro",
    ]
    .iter()
    .map(|prefix| prefix.to_string())
    .collect()
}

fn clamp_percent(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(0.0, 100.0)
}

impl Settings {
    /// Returns a copy with every field forced into its valid range.
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings {
            http_server_token: String::new(),
            ..Settings::default()
        };

        if !VALID_REFRESH_INTERVALS.contains(&self.refresh_interval_seconds) {
            self.refresh_interval_seconds = defaults.refresh_interval_seconds;
        }

        self.memory_threshold_percent =
            clamp_percent(self.memory_threshold_percent, defaults.memory_threshold_percent);
        self.cpu_threshold_percent =
            clamp_percent(self.cpu_threshold_percent, defaults.cpu_threshold_percent);
        self.disk_threshold_percent =
            clamp_percent(self.disk_threshold_percent, defaults.disk_threshold_percent);

        self.consecutive_samples_to_trigger = self
            .consecutive_samples_to_trigger
            .clamp(MIN_CONSECUTIVE_SAMPLES, MAX_CONSECUTIVE_SAMPLES);
        self.alert_repeat_minutes = self
            .alert_repeat_minutes
            .clamp(MIN_REPEAT_MINUTES, MAX_REPEAT_MINUTES);

        let target = self.network_probe_target.trim();
        self.network_probe_target = if target.is_empty() {
            GATEWAY_TARGET.to_string()
        } else {
            target.to_string()
        };

        self.http_server_port = self.http_server_port.clamp(MIN_PORT, MAX_PORT);
        if self.http_server_token.trim().is_empty() {
            self.http_server_token = generate_token();
        }

        self.series_capacity = self
            .series_capacity
            .clamp(MIN_SERIES_CAPACITY, MAX_SERIES_CAPACITY);

        self.discovery_hostnames
            .retain(|hostname| !hostname.trim().is_empty());

        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Repeat interval for ongoing alerts in seconds
    pub fn alert_repeat_secs(&self) -> f64 {
        f64::from(self.alert_repeat_minutes) * 60.0
    }

    /// Applies `AGENT_PORT`, `AGENT_ADDR` and `AGENT_SECRET` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = crate::util::get_port() {
            self.http_server_port = port;
        }
        if let Some(addr) = crate::util::get_addr() {
            self.http_server_bind = addr;
        }
        if let Some(secret) = crate::util::get_secret() {
            self.http_server_token = secret;
        }
        self.sanitized()
    }
}

/// Typed access to the agent settings.
///
/// Implementations validate on write; the core only ever reads through this trait and
/// never caches values across ticks, so changes take effect on the next evaluation.
pub trait SettingsProvider: Send + Sync {
    /// Snapshot of the current settings
    fn current(&self) -> Settings;

    /// Replaces all settings; values are sanitized before they are stored.
    fn replace(&self, settings: Settings);

    fn update(&self, change: &dyn Fn(&mut Settings)) {
        let mut settings = self.current();
        change(&mut settings);
        self.replace(settings);
    }

    fn refresh_interval_seconds(&self) -> u64 {
        self.current().refresh_interval_seconds
    }

    fn set_refresh_interval_seconds(&self, seconds: u64) {
        self.update(&|s| s.refresh_interval_seconds = seconds);
    }

    fn set_thresholds(&self, memory_percent: f64, cpu_percent: f64, disk_percent: f64) {
        self.update(&|s| {
            s.memory_threshold_percent = memory_percent;
            s.cpu_threshold_percent = cpu_percent;
            s.disk_threshold_percent = disk_percent;
        });
    }

    fn set_consecutive_samples(&self, samples: u32) {
        self.update(&|s| s.consecutive_samples_to_trigger = samples);
    }

    fn set_alert_repeat_minutes(&self, minutes: u32) {
        self.update(&|s| s.alert_repeat_minutes = minutes);
    }

    fn set_network_probe_target(&self, target: &str) {
        self.update(&|s| s.network_probe_target = target.to_string());
    }

    fn set_http_server(&self, enabled: bool, port: u16) {
        self.update(&|s| {
            s.http_server_enabled = enabled;
            s.http_server_port = port;
        });
    }

    fn set_http_server_token(&self, token: &str) {
        self.update(&|s| s.http_server_token = token.to_string());
    }

    fn regenerate_token(&self) {
        let token = generate_token();
        self.set_http_server_token(&token);
    }

    fn set_series_capacity(&self, capacity: usize) {
        self.update(&|s| s.series_capacity = capacity);
    }

    /// Restores defaults for everything except the API token.
    fn reset_to_defaults(&self) {
        let token = self.current().http_server_token;
        self.replace(Settings {
            http_server_token: token,
            ..Settings::default()
        });
    }
}

/// Settings kept in memory and optionally mirrored to a TOML file.
#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<Settings>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings.sanitized()),
            path: None,
        }
    }

    /// Loads settings from `path`, falling back to defaults if the file is missing or
    /// unreadable. The (possibly repaired) settings are written back.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_settings_file(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("no settings file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                error!("{e:#}, using defaults");
                Settings::default()
            }
        };

        let store = Self {
            settings: RwLock::new(settings.sanitized()),
            path: Some(path),
        };
        store.persist();
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = write_settings_file(path, &self.current()) {
            error!("failed to save settings: {e:#}");
        }
    }
}

impl SettingsProvider for SettingsStore {
    fn current(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, settings: Settings) {
        let settings = settings.sanitized();
        trace!("settings updated: {settings:?}");
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        self.persist();
    }
}

pub fn read_settings_file(path: &Path) -> anyhow::Result<Option<Settings>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let settings = toml::from_str::<Settings>(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(settings))
}

pub fn write_settings_file(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(settings).context("failed to encode settings")?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Logs settings that were out of range in the file so operators notice typos.
pub fn warn_on_repaired(original: &Settings, sanitized: &Settings) {
    if original.refresh_interval_seconds != sanitized.refresh_interval_seconds {
        warn!(
            "refresh interval {}s is not one of {VALID_REFRESH_INTERVALS:?}, using {}s",
            original.refresh_interval_seconds, sanitized.refresh_interval_seconds
        );
    }
    if original.http_server_port != sanitized.http_server_port {
        warn!(
            "port {} out of range, using {}",
            original.http_server_port, sanitized.http_server_port
        );
    }
}
