use std::net::IpAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

const AGENT_PORT: &str = "AGENT_PORT";

const DEFAULT_PORT: u16 = 17890;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Port override from the environment, if set and parseable.
pub fn get_port() -> Option<u16> {
    std::env::var(AGENT_PORT).ok()?.parse().ok()
}

const AGENT_ADDR: &str = "AGENT_ADDR";

/// Bind address override from the environment, if set and parseable.
pub fn get_addr() -> Option<IpAddr> {
    std::env::var(AGENT_ADDR).ok()?.parse().ok()
}

const AGENT_SECRET: &str = "AGENT_SECRET";

pub fn get_secret() -> Option<String> {
    let secret_from_env = std::env::var(AGENT_SECRET);
    secret_from_env.ok().filter(|secret| !secret.is_empty())
}

/// Current wall-clock time as fractional seconds since the unix epoch.
pub fn unix_now() -> f64 {
    to_unix(Utc::now())
}

pub fn to_unix(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Converts epoch seconds back to a UTC instant, saturating at the epoch for bad input.
pub fn from_unix(secs: f64) -> DateTime<Utc> {
    if !secs.is_finite() {
        return DateTime::UNIX_EPOCH;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Fresh 32 character alphanumeric token for the HTTP API.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hostmon")
        .join("settings.toml")
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hostmon")
}
