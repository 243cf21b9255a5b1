use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hostmon::{
    actors::{DeviceDiscovery, RemotePoller, SamplingCoordinator},
    alerts::{AlertEngine, AlertHistory, SilenceManager, TerminalBell},
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Settings, SettingsProvider, SettingsStore, read_settings_file, warn_on_repaired},
    devices::{DeviceRegistry, LOCAL_DEVICE_ID},
    samplers::SamplerSet,
    storage::{ALERT_HISTORY_FILE, ALERT_STATES_FILE, DEVICES_FILE, SILENCE_FILE, StateFile},
    store::MetricStore,
    util::{default_config_path, default_data_dir},
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Host monitoring agent")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for alert history, devices and silence state
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Port of the HTTP API, overrides the settings file
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not serve the HTTP API
    #[arg(long)]
    no_server: bool,

    /// Probe the local network for other agents
    #[arg(long)]
    discover: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("hostmon", level),
        ("hostmon_agent", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn local_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Loads settings, applies environment and command line overrides and persists the result.
fn load_settings(args: &Args) -> Arc<SettingsStore> {
    let path = args.config.clone().unwrap_or_else(default_config_path);

    if let Ok(Some(original)) = read_settings_file(&path) {
        warn_on_repaired(&original, &original.clone().sanitized());
    }

    let store = SettingsStore::load(&path);
    info!("settings at {}", path.display());

    store.update(&|settings: &mut Settings| {
        *settings = settings.clone().with_env_overrides();
        if let Some(port) = args.port {
            settings.http_server_port = port;
        }
        if args.no_server {
            settings.http_server_enabled = false;
        }
        if args.discover {
            settings.discovery_enabled = true;
        }
    });

    Arc::new(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let settings = load_settings(&args);
    let current = settings.current();
    let provider: Arc<dyn SettingsProvider> = settings.clone();

    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    info!("state in {}", data_dir.display());

    let history = AlertHistory::load(StateFile::in_dir(&data_dir, ALERT_HISTORY_FILE));
    let silence = SilenceManager::load(StateFile::in_dir(&data_dir, SILENCE_FILE));
    let engine = AlertEngine::new(history, silence, Arc::new(TerminalBell), provider.clone())
        .with_state_file(StateFile::in_dir(&data_dir, ALERT_STATES_FILE));

    let registry = DeviceRegistry::load(
        StateFile::in_dir(&data_dir, DEVICES_FILE),
        &local_hostname(),
    );
    let local = registry
        .local_device()
        .await
        .context("local device missing from registry")?;

    let store = MetricStore::shared(current.series_capacity);

    let coordinator = SamplingCoordinator::new(
        SamplerSet::system(),
        store.clone(),
        engine.clone(),
        provider.clone(),
        local.identity(),
    );
    let poller = RemotePoller::new(
        registry.clone(),
        engine.clone(),
        store.clone(),
        provider.clone(),
    )?;
    let discovery = DeviceDiscovery::new(registry.clone(), provider.clone())?;

    coordinator.start();
    poller.start();
    if current.discovery_enabled {
        discovery.start();
    }

    if current.http_server_enabled {
        let state = ApiState::new(store.clone(), engine.clone(), provider.clone(), LOCAL_DEVICE_ID);
        match spawn_api_server(ApiConfig::from_settings(&current), state).await {
            Ok(addr) => info!("serving agent API on {addr}"),
            Err(e) => error!("API server not started: {e:#}"),
        }
    } else {
        warn!("HTTP API disabled");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    discovery.stop();
    poller.stop();
    coordinator.stop();

    Ok(())
}
