//! Read-only HTTP API of the agent
//!
//! Peers and UIs poll this to get the agent's current state.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Guard middleware** on every request, including unknown paths: bearer token (401),
//!   then GET only (405), then routing (404 for unknown paths)
//! - Malformed HTTP is rejected by hyper with 400 before any of this runs
//!
//! ## Endpoints
//!
//! - `GET /api/v1/status` - Latest snapshot and alert states (503 before the first sample)
//! - `GET /api/v1/series?points=N` - Last N values per metric (N in 1..=300, default 60)
//! - `GET /api/v1/config` - Effective thresholds and sampling settings

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ConfigResponse, SeriesResponse, StatusResponse};

use std::net::{IpAddr, SocketAddr};

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Settings;

pub const STATUS_PATH: &str = "/api/v1/status";
pub const SERIES_PATH: &str = "/api/v1/series";
pub const CONFIG_PATH: &str = "/api/v1/config";

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:17890")
    pub bind_addr: SocketAddr,
}

impl ApiConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bind_addr: SocketAddr::new(settings.http_server_bind, settings.http_server_port),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// All routes with the guard applied, ready to serve.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(routes::status::get_status))
        .route(SERIES_PATH, get(routes::series::get_series))
        .route(CONFIG_PATH, get(routes::config::get_config))
        .fallback(routes::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use anyhow::Context;

    info!("starting API server on {}", config.bind_addr);

    let app = router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}

/// Config for a server on the loopback interface with an OS assigned port
pub fn loopback_config() -> ApiConfig {
    ApiConfig {
        bind_addr: SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 0),
    }
}
