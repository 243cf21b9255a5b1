pub mod config;
pub mod series;
pub mod status;

use crate::api::ApiError;

/// Fallback for every path without a route
pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
