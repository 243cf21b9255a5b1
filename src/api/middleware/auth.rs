//! Bearer token authentication and method guard

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::{ApiError, ApiState};

/// Request guard for every route, including unknown paths
///
/// Checks the Bearer token against the configured secret first (401), then rejects any
/// method other than GET (405). Routing only happens after both checks pass.
pub async fn auth_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected_token = state.settings.current().http_server_token;

    // Get Authorization header
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            debug!("request without bearer token");
            ApiError::Unauthorized
        })?;

    if token.trim() != expected_token {
        debug!("request with invalid token");
        return Err(ApiError::Unauthorized);
    }

    if request.method() != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }

    Ok(next.run(request).await)
}

/// Token of a `Bearer` authorization value. The scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
