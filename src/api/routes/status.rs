//! Current snapshot and alert status

use axum::{Json, extract::State};

use crate::api::{ApiError, ApiResult, ApiState, types::StatusResponse};

/// GET /api/v1/status
///
/// 503 until the first sample has been taken
pub async fn get_status(State(state): State<ApiState>) -> ApiResult<Json<StatusResponse>> {
    let snapshot = state
        .store
        .read()
        .await
        .latest_snapshot()
        .cloned()
        .ok_or_else(|| ApiError::Unavailable("no snapshot available yet".to_string()))?;

    let statuses = state.engine.all_alert_statuses(&state.local_device_id).await;

    Ok(Json(StatusResponse::new(&snapshot, &statuses)))
}
