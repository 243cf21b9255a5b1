use axum::{Json, extract::State};

use crate::api::{ApiState, types::ConfigResponse};

/// GET /api/v1/config
pub async fn get_config(State(state): State<ApiState>) -> Json<ConfigResponse> {
    Json(ConfigResponse::from(&state.settings.current()))
}
