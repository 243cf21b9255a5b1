//! Rolling metric history

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::api::{ApiState, types::SeriesResponse};
use crate::config::{MAX_SERIES_CAPACITY, MIN_SERIES_CAPACITY};
use crate::store::DEFAULT_SERIES_CAPACITY;
use crate::util::unix_now;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    points: Option<String>,
}

impl SeriesQuery {
    /// Requested points clamped to 1..=300; missing or unparseable means 60.
    pub fn points(&self) -> usize {
        self.points
            .as_deref()
            .and_then(|points| points.trim().parse::<i64>().ok())
            .map(|points| points.clamp(MIN_SERIES_CAPACITY as i64, MAX_SERIES_CAPACITY as i64) as usize)
            .unwrap_or(DEFAULT_SERIES_CAPACITY)
    }
}

/// GET /api/v1/series?points=N
pub async fn get_series(
    State(state): State<ApiState>,
    Query(query): Query<SeriesQuery>,
) -> Json<SeriesResponse> {
    let store = state.store.read().await;
    let timestamp = store
        .latest_snapshot()
        .map(|snapshot| snapshot.timestamp)
        .unwrap_or_else(unix_now);

    Json(SeriesResponse {
        timestamp,
        series: store.series(Some(query.points())),
    })
}
