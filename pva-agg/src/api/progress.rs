//! Progress snapshots for running or recently finished aggregations

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::aggregation::progress::AggregationProgress;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /aggregation/progress/:tracking_id
pub async fn get_progress(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> ApiResult<Json<AggregationProgress>> {
    let tracking_id = Uuid::parse_str(tracking_id.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid tracking id '{}'", tracking_id)))?;

    state
        .progress
        .get(tracking_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no aggregation tracked as {}", tracking_id)))
}

pub fn progress_routes() -> Router<AppState> {
    Router::new().route("/aggregation/progress/:tracking_id", get(get_progress))
}
