//! Stateless violation search

use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use super::requestor::Requestor;
use crate::aggregation::record_run;
use crate::error::ApiResult;
use crate::models::{AggregationRequest, AggregationResult};
use crate::AppState;

/// POST /violations/search
///
/// Fans the cars out to every matching finder and returns whatever came
/// back. Nothing is persisted apart from the audit row.
pub async fn search_violations(
    State(state): State<AppState>,
    requestor: Requestor,
    Json(request): Json<AggregationRequest>,
) -> ApiResult<Json<AggregationResult>> {
    info!(
        cars = request.cars.len(),
        requestor = requestor.as_str(),
        "Violation search requested"
    );

    let outcome = state.engine.aggregate(&request).await?;
    record_run(&state.db, &outcome, None, requestor.as_str()).await;

    Ok(Json(outcome.into_result()))
}

pub fn violation_routes() -> Router<AppState> {
    Router::new().route("/violations/search", post(search_violations))
}
