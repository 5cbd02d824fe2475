//! Company-scoped endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::requestor::Requestor;
use crate::aggregation::company::run_company_aggregation;
use crate::db::runs::list_runs;
use crate::db::violations::{list_violations, ViolationFilter};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AggregationRunRecord, CompanyAggregationRequest, CompanyAggregationResult, PersistedViolation,
};
use crate::AppState;

const DEFAULT_RUN_LIMIT: u32 = 50;
const MAX_RUN_LIMIT: u32 = 500;

fn parse_company_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("invalid company id '{}'", raw)))
}

/// POST /companies/:company_id/violations/aggregate
pub async fn aggregate_company(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    requestor: Requestor,
    Json(request): Json<CompanyAggregationRequest>,
) -> ApiResult<Json<CompanyAggregationResult>> {
    let company_id = parse_company_id(&company_id)?;
    info!(
        company_id = %company_id,
        cars = request.cars.len(),
        start_date = %request.start_date,
        end_date = %request.end_date,
        requestor = requestor.as_str(),
        "Company aggregation requested"
    );

    let result = run_company_aggregation(
        &state.db,
        &state.engine,
        company_id,
        &request,
        requestor.as_str(),
    )
    .await?;

    Ok(Json(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationListResponse {
    pub violations: Vec<PersistedViolation>,
    pub total_count: usize,
}

/// GET /companies/:company_id/violations
pub async fn list_company_violations(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(filter): Query<ViolationFilter>,
) -> ApiResult<Json<ViolationListResponse>> {
    let company_id = parse_company_id(&company_id)?;
    let violations = list_violations(&state.db, company_id, &filter).await?;

    Ok(Json(ViolationListResponse {
        total_count: violations.len(),
        violations,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunListResponse {
    pub runs: Vec<AggregationRunRecord>,
}

/// GET /companies/:company_id/aggregation-runs
pub async fn list_company_runs(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<RunListQuery>,
) -> ApiResult<Json<RunListResponse>> {
    let company_id = parse_company_id(&company_id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUN_LIMIT)
        .clamp(1, MAX_RUN_LIMIT);
    let runs = list_runs(&state.db, company_id, limit).await?;

    Ok(Json(RunListResponse { runs }))
}

pub fn company_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/companies/:company_id/violations/aggregate",
            post(aggregate_company),
        )
        .route("/companies/:company_id/violations", get(list_company_violations))
        .route("/companies/:company_id/aggregation-runs", get(list_company_runs))
}
