//! Registry listing

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::finders::FinderInfo;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FinderQuery {
    /// Only finders serving this state (nationwide finders always match)
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderListResponse {
    pub finders: Vec<FinderInfo>,
    pub total_count: usize,
}

/// GET /finders
pub async fn list_finders(
    State(state): State<AppState>,
    Query(query): Query<FinderQuery>,
) -> Json<FinderListResponse> {
    let registry = state.engine.registry();
    let finders: Vec<FinderInfo> = match query.state.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let wanted: HashSet<String> = [code.to_string()].into_iter().collect();
            registry
                .finders_for_states(&wanted)
                .iter()
                .map(|f| f.info().clone())
                .collect()
        }
        _ => registry.infos(),
    };

    Json(FinderListResponse {
        total_count: finders.len(),
        finders,
    })
}

pub fn finder_routes() -> Router<AppState> {
    Router::new().route("/finders", get(list_finders))
}
