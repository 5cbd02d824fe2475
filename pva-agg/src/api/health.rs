//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use pva_common::events::PvaEvent;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::AppState;

/// Most recent finder failure seen on the event bus
#[derive(Debug, Clone, Serialize)]
pub struct FailureNote {
    pub finder: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

pub type LastFailure = Arc<RwLock<Option<FailureNote>>>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Module name ("pva-agg")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    pub uptime_seconds: u64,
    /// Registered finders
    pub finders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FailureNote>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "pva-agg".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        finders: state.engine.registry().len(),
        last_error: state.last_error.read().await.clone(),
    })
}

/// Keep `slot` pointed at the latest `FinderFailed` event
///
/// Runs until the bus closes.
pub async fn track_finder_failures(mut rx: broadcast::Receiver<PvaEvent>, slot: LastFailure) {
    loop {
        match rx.recv().await {
            Ok(PvaEvent::FinderFailed {
                finder_name,
                error,
                timestamp,
                ..
            }) => {
                *slot.write().await = Some(FailureNote {
                    finder: finder_name,
                    error,
                    at: timestamp,
                });
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Failure tracker lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
