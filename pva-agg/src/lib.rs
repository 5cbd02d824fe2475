//! pva-agg library interface
//!
//! Parking-violation aggregation: a static registry of per-jurisdiction
//! finders, a bounded fan-out engine over (plate, finder) pairs, record
//! normalization, company-scoped persistence, and the HTTP surface.

pub mod aggregation;
pub mod api;
pub mod db;
pub mod error;
pub mod finders;
pub mod html;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use aggregation::progress::ProgressStore;
use aggregation::{AggregationEngine, EngineOptions};
use api::health::{track_finder_failures, LastFailure};
use axum::Router;
use chrono::{DateTime, Utc};
use pva_common::events::EventBus;
use registry::FinderRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub engine: Arc<AggregationEngine>,
    /// Same store the engine writes to
    pub progress: ProgressStore,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Latest finder failure, reported by `/health`
    pub last_error: LastFailure,
}

impl AppState {
    /// Must be called inside a tokio runtime; spawns the failure tracker
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        registry: FinderRegistry,
        options: EngineOptions,
    ) -> Self {
        let progress = ProgressStore::new();
        let engine = AggregationEngine::new(
            Arc::new(registry),
            event_bus.clone(),
            progress.clone(),
            options,
        );

        let last_error: LastFailure = Arc::new(RwLock::new(None));
        tokio::spawn(track_finder_failures(
            event_bus.subscribe(),
            last_error.clone(),
        ));

        Self {
            db,
            event_bus,
            engine: Arc::new(engine),
            progress,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::violation_routes())
        .merge(api::company_routes())
        .merge(api::progress_routes())
        .merge(api::finder_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
