//! Progress tracking for running aggregations
//!
//! Injected into the engine and the API; keyed by tracking id. Clients poll
//! `GET /aggregation/progress/{trackingId}` while a long run is in flight.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Finished entries older than this are dropped on the next `create`
pub const FINISHED_RETENTION_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationProgress {
    pub tracking_id: Uuid,
    pub total_pairs: usize,
    pub completed_pairs: usize,
    pub violations_found: usize,
    pub finished: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct ProgressStore {
    entries: Arc<RwLock<HashMap<Uuid, AggregationProgress>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking; replaces any entry with the same id
    pub async fn create(&self, tracking_id: Uuid, total_pairs: usize) {
        let mut entries = self.entries.write().await;

        let cutoff = Utc::now() - Duration::minutes(FINISHED_RETENTION_MINUTES);
        entries.retain(|_, p| !p.finished_at.is_some_and(|at| at < cutoff));

        entries.insert(
            tracking_id,
            AggregationProgress {
                tracking_id,
                total_pairs,
                completed_pairs: 0,
                violations_found: 0,
                finished: false,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
    }

    /// One (query, finder) pair done with `found` records
    pub async fn record_pair(&self, tracking_id: Uuid, found: usize) {
        if let Some(progress) = self.entries.write().await.get_mut(&tracking_id) {
            progress.completed_pairs += 1;
            progress.violations_found += found;
        }
    }

    pub async fn finish(&self, tracking_id: Uuid) {
        if let Some(progress) = self.entries.write().await.get_mut(&tracking_id) {
            progress.finished = true;
            progress.finished_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, tracking_id: Uuid) -> Option<AggregationProgress> {
        self.entries.read().await.get(&tracking_id).cloned()
    }

    pub async fn remove(&self, tracking_id: Uuid) -> Option<AggregationProgress> {
        self.entries.write().await.remove(&tracking_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
