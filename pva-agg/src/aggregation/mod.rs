//! Fan-out aggregation engine
//!
//! A request becomes a plan: the normalized plate queries, the requested
//! state set, and the registry finders matching that set. Execution runs
//! every (query, finder) pair through a bounded worker pool
//! (`buffer_unordered`), appending each pair's records to a shared
//! accumulator. Finder failures never reach the engine (see
//! [`RegisteredFinder::find`]); the only way a pair contributes nothing is an
//! empty result or the optional batch deadline.
//!
//! Result order is not deterministic.

pub mod company;
pub mod progress;

use crate::finders::RegisteredFinder;
use crate::models::{
    normalize_state, AggregationRequest, AggregationResult, AggregationRunRecord, CarInput,
    DateRange, ViolationQuery, ViolationRecord,
};
use crate::registry::FinderRegistry;
use futures::stream::{self, StreamExt};
use progress::ProgressStore;
use pva_common::config::AggregationConfig;
use pva_common::events::{EventBus, PvaEvent};
use pva_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Engine tuning
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// In-flight (query, finder) pairs
    pub max_concurrency: usize,
    /// Abandon unfinished pairs after this long
    pub batch_deadline: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&AggregationConfig::default())
    }
}

impl EngineOptions {
    pub fn from_config(config: &AggregationConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            batch_deadline: config.batch_deadline(),
        }
    }
}

/// Validated work for one aggregation
#[derive(Clone)]
pub struct AggregationPlan {
    pub queries: Vec<ViolationQuery>,
    pub states: HashSet<String>,
    pub finders: Vec<RegisteredFinder>,
}

impl AggregationPlan {
    pub fn vehicle_count(&self) -> usize {
        self.queries.len()
    }

    pub fn finder_count(&self) -> usize {
        self.finders.len()
    }

    /// vehicles x matched finders
    pub fn requests_count(&self) -> usize {
        self.queries.len() * self.finders.len()
    }
}

/// What one execution produced
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub tracking_id: Uuid,
    pub violations: Vec<ViolationRecord>,
    pub vehicle_count: usize,
    pub finders_count: usize,
    pub requests_count: usize,
    /// Pairs cut off by the batch deadline
    pub abandoned_pairs: usize,
}

impl BatchOutcome {
    pub fn into_result(self) -> AggregationResult {
        AggregationResult {
            total_count: self.violations.len(),
            violations: self.violations,
        }
    }

    /// Audit row for this run
    pub fn run_record(&self, company_id: Option<Uuid>, requestor: &str) -> AggregationRunRecord {
        AggregationRunRecord {
            id: Uuid::new_v4(),
            company_id,
            vehicle_count: self.vehicle_count,
            requests_count: self.requests_count,
            finders_count: self.finders_count,
            violations_found: self.violations.len(),
            requestor: requestor.to_string(),
            created_at: chrono::Utc::now(),
        }
    }
}

pub struct AggregationEngine {
    registry: Arc<FinderRegistry>,
    events: EventBus,
    progress: ProgressStore,
    options: EngineOptions,
}

impl AggregationEngine {
    pub fn new(
        registry: Arc<FinderRegistry>,
        events: EventBus,
        progress: ProgressStore,
        options: EngineOptions,
    ) -> Self {
        Self {
            registry,
            events,
            progress,
            options,
        }
    }

    pub fn registry(&self) -> &FinderRegistry {
        &self.registry
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Validate and resolve a request; no network I/O
    ///
    /// States come from `states` when given, else from the cars. Blank
    /// plates are dropped and duplicate (plate, state) pairs collapse.
    pub fn plan(&self, cars: &[CarInput], states: Option<&[String]>) -> Result<AggregationPlan> {
        if cars.is_empty() {
            return Err(Error::InvalidInput(
                "at least one car is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let queries: Vec<ViolationQuery> = cars
            .iter()
            .filter_map(|car| ViolationQuery::new(&car.license_plate, car.state.as_deref()))
            .filter(|q| seen.insert(q.clone()))
            .collect();
        if queries.is_empty() {
            return Err(Error::InvalidInput(
                "at least one car with a license plate is required".to_string(),
            ));
        }

        let states: HashSet<String> = match states {
            Some(explicit) if explicit.iter().any(|s| !s.trim().is_empty()) => explicit
                .iter()
                .map(|s| normalize_state(s))
                .filter(|s| !s.is_empty())
                .collect(),
            _ => queries
                .iter()
                .map(|q| q.state.clone())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        if states.is_empty() {
            return Err(Error::InvalidInput(
                "no state could be resolved: pass `states` or give each car a state".to_string(),
            ));
        }

        let finders = self.registry.finders_for_states(&states);

        Ok(AggregationPlan {
            queries,
            states,
            finders,
        })
    }

    /// Run every (query, finder) pair of `plan`
    ///
    /// With `range`, each pair's records are filtered by
    /// [`DateRange::contains`] before accumulation.
    pub async fn execute(
        &self,
        plan: &AggregationPlan,
        tracking_id: Uuid,
        range: Option<DateRange>,
    ) -> BatchOutcome {
        let total = plan.requests_count();
        self.progress.create(tracking_id, total).await;
        self.events.emit_lossy(PvaEvent::AggregationStarted {
            tracking_id,
            vehicle_count: plan.vehicle_count(),
            finder_count: plan.finder_count(),
            timestamp: chrono::Utc::now(),
        });

        info!(
            tracking_id = %tracking_id,
            vehicles = plan.vehicle_count(),
            finders = plan.finder_count(),
            pairs = total,
            "Aggregation started"
        );

        let accumulator: Arc<Mutex<Vec<ViolationRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicUsize::new(0));

        let pairs: Vec<(ViolationQuery, RegisteredFinder)> = plan
            .queries
            .iter()
            .flat_map(|q| plan.finders.iter().map(move |f| (q.clone(), f.clone())))
            .collect();

        let work = stream::iter(pairs)
            .map(|(query, finder)| {
                let accumulator = Arc::clone(&accumulator);
                let completed = Arc::clone(&completed);
                let progress = self.progress.clone();
                async move {
                    let mut records = finder.find(&query).await;
                    if let Some(range) = range {
                        records.retain(|r| range.contains(r));
                    }

                    let found = records.len();
                    if found > 0 {
                        accumulator.lock().await.extend(records);
                    }
                    completed.fetch_add(1, Ordering::Relaxed);
                    progress.record_pair(tracking_id, found).await;
                }
            })
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect::<Vec<()>>();

        match self.options.batch_deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, work).await.is_err() {
                    let abandoned = total.saturating_sub(completed.load(Ordering::Relaxed));
                    warn!(
                        tracking_id = %tracking_id,
                        deadline_secs = deadline.as_secs_f64(),
                        abandoned_pairs = abandoned,
                        "Aggregation deadline reached, returning partial results"
                    );
                }
            }
            None => {
                work.await;
            }
        }

        let violations = std::mem::take(&mut *accumulator.lock().await);
        let abandoned_pairs = total.saturating_sub(completed.load(Ordering::Relaxed));

        self.progress.finish(tracking_id).await;
        self.events.emit_lossy(PvaEvent::AggregationCompleted {
            tracking_id,
            requests_count: total,
            violations_found: violations.len(),
            timestamp: chrono::Utc::now(),
        });

        info!(
            tracking_id = %tracking_id,
            violations = violations.len(),
            abandoned_pairs,
            "Aggregation completed"
        );

        BatchOutcome {
            tracking_id,
            violations,
            vehicle_count: plan.vehicle_count(),
            finders_count: plan.finder_count(),
            requests_count: total,
            abandoned_pairs,
        }
    }

    /// Stateless aggregation: plan + execute
    pub async fn aggregate(&self, request: &AggregationRequest) -> Result<BatchOutcome> {
        let plan = self.plan(&request.cars, request.states.as_deref())?;
        let tracking_id = request.tracking_id.unwrap_or_else(Uuid::new_v4);
        Ok(self.execute(&plan, tracking_id, None).await)
    }
}

/// Write the audit row; failures are logged, never returned
pub async fn record_run(
    db: &SqlitePool,
    outcome: &BatchOutcome,
    company_id: Option<Uuid>,
    requestor: &str,
) {
    let run = outcome.run_record(company_id, requestor);
    if let Err(e) = crate::db::runs::insert_run(db, &run).await {
        warn!(
            tracking_id = %outcome.tracking_id,
            company_id = ?company_id,
            error = %e,
            "Failed to write aggregation audit row"
        );
    }
}
