//! Company-scoped aggregation
//!
//! Same fan-out as the stateless search, restricted to an issue-date window,
//! with every keyed record upserted under the company and an audit row
//! written afterwards.

use super::{record_run, AggregationEngine};
use crate::db;
use crate::models::{
    CompanyAggregationRequest, CompanyAggregationResult, DateRange, UpsertOutcome,
};
use pva_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveTally {
    pub saved: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SaveTally {
    fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.saved += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub async fn run_company_aggregation(
    pool: &SqlitePool,
    engine: &AggregationEngine,
    company_id: Uuid,
    request: &CompanyAggregationRequest,
    requestor: &str,
) -> Result<CompanyAggregationResult> {
    let range = DateRange::parse(&request.start_date, &request.end_date)?;

    let cars = if request.cars.is_empty() {
        db::vehicles::list_company_vehicles(pool, company_id).await?
    } else {
        request.cars.clone()
    };
    if cars.is_empty() {
        return Err(Error::InvalidInput(format!(
            "company {} has no vehicles and none were supplied",
            company_id
        )));
    }

    let plan = engine.plan(&cars, request.states.as_deref())?;
    let tracking_id = request.tracking_id.unwrap_or_else(Uuid::new_v4);
    let outcome = engine.execute(&plan, tracking_id, Some(range)).await;

    let mut tally = SaveTally::default();
    for record in &outcome.violations {
        match db::violations::upsert_violation(pool, company_id, record).await {
            Ok(result) => tally.add(result),
            Err(e) => {
                warn!(
                    company_id = %company_id,
                    key = ?record.dedup_key(),
                    error = %e,
                    "Failed to save violation"
                );
                tally.skipped += 1;
            }
        }
    }

    record_run(pool, &outcome, Some(company_id), requestor).await;

    let message = format!(
        "Processed {} vehicles: {} violations found ({} new, {} updated, {} skipped) between {} and {}",
        outcome.vehicle_count,
        outcome.violations.len(),
        tally.saved,
        tally.updated,
        tally.skipped,
        range.from,
        range.to
    );
    info!(company_id = %company_id, tracking_id = %tracking_id, "{}", message);

    Ok(CompanyAggregationResult {
        tracking_id,
        vehicles_processed: outcome.vehicle_count,
        violations_found: outcome.violations.len(),
        violations_saved: tally.saved,
        violations_updated: tally.updated,
        violations_skipped: tally.skipped,
        message,
        violations: outcome.violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_each_outcome() {
        let mut tally = SaveTally::default();
        for outcome in [
            UpsertOutcome::Created,
            UpsertOutcome::Created,
            UpsertOutcome::Updated,
            UpsertOutcome::Skipped,
        ] {
            tally.add(outcome);
        }
        assert_eq!(
            tally,
            SaveTally {
                saved: 2,
                updated: 1,
                skipped: 1
            }
        );
    }
}
