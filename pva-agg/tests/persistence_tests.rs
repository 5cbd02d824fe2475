//! Company-scoped persistence: dedup round trip and audit trail

mod helpers;

use helpers::{engine, memory_pool, notice, Script, ScriptedFinder};
use pva_agg::aggregation::company::run_company_aggregation;
use pva_agg::aggregation::EngineOptions;
use pva_agg::db::violations::{count_by_key, list_violations, upsert_violation, ViolationFilter};
use pva_agg::finders::Finder;
use pva_agg::models::{CarInput, CompanyAggregationRequest, PaymentStatus, UpsertOutcome, ViolationRecord};
use pva_common::events::EventBus;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

fn january(cars: Vec<CarInput>) -> CompanyAggregationRequest {
    CompanyAggregationRequest {
        cars,
        states: Some(vec!["NY".to_string()]),
        start_date: "2024-01-01".to_string(),
        end_date: "2024-01-31".to_string(),
        tracking_id: None,
    }
}

async fn run_once(pool: &sqlx::SqlitePool, company: Uuid, amount: &str) -> (usize, usize) {
    let events = EventBus::new(16);
    let finder = ScriptedFinder::new(
        "NY Finder",
        "NY",
        1,
        Script::Records(vec![notice(1, "NY", "N1", (2024, 1, 15), amount)]),
    );
    let finders: Vec<Arc<dyn Finder>> = vec![finder];
    let engine = engine(finders, &events, EngineOptions::default());

    let result = run_company_aggregation(
        pool,
        &engine,
        company,
        &january(vec![CarInput::new("ABC123", Some("NY"))]),
        "tester",
    )
    .await
    .unwrap();
    (result.violations_saved, result.violations_updated)
}

#[tokio::test]
async fn test_second_aggregation_updates_existing_row() {
    let pool = memory_pool().await;
    let company = Uuid::new_v4();

    assert_eq!(run_once(&pool, company, "65.00").await, (1, 0));
    assert_eq!(run_once(&pool, company, "115.00").await, (0, 1));

    assert_eq!(count_by_key(&pool, company, "N1").await.unwrap(), 1);
    let stored = list_violations(&pool, company, &ViolationFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.amount, "115.00".parse::<Decimal>().unwrap());
    assert_eq!(stored[0].company_id, company);

    let runs = pva_agg::db::runs::list_runs(&pool, company, 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].created_at >= runs[1].created_at);
}

#[tokio::test]
async fn test_unkeyed_records_are_counted_as_skipped() {
    let pool = memory_pool().await;
    let company = Uuid::new_v4();
    let events = EventBus::new(16);

    let mut anonymous = ViolationRecord::new(1, "ABC123", "NY");
    anonymous.amount = "30.00".parse().unwrap();
    let finder = ScriptedFinder::new(
        "NY Finder",
        "NY",
        1,
        Script::Records(vec![
            anonymous.settle(None),
            notice(1, "NY", "N2", (2024, 1, 20), "40.00"),
        ]),
    );
    let finders: Vec<Arc<dyn Finder>> = vec![finder];
    let engine = engine(finders, &events, EngineOptions::default());

    let result = run_company_aggregation(
        &pool,
        &engine,
        company,
        &january(vec![CarInput::new("ABC123", Some("NY"))]),
        "tester",
    )
    .await
    .unwrap();

    assert_eq!(result.violations_found, 2);
    assert_eq!(result.violations_saved, 1);
    assert_eq!(result.violations_skipped, 1);
}

#[tokio::test]
async fn test_paid_record_round_trips_inactive() {
    let pool = memory_pool().await;
    let company = Uuid::new_v4();

    let mut record = notice(2, "MD", "P-77", (2024, 4, 2), "52.00");
    record.payment_status = PaymentStatus::Paid;
    let record = record.settle(Some(Decimal::ZERO));

    assert_eq!(
        upsert_violation(&pool, company, &record).await.unwrap(),
        UpsertOutcome::Created
    );

    let stored = list_violations(&pool, company, &ViolationFilter::default())
        .await
        .unwrap();
    assert_eq!(stored[0].record.payment_status, PaymentStatus::Paid);
    assert!(!stored[0].record.is_active);
    assert_eq!(stored[0].record.amount, "52.00".parse::<Decimal>().unwrap());
    assert_eq!(stored[0].record.issue_date, record.issue_date);
}
