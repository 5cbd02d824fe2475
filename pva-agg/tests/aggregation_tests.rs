//! Fan-out behavior of the aggregation engine against scripted finders

mod helpers;

use helpers::{engine, memory_pool, notice, Script, ScriptedFinder};
use pva_agg::aggregation::company::run_company_aggregation;
use pva_agg::aggregation::EngineOptions;
use pva_agg::finders::Finder;
use pva_agg::models::{AggregationRequest, CarInput, CompanyAggregationRequest};
use pva_common::events::{EventBus, PvaEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn request(cars: Vec<CarInput>, states: Option<Vec<&str>>) -> AggregationRequest {
    AggregationRequest {
        cars,
        states: states.map(|s| s.into_iter().map(str::to_string).collect()),
        tracking_id: None,
    }
}

#[tokio::test]
async fn test_failing_finder_does_not_affect_siblings() {
    let events = EventBus::new(32);
    let mut rx = events.subscribe();

    let healthy_a = ScriptedFinder::new(
        "Healthy A",
        "NY",
        1,
        Script::Records(vec![notice(1, "NY", "A-1", (2024, 1, 2), "50.00")]),
    );
    let broken = ScriptedFinder::new("Broken Portal", "NY", 2, Script::Fail);
    let healthy_b = ScriptedFinder::new(
        "Healthy B",
        "USA",
        3,
        Script::Records(vec![
            notice(3, "NY", "B-1", (2024, 1, 3), "20.00"),
            notice(3, "NY", "B-2", (2024, 1, 4), "30.00"),
        ]),
    );
    let finders: Vec<Arc<dyn Finder>> = vec![healthy_a.clone(), broken.clone(), healthy_b.clone()];
    let engine = engine(finders, &events, EngineOptions::default());

    let outcome = engine
        .aggregate(&request(vec![CarInput::new("ABC123", Some("NY"))], None))
        .await
        .unwrap();

    let keys: HashSet<String> = outcome
        .violations
        .iter()
        .filter_map(|v| v.dedup_key().map(str::to_string))
        .collect();
    assert_eq!(keys, ["A-1", "B-1", "B-2"].iter().map(|s| s.to_string()).collect());
    assert_eq!(outcome.requests_count, 3);
    assert_eq!(broken.calls(), 1);

    let mut failed_finders = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PvaEvent::FinderFailed {
            finder_name,
            license_plate,
            state,
            ..
        } = event
        {
            assert_eq!(license_plate, "ABC123");
            assert_eq!(state, "NY");
            failed_finders.push(finder_name);
        }
    }
    assert_eq!(failed_finders, vec!["Broken Portal".to_string()]);
}

#[tokio::test]
async fn test_panicking_finder_is_contained() {
    let events = EventBus::new(32);
    let ok = ScriptedFinder::new(
        "Steady",
        "NJ",
        1,
        Script::Records(vec![notice(1, "NJ", "S-1", (2024, 2, 1), "15.00")]),
    );
    let panics = ScriptedFinder::new("Fragile", "NJ", 2, Script::Panic);
    let finders: Vec<Arc<dyn Finder>> = vec![ok, panics];
    let engine = engine(finders, &events, EngineOptions::default());

    let outcome = engine
        .aggregate(&request(vec![CarInput::new("JRX441", Some("NJ"))], None))
        .await
        .unwrap();
    assert_eq!(outcome.violations.len(), 1);
}

#[tokio::test]
async fn test_only_matching_state_finders_are_invoked() {
    let events = EventBus::new(32);
    let ny = ScriptedFinder::new(
        "NY Finder",
        "NY",
        1,
        Script::Records(vec![notice(1, "NY", "NY-1", (2024, 1, 15), "65.00")]),
    );
    let ca = ScriptedFinder::new("CA Finder", "CA", 2, Script::Records(Vec::new()));
    let finders: Vec<Arc<dyn Finder>> = vec![ny.clone(), ca.clone()];
    let engine = engine(finders, &events, EngineOptions::default());

    let result = engine
        .aggregate(&request(
            vec![CarInput::new("ABC123", Some("NY"))],
            Some(vec!["NY"]),
        ))
        .await
        .unwrap()
        .into_result();

    assert_eq!(result.total_count, 1);
    assert_eq!(result.violations[0].notice_number.as_deref(), Some("NY-1"));
    assert_eq!(result.violations[0].tag, "ABC123");
    assert_eq!(ny.calls(), 1);
    assert_eq!(ca.calls(), 0);
}

#[tokio::test]
async fn test_blank_plates_are_never_dispatched() {
    let events = EventBus::new(32);
    let finder = ScriptedFinder::new("Counter", "NY", 1, Script::Records(Vec::new()));
    let finders: Vec<Arc<dyn Finder>> = vec![finder.clone()];
    let engine = engine(finders, &events, EngineOptions::default());

    engine
        .aggregate(&request(
            vec![
                CarInput::new("   ", Some("NY")),
                CarInput::new("ABC123", Some("NY")),
            ],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(finder.calls(), 1);

    let err = engine
        .aggregate(&request(vec![CarInput::new(" ", Some("NY"))], None))
        .await;
    assert!(err.is_err());
    assert_eq!(finder.calls(), 1);
}

#[tokio::test]
async fn test_stateless_vehicle_reaches_nationwide_finder() {
    let events = EventBus::new(32);
    let national = ScriptedFinder::new(
        "National",
        "USA",
        4,
        Script::Records(vec![notice(4, "TX", "US-1", (2024, 3, 1), "40.00")]),
    );
    let ny = ScriptedFinder::new("NY Finder", "NY", 1, Script::Records(Vec::new()));
    let finders: Vec<Arc<dyn Finder>> = vec![national.clone(), ny.clone()];
    let engine = engine(finders, &events, EngineOptions::default());

    let outcome = engine
        .aggregate(&request(vec![CarInput::new("NOSTATE1", None)], Some(vec!["TX"])))
        .await
        .unwrap();

    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(national.calls(), 1);
    assert_eq!(ny.calls(), 0);
}

#[tokio::test]
async fn test_batch_deadline_returns_partial_results() {
    let events = EventBus::new(32);
    let fast = ScriptedFinder::new(
        "Fast",
        "NY",
        1,
        Script::Records(vec![notice(1, "NY", "F-1", (2024, 1, 1), "10.00")]),
    );
    let slow = ScriptedFinder::new("Slow", "NY", 2, Script::Sleep(Duration::from_secs(3)));
    let finders: Vec<Arc<dyn Finder>> = vec![fast, slow];
    let options = EngineOptions {
        max_concurrency: 4,
        batch_deadline: Some(Duration::from_millis(300)),
    };
    let engine = engine(finders, &events, options);

    let started = std::time::Instant::now();
    let outcome = engine
        .aggregate(&request(vec![CarInput::new("ABC123", Some("NY"))], None))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(outcome.abandoned_pairs, 1);
}

#[tokio::test]
async fn test_concurrency_bound_still_visits_every_pair() {
    let events = EventBus::new(64);
    let finders: Vec<Arc<dyn Finder>> = (0..5)
        .map(|i| {
            ScriptedFinder::new(
                &format!("Finder {}", i),
                "NY",
                i,
                Script::Records(vec![notice(i, "NY", &format!("N-{}", i), (2024, 1, 1), "5.00")]),
            ) as Arc<dyn Finder>
        })
        .collect();
    let options = EngineOptions {
        max_concurrency: 2,
        batch_deadline: None,
    };
    let engine = engine(finders, &events, options);

    let cars = vec![
        CarInput::new("AAA111", Some("NY")),
        CarInput::new("BBB222", Some("NY")),
        CarInput::new("CCC333", Some("NY")),
    ];
    let outcome = engine.aggregate(&request(cars, None)).await.unwrap();

    assert_eq!(outcome.requests_count, 15);
    assert_eq!(outcome.violations.len(), 15);
    assert_eq!(outcome.abandoned_pairs, 0);
}

#[tokio::test]
async fn test_company_run_filters_by_issue_date() {
    let events = EventBus::new(32);
    let finder = ScriptedFinder::new(
        "NY Finder",
        "NY",
        1,
        Script::Records(vec![
            notice(1, "NY", "IN-RANGE", (2024, 1, 15), "65.00"),
            notice(1, "NY", "TOO-OLD", (2023, 12, 1), "45.00"),
        ]),
    );
    let finders: Vec<Arc<dyn Finder>> = vec![finder];
    let engine = engine(finders, &events, EngineOptions::default());
    let pool = memory_pool().await;
    let company = Uuid::new_v4();

    let result = run_company_aggregation(
        &pool,
        &engine,
        company,
        &CompanyAggregationRequest {
            cars: vec![CarInput::new("ABC123", Some("NY"))],
            states: None,
            start_date: "2024-01-01".to_string(),
            end_date: "2024-01-31".to_string(),
            tracking_id: None,
        },
        "fleet-admin",
    )
    .await
    .unwrap();

    assert_eq!(result.violations_found, 1);
    assert_eq!(result.violations_saved, 1);
    assert_eq!(result.vehicles_processed, 1);
    assert_eq!(result.violations[0].notice_number.as_deref(), Some("IN-RANGE"));

    let runs = pva_agg::db::runs::list_runs(&pool, company, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].requestor, "fleet-admin");
    assert_eq!(runs[0].violations_found, 1);
}

#[tokio::test]
async fn test_company_run_uses_registered_vehicles() {
    let events = EventBus::new(32);
    let finder = ScriptedFinder::new(
        "NJ Finder",
        "NJ",
        3,
        Script::Records(vec![notice(3, "NJ", "NJ-9", (2024, 5, 5), "25.00")]),
    );
    let finders: Vec<Arc<dyn Finder>> = vec![finder.clone()];
    let engine = engine(finders, &events, EngineOptions::default());
    let pool = memory_pool().await;
    let company = Uuid::new_v4();

    pva_agg::db::vehicles::insert_vehicle(&pool, company, "fleet 01", Some("nj"))
        .await
        .unwrap();
    pva_agg::db::vehicles::insert_vehicle(&pool, company, "FLEET02", Some("NJ"))
        .await
        .unwrap();

    let result = run_company_aggregation(
        &pool,
        &engine,
        company,
        &CompanyAggregationRequest {
            start_date: "2024-05-01".to_string(),
            end_date: "2024-05-31".to_string(),
            ..Default::default()
        },
        "unknown",
    )
    .await
    .unwrap();

    assert_eq!(finder.calls(), 2);
    assert_eq!(result.vehicles_processed, 2);
    // Both plates report the same notice number: one insert, one update
    assert_eq!(result.violations_saved, 1);
    assert_eq!(result.violations_updated, 1);
}

#[tokio::test]
async fn test_company_run_rejects_inverted_range_before_dispatch() {
    let events = EventBus::new(32);
    let finder = ScriptedFinder::new("NY Finder", "NY", 1, Script::Records(Vec::new()));
    let finders: Vec<Arc<dyn Finder>> = vec![finder.clone()];
    let engine = engine(finders, &events, EngineOptions::default());
    let pool = memory_pool().await;

    let err = run_company_aggregation(
        &pool,
        &engine,
        Uuid::new_v4(),
        &CompanyAggregationRequest {
            cars: vec![CarInput::new("ABC123", Some("NY"))],
            start_date: "2024-02-01".to_string(),
            end_date: "2024-01-01".to_string(),
            ..Default::default()
        },
        "unknown",
    )
    .await;

    assert!(matches!(err, Err(pva_common::Error::InvalidInput(_))));
    assert_eq!(finder.calls(), 0);
}
