//! Test Helper Utilities
//!
//! Shared utilities for testing pva-agg: scripted finders, an in-memory
//! database, a wired-up app, and local stand-ins for third-party portals.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pva_agg::aggregation::{AggregationEngine, EngineOptions};
use pva_agg::aggregation::progress::ProgressStore;
use pva_agg::finders::{Finder, FinderError, FinderInfo, FinderSettings};
use pva_agg::models::{ViolationQuery, ViolationRecord};
use pva_agg::registry::FinderRegistry;
use pva_agg::AppState;
use pva_common::events::EventBus;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`ScriptedFinder`] does when searched
#[derive(Clone)]
pub enum Script {
    Records(Vec<ViolationRecord>),
    Fail,
    Panic,
    Sleep(Duration),
}

/// Finder with canned behavior that counts its calls
pub struct ScriptedFinder {
    info: FinderInfo,
    script: Script,
    pub calls: AtomicUsize,
}

impl ScriptedFinder {
    pub fn new(name: &str, state: &str, provider: i32, script: Script) -> Arc<Self> {
        Arc::new(Self {
            info: FinderInfo::new(name, "https://portal.test", state, provider),
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Finder for ScriptedFinder {
    fn info(&self) -> &FinderInfo {
        &self.info
    }

    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Records(records) => Ok(records
                .iter()
                .cloned()
                .map(|mut r| {
                    r.tag = query.license_plate.clone();
                    r
                })
                .collect()),
            Script::Fail => Err(FinderError::Http {
                status: 503,
                url: format!("{}/search", self.info.link),
            }),
            Script::Panic => panic!("portal markup changed"),
            Script::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Active record keyed by notice number, issued on the given day
pub fn notice(provider: i32, state: &str, number: &str, day: (i32, u32, u32), amount: &str) -> ViolationRecord {
    let mut record = ViolationRecord::new(provider, "PLATE", state);
    record.notice_number = Some(number.to_string());
    record.issue_date = Some(Utc.with_ymd_and_hms(day.0, day.1, day.2, 12, 0, 0).unwrap());
    record.amount = amount.parse().unwrap();
    record.settle(None)
}

pub fn registry(finders: Vec<Arc<dyn Finder>>, events: &EventBus) -> FinderRegistry {
    FinderRegistry::new(finders, events.clone(), Duration::from_secs(5))
}

pub fn engine(finders: Vec<Arc<dyn Finder>>, events: &EventBus, options: EngineOptions) -> AggregationEngine {
    AggregationEngine::new(
        Arc::new(registry(finders, events)),
        events.clone(),
        ProgressStore::new(),
        options,
    )
}

/// Fresh in-memory database with tables created
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    pva_agg::db::init_tables(&pool)
        .await
        .expect("Failed to initialize tables");
    pool
}

pub async fn app_state(finders: Vec<Arc<dyn Finder>>) -> AppState {
    let events = EventBus::new(100);
    let pool = memory_pool().await;
    AppState::new(pool, events.clone(), registry(finders, &events), EngineOptions::default())
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_portal(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock portal");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Short timeouts and no pacing, for finders pointed at local portals
pub fn fast_settings() -> FinderSettings {
    FinderSettings {
        timeout: Duration::from_secs(5),
        portal_delay: Duration::from_millis(5),
        page_size: 2,
        max_records: 10,
        app_token: None,
    }
}
