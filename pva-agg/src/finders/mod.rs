//! Per-jurisdiction violation finders
//!
//! A [`Finder`] knows how to look up one plate in one jurisdiction. Finders
//! return `Result` internally; the registry hands out [`RegisteredFinder`]
//! wrappers whose [`find`](RegisteredFinder::find) never fails. Errors,
//! timeouts and panics are logged, published as
//! [`PvaEvent::FinderFailed`], and turned into an empty result so that one
//! broken portal cannot abort a batch.
//!
//! # Variants
//! - **socrata** - open-data query, paged
//! - **session** - GET for cookies + hidden fields, POST search form, scrape table
//! - **hybrid** - open data, then live status per citation from a paced portal
//! - **heuristic** - JSON endpoints, then form + table, then regex
//! - **jurisdictions** - the concrete finders compiled into the registry

pub mod heuristic;
pub mod hybrid;
pub mod jurisdictions;
pub mod session;
pub mod socrata;

use crate::models::{ViolationQuery, ViolationRecord, NATIONWIDE};
use async_trait::async_trait;
use futures::FutureExt;
use pva_common::config::{AggregationConfig, SocrataConfig};
use pva_common::events::{EventBus, PvaEvent};
use reqwest::{header, Client};
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("pva-agg/", env!("CARGO_PKG_VERSION"));

/// Identity of a finder as exposed by `GET /finders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinderInfo {
    pub name: String,
    /// Public page of the jurisdiction's portal
    pub link: String,
    /// 2-letter state, or `USA` for nationwide finders
    pub state_code: String,
    /// Numeric provider code stamped on every record
    pub provider: i32,
}

impl FinderInfo {
    pub fn new(name: &str, link: &str, state_code: &str, provider: i32) -> Self {
        Self {
            name: name.to_string(),
            link: link.to_string(),
            state_code: state_code.trim().to_uppercase(),
            provider,
        }
    }

    pub fn is_nationwide(&self) -> bool {
        self.state_code.eq_ignore_ascii_case(NATIONWIDE)
    }

    /// Nationwide, or state equals one of `states` (upper-cased set)
    pub fn matches_any(&self, states: &HashSet<String>) -> bool {
        self.is_nationwide() || states.contains(&self.state_code.to_uppercase())
    }
}

/// Finder-internal failure; never crosses [`RegisteredFinder::find`]
#[derive(Debug, Error)]
pub enum FinderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for FinderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FinderError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None if e.is_decode() => FinderError::Parse(e.to_string()),
            None => FinderError::Network(e.to_string()),
        }
    }
}

/// One jurisdiction's lookup
///
/// Implementations must be safe for concurrent use; any session state
/// (cookies, tokens) lives inside the instance for the registry's lifetime.
#[async_trait]
pub trait Finder: Send + Sync {
    fn info(&self) -> &FinderInfo;

    /// Look up violations for one plate. `query.state` is already resolved
    /// for this finder (see [`ViolationQuery::state_for`]).
    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError>;
}

/// Registry entry: a finder plus its failure-isolation policy
#[derive(Clone)]
pub struct RegisteredFinder {
    inner: Arc<dyn Finder>,
    events: EventBus,
    timeout: Duration,
}

impl RegisteredFinder {
    pub fn new(inner: Arc<dyn Finder>, events: EventBus, timeout: Duration) -> Self {
        Self {
            inner,
            events,
            timeout,
        }
    }

    pub fn info(&self) -> &FinderInfo {
        self.inner.info()
    }

    /// Search without ever failing
    ///
    /// On error, timeout or panic: logs, emits `FinderFailed`, returns empty.
    pub async fn find(&self, query: &ViolationQuery) -> Vec<ViolationRecord> {
        let info = self.inner.info();
        let query = ViolationQuery {
            license_plate: query.license_plate.clone(),
            state: query.state_for(&info.state_code),
        };

        let call = AssertUnwindSafe(self.inner.search(&query)).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(records))) => Ok(records),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(panic)) => Err(FinderError::Internal(format!(
                "finder panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(FinderError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(records) => {
                debug!(
                    finder = %info.name,
                    plate = %query.license_plate,
                    state = %query.state,
                    count = records.len(),
                    "Finder search complete"
                );
                records
            }
            Err(e) => {
                warn!(
                    finder = %info.name,
                    plate = %query.license_plate,
                    state = %query.state,
                    error = %e,
                    "Finder failed (isolated, contributes no records)"
                );
                self.events.emit_lossy(PvaEvent::FinderFailed {
                    finder_name: info.name.clone(),
                    license_plate: query.license_plate.clone(),
                    state: query.state.clone(),
                    error: e.to_string(),
                    message: format!(
                        "{} lookup failed for {} ({})",
                        info.name, query.license_plate, query.state
                    ),
                    timestamp: chrono::Utc::now(),
                });
                Vec::new()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Knobs shared by the built-in finders
#[derive(Debug, Clone)]
pub struct FinderSettings {
    /// HTTP client timeout and wrapper timeout
    pub timeout: Duration,
    /// Pause between live-portal requests in hybrid finders
    pub portal_delay: Duration,
    /// Open-data page size
    pub page_size: u32,
    /// Open-data fetch-all cap
    pub max_records: u32,
    /// Socrata X-App-Token
    pub app_token: Option<String>,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self::from_config(&AggregationConfig::default(), &SocrataConfig::default())
    }
}

impl FinderSettings {
    pub fn from_config(aggregation: &AggregationConfig, socrata: &SocrataConfig) -> Self {
        Self {
            timeout: aggregation.finder_timeout(),
            portal_delay: aggregation.portal_delay(),
            page_size: aggregation.page_size.max(1),
            max_records: aggregation.max_records.max(1),
            app_token: socrata.app_token.clone().filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Build the HTTP client owned by one finder instance
///
/// `cookies` enables a per-client cookie jar for session-based portals.
pub fn build_client(settings: &FinderSettings, cookies: bool) -> Result<Client, FinderError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(USER_AGENT),
    );
    if let Some(token) = &settings.app_token {
        let value = header::HeaderValue::from_str(token)
            .map_err(|e| FinderError::Internal(format!("invalid app token: {}", e)))?;
        headers.insert("X-App-Token", value);
    }

    Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(Duration::from_secs(10).min(settings.timeout))
        .default_headers(headers)
        .cookie_store(cookies)
        .build()
        .map_err(|e| FinderError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Join a base URL and a path without doubling or dropping the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
