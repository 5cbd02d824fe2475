//! Open data + live portal finder
//!
//! Open-data feeds lag the payment system by days. This finder reads the
//! citations from the feed, then asks the live payment portal about each
//! outstanding one and overlays the current status (paid, disputed,
//! dismissed). Portal requests are paced by a rate limiter; a failed or
//! empty live lookup leaves the open-data record as it was.

use super::session::{parse_results_rows, PortalSession};
use super::socrata::{SocrataClient, SocrataRow};
use super::{Finder, FinderError, FinderInfo};
use crate::models::{PaymentStatus, ViolationQuery, ViolationRecord};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rust_decimal::Decimal;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

/// Live lookups per search; the rest keep their open-data status
pub const MAX_LIVE_LOOKUPS: usize = 25;

/// Current status reported by the live portal for one citation
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    pub payment_status: PaymentStatus,
    /// Balance column of the live page; `None` when the page shows none
    pub amount_due: Option<Decimal>,
}

pub struct HybridFinder<R> {
    info: FinderInfo,
    open_data: SocrataClient,
    portal: PortalSession,
    /// `None` when pacing is disabled
    limiter: Option<DefaultDirectRateLimiter>,
    _row: PhantomData<fn() -> R>,
}

impl<R> HybridFinder<R> {
    pub fn new(
        info: FinderInfo,
        open_data: SocrataClient,
        portal: PortalSession,
        portal_delay: Duration,
    ) -> Self {
        Self {
            info,
            open_data,
            portal,
            limiter: Quota::with_period(portal_delay).map(RateLimiter::direct),
            _row: PhantomData,
        }
    }

    /// Ask the live portal about one citation
    ///
    /// `Ok(None)`: the portal does not know the citation.
    async fn live_status(
        &self,
        citation: &str,
        query: &ViolationQuery,
    ) -> Result<Option<LiveStatus>, FinderError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let page = self.portal.submit(citation, &query.state).await?;
        let rows = parse_results_rows(&page, &self.info, query)?;

        let found = rows
            .iter()
            .find(|row| {
                row.record
                    .citation_number
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(citation))
            })
            .or_else(|| (rows.len() == 1).then(|| &rows[0]));

        Ok(found.map(|row| LiveStatus {
            payment_status: row.record.payment_status,
            amount_due: row.amount_due,
        }))
    }
}

/// Replace the payment status with the live portal's view
///
/// The active flag is recomputed: the portal's balance decides when it
/// reports one, otherwise the open-data record's own outstanding state does.
pub fn overlay(mut record: ViolationRecord, live: &LiveStatus) -> ViolationRecord {
    let outstanding = live
        .amount_due
        .map_or(record.is_active, |due| due > Decimal::ZERO);
    record.payment_status = live.payment_status;
    record.is_active = live.payment_status != PaymentStatus::Paid && outstanding;
    record
}

#[async_trait]
impl<R: SocrataRow + 'static> Finder for HybridFinder<R> {
    fn info(&self) -> &FinderInfo {
        &self.info
    }

    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
        let rows: Vec<R> = self.open_data.fetch_all(query).await?;
        let records: Vec<ViolationRecord> = rows
            .into_iter()
            .filter_map(|row| row.into_record(&self.info, query))
            .collect();

        let mut merged = Vec::with_capacity(records.len());
        let mut lookups = 0usize;

        for record in records {
            let citation = match record.citation_number.clone() {
                Some(c) if record.is_active && lookups < MAX_LIVE_LOOKUPS => c,
                _ => {
                    merged.push(record);
                    continue;
                }
            };
            lookups += 1;

            match self.live_status(&citation, query).await {
                Ok(Some(live)) => {
                    debug!(
                        finder = %self.info.name,
                        citation = %citation,
                        status = live.payment_status.as_str(),
                        "Live status overlaid"
                    );
                    merged.push(overlay(record, &live));
                }
                Ok(None) => merged.push(record),
                Err(e) => {
                    warn!(
                        finder = %self.info.name,
                        citation = %citation,
                        error = %e,
                        "Live status lookup failed, keeping open-data record"
                    );
                    merged.push(record);
                }
            }
        }

        Ok(merged)
    }
}
