//! Violation persistence
//!
//! Upsert keyed by (company_id, dedup_key) where the dedup key is the notice
//! number, or the citation number when there is no notice number.

use super::{parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{FineType, PaymentStatus, PersistedViolation, UpsertOutcome, ViolationRecord};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use chrono::{DateTime, Utc};
use pva_common::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Filters for listing a company's violations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViolationFilter {
    pub state: Option<String>,
    pub tag: Option<String>,
    pub active: Option<bool>,
}

fn ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|d| d.to_rfc3339())
}

/// Insert a new violation or update the existing one with the same key
///
/// Records without a notice or citation number are not stored.
pub async fn upsert_violation(
    pool: &SqlitePool,
    company_id: Uuid,
    record: &ViolationRecord,
) -> Result<UpsertOutcome> {
    let Some(dedup_key) = record.dedup_key().map(str::to_string) else {
        return Ok(UpsertOutcome::Skipped);
    };

    retry_on_lock("violation upsert", DEFAULT_MAX_LOCK_WAIT_MS, || {
        let dedup_key = dedup_key.clone();
        async move {
            let new_id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();

            let stored_id: String = sqlx::query_scalar(
                r#"
                INSERT INTO violations (
                    id, company_id, dedup_key, citation_number, notice_number,
                    provider, agency, link, tag, state,
                    issue_date, start_date, end_date, amount, currency,
                    payment_status, fine_type, address, note, is_active,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(company_id, dedup_key) DO UPDATE SET
                    citation_number = excluded.citation_number,
                    notice_number = excluded.notice_number,
                    provider = excluded.provider,
                    agency = excluded.agency,
                    link = excluded.link,
                    tag = excluded.tag,
                    state = excluded.state,
                    issue_date = excluded.issue_date,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    amount = excluded.amount,
                    currency = excluded.currency,
                    payment_status = excluded.payment_status,
                    fine_type = excluded.fine_type,
                    address = excluded.address,
                    note = excluded.note,
                    is_active = excluded.is_active,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
            )
            .bind(&new_id)
            .bind(company_id.to_string())
            .bind(&dedup_key)
            .bind(&record.citation_number)
            .bind(&record.notice_number)
            .bind(record.provider)
            .bind(&record.agency)
            .bind(&record.link)
            .bind(&record.tag)
            .bind(&record.state)
            .bind(ts(record.issue_date))
            .bind(ts(record.start_date))
            .bind(ts(record.end_date))
            .bind(record.amount.to_string())
            .bind(&record.currency)
            .bind(record.payment_status.as_str())
            .bind(record.fine_type.as_str())
            .bind(&record.address)
            .bind(&record.note)
            .bind(record.is_active)
            .bind(&now)
            .bind(&now)
            .fetch_one(pool)
            .await?;

            Ok(if stored_id == new_id {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Updated
            })
        }
    })
    .await
}

/// List a company's violations, newest first
pub async fn list_violations(
    pool: &SqlitePool,
    company_id: Uuid,
    filter: &ViolationFilter,
) -> Result<Vec<PersistedViolation>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, company_id, citation_number, notice_number, provider, agency, link, \
         tag, state, issue_date, start_date, end_date, amount, currency, payment_status, \
         fine_type, address, note, is_active, created_at, updated_at \
         FROM violations WHERE company_id = ",
    );
    builder.push_bind(company_id.to_string());

    if let Some(state) = filter.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND state = ").push_bind(state.to_uppercase());
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND tag = ")
            .push_bind(crate::models::normalize_plate(tag));
    }
    if let Some(active) = filter.active {
        builder.push(" AND is_active = ").push_bind(active);
    }
    builder.push(" ORDER BY COALESCE(issue_date, start_date, created_at) DESC");

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(row_to_violation).collect()
}

/// Count stored violations for a company and key (used by tests and diagnostics)
pub async fn count_by_key(pool: &SqlitePool, company_id: Uuid, dedup_key: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM violations WHERE company_id = ? AND dedup_key = ?",
    )
    .bind(company_id.to_string())
    .bind(dedup_key)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

fn row_to_violation(row: &SqliteRow) -> Result<PersistedViolation> {
    let id: String = row.try_get("id")?;
    let company_id: String = row.try_get("company_id")?;
    let amount: String = row.try_get("amount")?;
    let payment_status: String = row.try_get("payment_status")?;
    let fine_type: String = row.try_get("fine_type")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let record = ViolationRecord {
        citation_number: row.try_get("citation_number")?,
        notice_number: row.try_get("notice_number")?,
        provider: row.try_get("provider")?,
        agency: row.try_get("agency")?,
        link: row.try_get("link")?,
        tag: row.try_get("tag")?,
        state: row.try_get("state")?,
        issue_date: parse_optional_timestamp(row.try_get("issue_date")?, "issue_date")?,
        start_date: parse_optional_timestamp(row.try_get("start_date")?, "start_date")?,
        end_date: parse_optional_timestamp(row.try_get("end_date")?, "end_date")?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| Error::Internal(format!("invalid amount '{}': {}", amount, e)))?,
        currency: row.try_get("currency")?,
        payment_status: PaymentStatus::parse(&payment_status),
        fine_type: FineType::parse(&fine_type),
        address: row.try_get("address")?,
        note: row.try_get("note")?,
        is_active: row.try_get("is_active")?,
    };

    Ok(PersistedViolation {
        id: parse_uuid(&id, "violations.id")?,
        company_id: parse_uuid(&company_id, "violations.company_id")?,
        record,
        created_at: parse_timestamp(&created_at, "violations.created_at")?,
        updated_at: parse_timestamp(&updated_at, "violations.updated_at")?,
    })
}
