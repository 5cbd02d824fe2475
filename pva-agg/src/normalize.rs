//! Shared normalization helpers
//!
//! Every finder's mapper goes through these functions so that amounts, dates,
//! and payment vocabularies from different jurisdictions land in the same
//! canonical shape. None of them fail: unusable input becomes 0 / `None`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::models::{FineType, PaymentStatus};

/// Date-time layouts tried after RFC 3339
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

/// Date-only layouts, read as midnight UTC
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%m-%d-%Y"];

const DISPUTE_KEYWORDS: &[&str] = &["hearing", "dispute", "contest", "appeal"];
const ZERO_LIABILITY_KEYWORDS: &[&str] = &["dismiss", "void"];

/// Parse a money string such as "$1,234.56"
///
/// Everything except digits and '.' is dropped before parsing; the result is
/// rounded to 2 places. Unparsable input yields 0.
pub fn parse_amount(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    Decimal::from_str(&cleaned)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO)
}

/// [`parse_amount`] for optional upstream fields
pub fn parse_amount_opt(raw: Option<&str>) -> Decimal {
    raw.map(parse_amount).unwrap_or(Decimal::ZERO)
}

/// Like [`parse_amount_opt`] but keeps "field absent" distinct from zero
pub fn parse_amount_present(raw: Option<&str>) -> Option<Decimal> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_amount)
}

/// Parse a date in any of the supported layouts
///
/// Order: RFC 3339, ISO with fractional seconds (Socrata floating
/// timestamps), other date-times, then `MM/dd/yyyy` and friends.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

pub fn parse_date_opt(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_date)
}

/// Classify payment state from a balance and/or status text
///
/// Precedence:
/// 1. balance of exactly zero → Paid (regardless of text)
/// 2. text contains "paid" → Paid
/// 3. text mentions hearing / dispute / contest / appeal → Disputed
/// 4. text says dismissed / voided → Paid
/// 5. otherwise → New
pub fn classify_payment(amount_due: Option<Decimal>, status: Option<&str>) -> PaymentStatus {
    if amount_due.is_some_and(|due| due.is_zero()) {
        return PaymentStatus::Paid;
    }

    let text = status.map(str::to_lowercase).unwrap_or_default();

    if text.contains("paid") {
        return PaymentStatus::Paid;
    }
    if DISPUTE_KEYWORDS.iter().any(|k| text.contains(k)) {
        return PaymentStatus::Disputed;
    }
    if ZERO_LIABILITY_KEYWORDS.iter().any(|k| text.contains(k)) {
        return PaymentStatus::Paid;
    }

    PaymentStatus::New
}

/// Upgrade `New` to `Partial` when money was received but a balance remains
pub fn refine_partial(status: PaymentStatus, paid: Decimal, due: Decimal) -> PaymentStatus {
    if status == PaymentStatus::New && paid > Decimal::ZERO && due > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        status
    }
}

/// Guess the fine type from a violation description
pub fn infer_fine_type(description: Option<&str>) -> FineType {
    let text = description.map(str::to_lowercase).unwrap_or_default();
    if text.contains("toll") {
        FineType::Toll
    } else if ["camera", "red light", "speed", "phto"]
        .iter()
        .any(|k| text.contains(k))
    {
        FineType::Camera
    } else {
        FineType::Parking
    }
}

/// Trim; empty becomes `None`
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
