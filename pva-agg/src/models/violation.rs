//! Canonical violation record
//!
//! Every finder maps its jurisdiction-specific payload into [`ViolationRecord`].
//! [`ViolationRecord::settle`] is the last step of every mapping: it enforces
//! the non-negative amount, currency, and `is_active` invariants.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default ISO 4217 currency
pub const DEFAULT_CURRENCY: &str = "USD";

/// Payment state of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Unpaid / outstanding
    #[default]
    New,
    /// Paid, dismissed, or voided (zero liability)
    Paid,
    /// Under hearing, dispute, contest, or appeal
    Disputed,
    /// Some payment received, balance still due
    Partial,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::New => "New",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Disputed => "Disputed",
            PaymentStatus::Partial => "Partial",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unknown values read as `New`
    pub fn parse(value: &str) -> Self {
        match value {
            "Paid" => PaymentStatus::Paid,
            "Disputed" => PaymentStatus::Disputed,
            "Partial" => PaymentStatus::Partial,
            _ => PaymentStatus::New,
        }
    }
}

/// Kind of fine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FineType {
    #[default]
    Parking,
    Toll,
    /// Red-light or speed camera
    Camera,
    Other,
}

impl FineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineType::Parking => "Parking",
            FineType::Toll => "Toll",
            FineType::Camera => "Camera",
            FineType::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "Toll" => FineType::Toll,
            "Camera" => FineType::Camera,
            "Other" => FineType::Other,
            _ => FineType::Parking,
        }
    }
}

/// Normalized violation, independent of the jurisdiction it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub citation_number: Option<String>,
    pub notice_number: Option<String>,

    /// Numeric code of the jurisdiction that produced the record
    pub provider: i32,
    pub agency: Option<String>,
    pub link: Option<String>,

    /// Plate
    pub tag: String,
    pub state: String,

    pub issue_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    /// Original fine, 2 decimal places
    pub amount: Decimal,
    pub currency: String,

    pub payment_status: PaymentStatus,
    pub fine_type: FineType,

    pub address: Option<String>,
    pub note: Option<String>,

    /// Outstanding balance remains
    pub is_active: bool,
}

impl ViolationRecord {
    /// Empty record for a plate; finders fill in what they know
    pub fn new(provider: i32, tag: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            citation_number: None,
            notice_number: None,
            provider,
            agency: None,
            link: None,
            tag: tag.into(),
            state: state.into(),
            issue_date: None,
            start_date: None,
            end_date: None,
            amount: Decimal::ZERO,
            currency: DEFAULT_CURRENCY.to_string(),
            payment_status: PaymentStatus::New,
            fine_type: FineType::Parking,
            address: None,
            note: None,
            is_active: false,
        }
    }

    /// Apply record invariants given the balance still owed
    ///
    /// `amount_due` of `None` means the source does not report a balance;
    /// the original amount is then treated as owed.
    pub fn settle(mut self, amount_due: Option<Decimal>) -> Self {
        if self.amount.is_sign_negative() {
            self.amount = Decimal::ZERO;
        }
        self.amount = self
            .amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        if self.currency.trim().is_empty() {
            self.currency = DEFAULT_CURRENCY.to_string();
        }

        let owed = amount_due.unwrap_or(self.amount);
        self.is_active = self.payment_status != PaymentStatus::Paid && owed > Decimal::ZERO;
        self
    }

    /// Dedup key: notice number preferred, citation number otherwise
    pub fn dedup_key(&self) -> Option<&str> {
        non_blank(self.notice_number.as_deref()).or_else(|| non_blank(self.citation_number.as_deref()))
    }

    /// Date used for range filtering: issue date, else start date
    pub fn relevant_date(&self) -> Option<NaiveDate> {
        self.issue_date
            .or(self.start_date)
            .map(|d| d.date_naive())
    }

    /// Inclusive range check; undated records are always kept
    pub fn falls_within(&self, from: NaiveDate, to: NaiveDate) -> bool {
        match self.relevant_date() {
            Some(date) => date >= from && date <= to,
            None => true,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Stored violation owned by a company
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedViolation {
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(flatten)]
    pub record: ViolationRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of saving one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// No usable dedup key
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn record() -> ViolationRecord {
        ViolationRecord::new(1, "ABC123", "NY")
    }

    #[test]
    fn test_settle_marks_outstanding_active() {
        let mut r = record();
        r.amount = dec("65.00");
        let r = r.settle(Some(dec("65.00")));
        assert!(r.is_active);
        assert_eq!(r.currency, "USD");
    }

    #[test]
    fn test_paid_is_never_active() {
        let mut r = record();
        r.amount = dec("65.00");
        r.payment_status = PaymentStatus::Paid;
        let r = r.settle(Some(dec("65.00")));
        assert!(!r.is_active);
        assert_eq!(r.amount, dec("65.00"), "original fine kept for audit");
    }

    #[test]
    fn test_negative_amount_clamped_and_rounded() {
        let mut r = record();
        r.amount = dec("-3.50");
        assert_eq!(r.settle(None).amount, Decimal::ZERO);

        let mut r = record();
        r.amount = dec("10.555");
        assert_eq!(r.settle(None).amount, dec("10.56"));
    }

    #[test]
    fn test_blank_currency_defaults_to_usd() {
        let mut r = record();
        r.currency = " ".to_string();
        assert_eq!(r.settle(None).currency, "USD");
    }

    #[test]
    fn test_dedup_key_prefers_notice_number() {
        let mut r = record();
        assert_eq!(r.dedup_key(), None);

        r.citation_number = Some("C1".to_string());
        assert_eq!(r.dedup_key(), Some("C1"));

        r.notice_number = Some("  ".to_string());
        assert_eq!(r.dedup_key(), Some("C1"));

        r.notice_number = Some("N1".to_string());
        assert_eq!(r.dedup_key(), Some("N1"));
    }

    #[test]
    fn test_date_range_uses_issue_then_start_date() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        let mut r = record();
        assert!(r.falls_within(from, to), "undated records are kept");

        r.start_date = Some(Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
        assert!(!r.falls_within(from, to));

        r.issue_date = Some(Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap());
        assert!(r.falls_within(from, to), "issue date wins, end is inclusive");
    }

    #[test]
    fn test_status_round_trips_through_storage_names() {
        for status in [
            PaymentStatus::New,
            PaymentStatus::Paid,
            PaymentStatus::Disputed,
            PaymentStatus::Partial,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), status);
        }
        assert_eq!(FineType::parse("Camera"), FineType::Camera);
        assert_eq!(FineType::parse("garbage"), FineType::Parking);
    }
}
