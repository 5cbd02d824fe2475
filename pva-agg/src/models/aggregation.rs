//! Aggregation request/response shapes and the audit record

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CarInput, ViolationRecord};
use pva_common::{Error, Result};

/// POST /violations/search body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    #[serde(default)]
    pub cars: Vec<CarInput>,
    /// When absent, states are derived from `cars`
    #[serde(default)]
    pub states: Option<Vec<String>>,
    /// Key under which progress is published
    #[serde(default)]
    pub tracking_id: Option<Uuid>,
}

/// POST /violations/search response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub violations: Vec<ViolationRecord>,
    pub total_count: usize,
}

/// POST /companies/{companyId}/violations/aggregate body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyAggregationRequest {
    /// When empty, the company's registered vehicles are used
    #[serde(default)]
    pub cars: Vec<CarInput>,
    #[serde(default)]
    pub states: Option<Vec<String>>,
    /// YYYY-MM-DD, inclusive; missing is reported by `DateRange::parse`
    #[serde(default)]
    pub start_date: String,
    /// YYYY-MM-DD, inclusive
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub tracking_id: Option<Uuid>,
}

/// POST /companies/{companyId}/violations/aggregate response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyAggregationResult {
    pub tracking_id: Uuid,
    pub vehicles_processed: usize,
    pub violations_found: usize,
    pub violations_saved: usize,
    pub violations_updated: usize,
    pub violations_skipped: usize,
    pub message: String,
    pub violations: Vec<ViolationRecord>,
}

/// Inclusive issue-date window for company-scoped runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Parse two YYYY-MM-DD strings; `from` must not be after `to`
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let from = parse_day(from, "startDate")?;
        let to = parse_day(to, "endDate")?;
        if from > to {
            return Err(Error::InvalidInput(format!(
                "startDate {} must not be after endDate {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, record: &ViolationRecord) -> bool {
        record.falls_within(self.from, self.to)
    }
}

fn parse_day(value: &str, field: &str) -> Result<NaiveDate> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!(
            "{} must be formatted YYYY-MM-DD, got '{}'",
            field, value
        ))
    })
}

/// One audit row per aggregation invocation (write-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRunRecord {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub vehicle_count: usize,
    /// vehicles x finders attempted
    pub requests_count: usize,
    pub finders_count: usize,
    pub violations_found: usize,
    pub requestor: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_parses_inclusive_window() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.to, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

        assert!(DateRange::parse("2024-01-01", "2024-01-01").is_ok());
    }

    #[test]
    fn test_date_range_rejects_bad_input() {
        assert!(matches!(
            DateRange::parse("01/01/2024", "2024-01-31"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DateRange::parse("2024-02-01", "2024-01-31"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_company_request_without_dates_fails_in_range_parse() {
        let body = r#"{"cars":[{"licensePlate":"ABC1234","state":"NY"}]}"#;
        let request: CompanyAggregationRequest = serde_json::from_str(body).unwrap();
        match DateRange::parse(&request.start_date, &request.end_date) {
            Err(Error::InvalidInput(msg)) => assert_eq!(msg, "startDate is required"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_request_accepts_camel_case_body() {
        let body = r#"{"cars":[{"licensePlate":"ABC1234","state":"NY"}],"states":["NY","NJ"]}"#;
        let request: AggregationRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.cars[0].license_plate, "ABC1234");
        assert_eq!(request.states.unwrap(), vec!["NY", "NJ"]);
        assert!(request.tracking_id.is_none());
    }
}
