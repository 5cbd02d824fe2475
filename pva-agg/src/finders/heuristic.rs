//! Heuristic finder for portals without a stable contract
//!
//! Tries, in order, stopping at the first approach that yields a record:
//! 1. each candidate JSON endpoint, reading fields by flexible key lookup
//! 2. the search form, parsing an HTML results table
//! 3. single-record regex extraction from the form response
//!
//! An approach that errors is skipped. The search only fails when every
//! approach errored; a clean "nothing found" anywhere is an empty result.

use super::session::{records_from_table, PortalSession};
use super::{join_url, Finder, FinderError, FinderInfo};
use crate::html;
use crate::models::{ViolationQuery, ViolationRecord};
use crate::normalize::{
    classify_payment, clean_text, infer_fine_type, parse_amount, parse_amount_present,
    parse_date_opt, refine_partial,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::debug;

const NUMBER_KEYS: &[&str] = &[
    "citationNumber", "citation", "ticketNumber", "ticket", "summonsNumber", "violationNumber",
];
const NOTICE_KEYS: &[&str] = &["noticeNumber", "notice"];
const DATE_KEYS: &[&str] = &["issueDate", "issuedAt", "violationDate", "dateIssued", "date"];
const FINE_KEYS: &[&str] = &["fineAmount", "fine", "amount", "originalAmount"];
const DUE_KEYS: &[&str] = &["amountDue", "balanceDue", "balance", "due", "owed"];
const PAID_KEYS: &[&str] = &["amountPaid", "paidAmount", "paymentAmount", "paid"];
const STATUS_KEYS: &[&str] = &["paymentStatus", "status", "violationStatus", "disposition"];
const DESC_KEYS: &[&str] = &["description", "violationDescription", "violation", "offense"];
const PLACE_KEYS: &[&str] = &["location", "address", "street"];
const AGENCY_KEYS: &[&str] = &["agency", "issuingAgency"];
const LIST_KEYS: &[&str] = &["data", "results", "citations", "violations", "tickets", "items"];

/// A JSON search endpoint taking plate/state as query parameters
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    pub path: &'static str,
    pub plate_param: &'static str,
    pub state_param: Option<&'static str>,
}

pub struct HeuristicFinder {
    info: FinderInfo,
    client: Client,
    base_url: String,
    endpoints: Vec<JsonEndpoint>,
    form: Option<PortalSession>,
}

impl HeuristicFinder {
    pub fn new(
        info: FinderInfo,
        client: Client,
        base_url: &str,
        endpoints: Vec<JsonEndpoint>,
        form: Option<PortalSession>,
    ) -> Self {
        Self {
            info,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            form,
        }
    }

    async fn try_json(
        &self,
        endpoint: &JsonEndpoint,
        query: &ViolationQuery,
    ) -> Result<Vec<ViolationRecord>, FinderError> {
        let url = join_url(&self.base_url, endpoint.path);
        let mut params = vec![(endpoint.plate_param, query.license_plate.as_str())];
        if let Some(state_param) = endpoint.state_param {
            if !query.state.is_empty() {
                params.push((state_param, query.state.as_str()));
            }
        }

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FinderError::Parse(format!("{}: {}", url, e)))?;
        Ok(records_from_json(&body, &self.info, query))
    }

    async fn try_form(
        &self,
        session: &PortalSession,
        query: &ViolationQuery,
    ) -> Result<Vec<ViolationRecord>, FinderError> {
        let page = session.submit(&query.license_plate, &query.state).await?;

        if let Some(table) = html::find_results_table(&page) {
            let records = records_from_table(&table, &self.info, query);
            if !records.is_empty() {
                return Ok(records);
            }
        }
        if html::contains_no_results(&page) {
            return Ok(Vec::new());
        }
        Ok(single_record_from_text(&page, &self.info, query)
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl Finder for HeuristicFinder {
    fn info(&self) -> &FinderInfo {
        &self.info
    }

    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
        let mut last_error = None;
        let mut answered = false;

        for endpoint in &self.endpoints {
            match self.try_json(endpoint, query).await {
                Ok(records) if !records.is_empty() => return Ok(records),
                Ok(_) => answered = true,
                Err(e) => {
                    debug!(finder = %self.info.name, endpoint = endpoint.path, error = %e, "JSON endpoint skipped");
                    last_error = Some(e);
                }
            }
        }

        if let Some(session) = &self.form {
            match self.try_form(session, query).await {
                Ok(records) if !records.is_empty() => return Ok(records),
                Ok(_) => answered = true,
                Err(e) => {
                    debug!(finder = %self.info.name, error = %e, "Form search skipped");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

/// Compare keys ignoring case, '_' and '-'
fn key_matches(key: &str, wanted: &str) -> bool {
    let squash = |s: &str| -> String {
        s.chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };
    squash(key) == squash(wanted)
}

/// First non-blank scalar under any of `keys`, in key order
fn lookup(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|wanted| {
        obj.iter()
            .find(|(k, _)| key_matches(k, wanted))
            .and_then(|(_, v)| match v {
                Value::String(s) => clean_text(Some(s.as_str())),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    })
}

/// The array of violation objects inside a JSON response
fn violation_items(body: &Value) -> Vec<&Map<String, Value>> {
    match body {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(obj) => {
            for key in LIST_KEYS {
                if let Some((_, Value::Array(items))) = obj.iter().find(|(k, _)| key_matches(k, key)) {
                    return items.iter().filter_map(Value::as_object).collect();
                }
            }
            if lookup(obj, NUMBER_KEYS).is_some() || lookup(obj, NOTICE_KEYS).is_some() {
                vec![obj]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Map a JSON response of unknown shape
pub fn records_from_json(
    body: &Value,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Vec<ViolationRecord> {
    violation_items(body)
        .into_iter()
        .filter_map(|item| {
            let number = lookup(item, NUMBER_KEYS);
            let notice = lookup(item, NOTICE_KEYS);
            if number.is_none() && notice.is_none() {
                return None;
            }

            let due = parse_amount_present(lookup(item, DUE_KEYS).as_deref());
            let fine = parse_amount_present(lookup(item, FINE_KEYS).as_deref());
            let paid = lookup(item, PAID_KEYS)
                .map(|v| parse_amount(&v))
                .unwrap_or(Decimal::ZERO);
            let status = lookup(item, STATUS_KEYS);
            let description = lookup(item, DESC_KEYS);
            let state = lookup(item, &["state", "plateState"])
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| query.state.clone());

            let mut record = ViolationRecord::new(info.provider, &query.license_plate, state);
            record.citation_number = number;
            record.notice_number = notice;
            record.agency = lookup(item, AGENCY_KEYS).or_else(|| Some(info.name.clone()));
            record.link = Some(info.link.clone());
            record.issue_date = parse_date_opt(lookup(item, DATE_KEYS).as_deref());
            record.amount = fine.or(due).unwrap_or(Decimal::ZERO);
            record.payment_status = refine_partial(
                classify_payment(due, status.as_deref()),
                paid,
                due.unwrap_or(Decimal::ZERO),
            );
            record.fine_type = infer_fine_type(description.as_deref());
            record.address = lookup(item, PLACE_KEYS);
            record.note = description;
            Some(record.settle(due))
        })
        .collect()
}

/// One record from free text: first citation number, first dollar amount
pub fn single_record_from_text(
    page: &str,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Option<ViolationRecord> {
    let (number, context) = html::citation_contexts(page).into_iter().next()?;
    let amount = html::extract_dollar_amounts(page)
        .first()
        .map(|a| parse_amount(a))
        .unwrap_or(Decimal::ZERO);

    let mut record = ViolationRecord::new(info.provider, &query.license_plate, &query.state);
    record.citation_number = Some(number);
    record.agency = Some(info.name.clone());
    record.link = Some(info.link.clone());
    record.amount = amount;
    record.payment_status = classify_payment(None, Some(context.as_str()));
    Some(record.settle(None))
}
