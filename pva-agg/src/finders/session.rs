//! Session-based portal scraping
//!
//! Flow per search:
//! 1. GET the search page; the client's cookie jar keeps the session cookie
//! 2. collect hidden inputs (view state, anti-forgery token) and any CSRF meta tag
//! 3. POST the search form with those fields plus plate/state
//! 4. parse the results table; fall back to regex extraction; a "no results"
//!    page is an empty result, not an error

use super::{join_url, Finder, FinderError, FinderInfo};
use crate::html::{self, Table};
use crate::models::{ViolationQuery, ViolationRecord};
use crate::normalize::{
    classify_payment, clean_text, infer_fine_type, parse_amount, parse_amount_present,
    parse_date_opt, refine_partial,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

/// Describes a portal's search form
#[derive(Debug, Clone)]
pub struct PortalForm {
    /// Page that sets the session cookie and carries the hidden fields
    pub page_path: &'static str,
    /// Form action; `None` posts back to `page_path`
    pub action_path: Option<&'static str>,
    pub plate_field: &'static str,
    pub state_field: Option<&'static str>,
    /// Constant fields such as the submit button name
    pub extra_fields: &'static [(&'static str, &'static str)],
}

/// Cookie-holding client bound to one portal
pub struct PortalSession {
    client: Client,
    base_url: String,
    form: PortalForm,
}

impl PortalSession {
    /// `client` should be built with a cookie store
    pub fn new(client: Client, base_url: &str, form: PortalForm) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            form,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FinderError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// GET the form page and return the tokens to echo back
    pub async fn open(&self) -> Result<Vec<(String, String)>, FinderError> {
        let url = join_url(&self.base_url, self.form.page_path);
        let page = self.get_text(&url).await?;

        let mut fields = html::hidden_inputs(&page);
        if let Some(token) = html::csrf_meta_token(&page) {
            if !fields.iter().any(|(name, _)| name == "_csrf") {
                fields.push(("_csrf".to_string(), token));
            }
        }

        debug!(url = %url, hidden_fields = fields.len(), "Portal session opened");
        Ok(fields)
    }

    /// Open a session and POST the search form with `value` as the plate/key
    pub async fn submit(&self, value: &str, state: &str) -> Result<String, FinderError> {
        let mut fields = self.open().await?;
        fields.extend(
            self.form
                .extra_fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        fields.push((self.form.plate_field.to_string(), value.to_string()));
        if let Some(state_field) = self.form.state_field {
            fields.push((state_field.to_string(), state.to_string()));
        }

        let url = join_url(
            &self.base_url,
            self.form.action_path.unwrap_or(self.form.page_path),
        );
        let response = self.client.post(&url).form(&fields).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::Http {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }
}

/// A results row with the balance the page printed for it
///
/// `amount_due` is `None` when the page has no balance column.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub record: ViolationRecord,
    pub amount_due: Option<Decimal>,
}

/// Turn a results page into records
///
/// Table first, then the "no results" check, then regex extraction. A page
/// that matches none of these is a parse error.
pub fn parse_results_page(
    page: &str,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Result<Vec<ViolationRecord>, FinderError> {
    Ok(parse_results_rows(page, info, query)?
        .into_iter()
        .map(|row| row.record)
        .collect())
}

/// Same as [`parse_results_page`], keeping each row's reported balance
pub fn parse_results_rows(
    page: &str,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Result<Vec<ParsedRow>, FinderError> {
    if let Some(table) = html::find_results_table(page) {
        return Ok(rows_from_table(&table, info, query));
    }

    if html::contains_no_results(page) {
        return Ok(Vec::new());
    }

    let records = records_from_text(page, info, query);
    if records.is_empty() {
        return Err(FinderError::Parse(format!(
            "{}: unrecognized results page ({} bytes)",
            info.name,
            page.len()
        )));
    }
    Ok(records
        .into_iter()
        .map(|record| ParsedRow {
            record,
            amount_due: None,
        })
        .collect())
}

/// Map every row of a results table
pub fn records_from_table(
    table: &Table,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Vec<ViolationRecord> {
    rows_from_table(table, info, query)
        .into_iter()
        .map(|row| row.record)
        .collect()
}

fn rows_from_table(table: &Table, info: &FinderInfo, query: &ViolationQuery) -> Vec<ParsedRow> {
    let number_col = table
        .column(&["citation", "ticket", "notice"])
        .or_else(|| table.column(&["violation #", "violation no", "number"]));
    let date_col = table.column_excluding(&["date", "issued"], &["due date", "paid"]);
    let fine_col = table.column_excluding(&["fine", "amount"], &["due", "balance", "paid", "owed"]);
    let due_col = table.column(&["due", "balance", "owed"]);
    let paid_col = table.column_excluding(&["paid"], &["unpaid"]);
    let status_col = table.column(&["status", "disposition"]);
    let desc_col = table.column(&["description", "offense", "violation type", "reason"]);
    let place_col = table.column(&["location", "address", "lot"]);

    let cell = |row: &Vec<String>, col: Option<usize>| -> Option<String> {
        col.and_then(|i| row.get(i)).and_then(|v| clean_text(Some(v.as_str())))
    };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let number = cell(row, number_col)?;
            let due = parse_amount_present(cell(row, due_col).as_deref());
            let fine = parse_amount_present(cell(row, fine_col).as_deref());
            let paid = cell(row, paid_col)
                .map(|v| parse_amount(&v))
                .unwrap_or(Decimal::ZERO);
            let status = cell(row, status_col);
            let description = cell(row, desc_col);

            let mut record = ViolationRecord::new(info.provider, &query.license_plate, &query.state);
            record.citation_number = Some(number);
            record.agency = Some(info.name.clone());
            record.link = Some(info.link.clone());
            record.issue_date = parse_date_opt(cell(row, date_col).as_deref());
            record.amount = fine.or(due).unwrap_or(Decimal::ZERO);
            record.payment_status = refine_partial(
                classify_payment(due, status.as_deref()),
                paid,
                due.unwrap_or(Decimal::ZERO),
            );
            record.fine_type = infer_fine_type(description.as_deref());
            record.address = cell(row, place_col);
            record.note = description.or(status);
            Some(ParsedRow {
                record: record.settle(due),
                amount_due: due,
            })
        })
        .collect()
}

/// Regex fallback: citation numbers paired positionally with dollar amounts
///
/// Status comes from the text following each citation, not the whole page.
pub fn records_from_text(
    page: &str,
    info: &FinderInfo,
    query: &ViolationQuery,
) -> Vec<ViolationRecord> {
    let amounts = html::extract_dollar_amounts(page);

    html::citation_contexts(page)
        .into_iter()
        .enumerate()
        .map(|(i, (number, context))| {
            let mut record = ViolationRecord::new(info.provider, &query.license_plate, &query.state);
            record.citation_number = Some(number);
            record.agency = Some(info.name.clone());
            record.link = Some(info.link.clone());
            record.amount = amounts
                .get(i)
                .map(|a| parse_amount(a))
                .unwrap_or(Decimal::ZERO);
            record.payment_status = classify_payment(None, Some(context.as_str()));
            record.settle(None)
        })
        .collect()
}

/// Finder for a portal reachable only through a session form
pub struct SessionFinder {
    info: FinderInfo,
    session: PortalSession,
}

impl SessionFinder {
    pub fn new(info: FinderInfo, session: PortalSession) -> Self {
        Self { info, session }
    }
}

#[async_trait]
impl Finder for SessionFinder {
    fn info(&self) -> &FinderInfo {
        &self.info
    }

    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
        let page = self
            .session
            .submit(&query.license_plate, &query.state)
            .await?;
        parse_results_page(&page, &self.info, query)
    }
}
