//! Socrata open-data finder
//!
//! Queries a SODA resource (`/resource/<id>.json`) with a SoQL filter on
//! plate and state, newest first, paging with `$limit`/`$offset`.
//!
//! Each dataset has its own row shape; a row type implements [`SocrataRow`]
//! to map itself into the canonical record.

use super::{Finder, FinderError, FinderInfo};
use crate::models::{ViolationQuery, ViolationRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::debug;

/// A dataset row that knows how to normalize itself
pub trait SocrataRow: DeserializeOwned + Send {
    /// `None` drops rows that carry no usable data
    fn into_record(self, info: &FinderInfo, query: &ViolationQuery) -> Option<ViolationRecord>;
}

/// Where a dataset lives and which columns to filter on
#[derive(Debug, Clone)]
pub struct SocrataDataset {
    /// Full `.../resource/<id>.json` URL
    pub resource_url: String,
    pub plate_field: &'static str,
    /// `None` when the dataset has no state column
    pub state_field: Option<&'static str>,
    /// Sorted descending
    pub order_field: &'static str,
}

/// Paged SODA reader shared by the open-data and hybrid finders
pub struct SocrataClient {
    client: Client,
    dataset: SocrataDataset,
    page_size: u32,
    max_records: u32,
}

impl SocrataClient {
    pub fn new(client: Client, dataset: SocrataDataset, page_size: u32, max_records: u32) -> Self {
        Self {
            client,
            dataset,
            page_size: page_size.max(1),
            max_records: max_records.max(1),
        }
    }

    /// SoQL parameters for one page
    pub fn query_params(&self, query: &ViolationQuery, limit: u32, offset: u32) -> Vec<(String, String)> {
        let mut clauses = vec![format!(
            "upper({}) = '{}'",
            self.dataset.plate_field,
            soql_escape(&query.license_plate)
        )];
        if let Some(state_field) = self.dataset.state_field {
            if !query.state.is_empty() {
                clauses.push(format!(
                    "upper({}) = '{}'",
                    state_field,
                    soql_escape(&query.state)
                ));
            }
        }

        vec![
            ("$where".to_string(), clauses.join(" AND ")),
            ("$order".to_string(), format!("{} DESC", self.dataset.order_field)),
            ("$limit".to_string(), limit.to_string()),
            ("$offset".to_string(), offset.to_string()),
        ]
    }

    /// One page of rows
    pub async fn fetch_page<R: DeserializeOwned>(
        &self,
        query: &ViolationQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<R>, FinderError> {
        let response = self
            .client
            .get(&self.dataset.resource_url)
            .query(&self.query_params(query, limit, offset))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FinderError::Http {
                status: status.as_u16(),
                url: self.dataset.resource_url.clone(),
            });
        }

        response
            .json::<Vec<R>>()
            .await
            .map_err(|e| FinderError::Parse(format!("open-data rows: {}", e)))
    }

    /// Page until a short page or `max_records`
    pub async fn fetch_all<R: DeserializeOwned>(
        &self,
        query: &ViolationQuery,
    ) -> Result<Vec<R>, FinderError> {
        let mut rows = Vec::new();
        let mut offset = 0u32;

        loop {
            let remaining = self.max_records.saturating_sub(offset);
            if remaining == 0 {
                break;
            }
            let limit = self.page_size.min(remaining);
            let page: Vec<R> = self.fetch_page(query, limit, offset).await?;
            let fetched = page.len() as u32;
            rows.extend(page);

            debug!(
                url = %self.dataset.resource_url,
                plate = %query.license_plate,
                offset,
                fetched,
                "Open-data page fetched"
            );

            if fetched < limit {
                break;
            }
            offset += fetched;
        }

        Ok(rows)
    }
}

fn soql_escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Finder over a single Socrata dataset with row type `R`
pub struct SocrataFinder<R> {
    info: FinderInfo,
    api: SocrataClient,
    _row: PhantomData<fn() -> R>,
}

impl<R> SocrataFinder<R> {
    pub fn new(info: FinderInfo, api: SocrataClient) -> Self {
        Self {
            info,
            api,
            _row: PhantomData,
        }
    }
}

#[async_trait]
impl<R: SocrataRow + 'static> Finder for SocrataFinder<R> {
    fn info(&self) -> &FinderInfo {
        &self.info
    }

    async fn search(&self, query: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
        let rows: Vec<R> = self.api.fetch_all(query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_record(&self.info, query))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> SocrataClient {
        SocrataClient::new(
            Client::new(),
            SocrataDataset {
                resource_url: "http://data.test/resource/abcd-1234.json".to_string(),
                plate_field: "tag",
                state_field: Some("state"),
                order_field: "violdate",
            },
            100,
            250,
        )
    }

    fn param<'a>(params: &'a [(String, String)], key: &str) -> &'a str {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_where_clause_filters_plate_and_state() {
        let q = ViolationQuery::new("abc123", Some("md")).unwrap();
        let params = api().query_params(&q, 100, 200);
        assert_eq!(
            param(&params, "$where"),
            "upper(tag) = 'ABC123' AND upper(state) = 'MD'"
        );
        assert_eq!(param(&params, "$order"), "violdate DESC");
        assert_eq!(param(&params, "$limit"), "100");
        assert_eq!(param(&params, "$offset"), "200");
    }

    #[test]
    fn test_where_clause_escapes_quotes_and_skips_empty_state() {
        let q = ViolationQuery {
            license_plate: "O'NEIL".to_string(),
            state: String::new(),
        };
        let params = api().query_params(&q, 10, 0);
        assert_eq!(param(&params, "$where"), "upper(tag) = 'O''NEIL'");
    }
}
