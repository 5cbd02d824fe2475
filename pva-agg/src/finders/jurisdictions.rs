//! Finders compiled into the registry
//!
//! | provider | name | state | kind |
//! |---|---|---|---|
//! | 1 | NYC Department of Finance | NY | hybrid |
//! | 2 | Baltimore City Parking | MD | open data |
//! | 3 | Rutgers Parking Services | NJ | session portal |
//! | 4 | National Citation Lookup | USA | heuristic |
//!
//! Every constructor takes its base URL so tests can point it at a local server.

use super::heuristic::{HeuristicFinder, JsonEndpoint};
use super::hybrid::HybridFinder;
use super::session::{PortalForm, PortalSession, SessionFinder};
use super::socrata::{SocrataClient, SocrataDataset, SocrataFinder, SocrataRow};
use super::{build_client, join_url, Finder, FinderError, FinderInfo, FinderSettings};
use crate::models::{ViolationQuery, ViolationRecord};
use crate::normalize::{
    classify_payment, clean_text, infer_fine_type, parse_amount_present, parse_date_opt,
    refine_partial,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

pub const NYC_PROVIDER: i32 = 1;
pub const BALTIMORE_PROVIDER: i32 = 2;
pub const RUTGERS_PROVIDER: i32 = 3;
pub const NATIONAL_PROVIDER: i32 = 4;

/// Base URLs of the built-in portals
#[derive(Debug, Clone)]
pub struct JurisdictionUrls {
    pub nyc_open_data: String,
    pub nyc_citypay: String,
    pub baltimore_open_data: String,
    pub rutgers_portal: String,
    pub national_lookup: String,
}

impl Default for JurisdictionUrls {
    fn default() -> Self {
        Self {
            nyc_open_data: "https://data.cityofnewyork.us".to_string(),
            nyc_citypay: "https://a836-citypay.nyc.gov".to_string(),
            baltimore_open_data: "https://data.baltimorecity.gov".to_string(),
            rutgers_portal: "https://rudots.nupark.com".to_string(),
            national_lookup: "https://www.citationlookup.us".to_string(),
        }
    }
}

/// Every built-in finder, each with its own HTTP client
pub fn builtin_finders(
    settings: &FinderSettings,
    urls: &JurisdictionUrls,
) -> Result<Vec<Arc<dyn Finder>>, FinderError> {
    Ok(vec![
        new_york_city(settings, &urls.nyc_open_data, &urls.nyc_citypay)?,
        baltimore_city(settings, &urls.baltimore_open_data)?,
        rutgers_portal(settings, &urls.rutgers_portal)?,
        national_lookup(settings, &urls.national_lookup)?,
    ])
}

// --- Baltimore City (open data) ---

/// Row of Baltimore's parking citations dataset
#[derive(Debug, Clone, Deserialize)]
pub struct BaltimoreCitationRow {
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub violdate: Option<String>,
    #[serde(default)]
    pub violfine: Option<String>,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl SocrataRow for BaltimoreCitationRow {
    fn into_record(self, info: &FinderInfo, query: &ViolationQuery) -> Option<ViolationRecord> {
        let citation = clean_text(self.citation.as_deref())?;
        let fine = parse_amount_present(self.violfine.as_deref());
        let due = parse_amount_present(self.balance.as_deref());
        let paid = match (fine, due) {
            (Some(f), Some(d)) if f > d => f - d,
            _ => Decimal::ZERO,
        };

        let mut record = ViolationRecord::new(
            info.provider,
            clean_text(self.tag.as_deref())
                .map(|t| t.to_uppercase())
                .unwrap_or_else(|| query.license_plate.clone()),
            clean_text(self.state.as_deref())
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| query.state.clone()),
        );
        record.citation_number = Some(citation);
        record.agency = Some(info.name.clone());
        record.link = Some(info.link.clone());
        record.issue_date = parse_date_opt(self.violdate.as_deref());
        record.amount = fine.or(due).unwrap_or(Decimal::ZERO);
        record.payment_status = refine_partial(
            classify_payment(due, None),
            paid,
            due.unwrap_or(Decimal::ZERO),
        );
        record.fine_type = infer_fine_type(self.description.as_deref());
        record.address = clean_text(self.location.as_deref());
        record.note = clean_text(self.description.as_deref());
        Some(record.settle(due))
    }
}

pub fn baltimore_city(
    settings: &FinderSettings,
    base_url: &str,
) -> Result<Arc<dyn Finder>, FinderError> {
    let info = FinderInfo::new(
        "Baltimore City Parking",
        "https://pay.baltimorecity.gov/parking",
        "MD",
        BALTIMORE_PROVIDER,
    );
    let api = SocrataClient::new(
        build_client(settings, false)?,
        SocrataDataset {
            resource_url: join_url(base_url, "/resource/n4ma-fj3m.json"),
            plate_field: "tag",
            state_field: Some("state"),
            order_field: "violdate",
        },
        settings.page_size,
        settings.max_records,
    );
    Ok(Arc::new(SocrataFinder::<BaltimoreCitationRow>::new(info, api)))
}

// --- New York City (open data + CityPay) ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummonsImage {
    #[serde(default)]
    pub url: Option<String>,
}

/// Row of NYC's open parking and camera violations dataset
#[derive(Debug, Clone, Deserialize)]
pub struct NycViolationRow {
    #[serde(default)]
    pub plate: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub summons_number: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub violation: Option<String>,
    #[serde(default)]
    pub fine_amount: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<String>,
    #[serde(default)]
    pub amount_due: Option<String>,
    #[serde(default)]
    pub issuing_agency: Option<String>,
    #[serde(default)]
    pub violation_status: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub summons_image: Option<SummonsImage>,
}

impl SocrataRow for NycViolationRow {
    fn into_record(self, info: &FinderInfo, query: &ViolationQuery) -> Option<ViolationRecord> {
        let summons = clean_text(self.summons_number.as_deref())?;
        let due = parse_amount_present(self.amount_due.as_deref());
        let paid = parse_amount_present(self.payment_amount.as_deref()).unwrap_or(Decimal::ZERO);

        let mut record = ViolationRecord::new(
            info.provider,
            clean_text(self.plate.as_deref())
                .map(|p| p.to_uppercase())
                .unwrap_or_else(|| query.license_plate.clone()),
            clean_text(self.state.as_deref())
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| query.state.clone()),
        );
        record.citation_number = Some(summons);
        record.agency = clean_text(self.issuing_agency.as_deref()).or_else(|| Some(info.name.clone()));
        record.link = self
            .summons_image
            .and_then(|img| clean_text(img.url.as_deref()))
            .or_else(|| Some(info.link.clone()));
        record.issue_date = parse_date_opt(self.issue_date.as_deref());
        record.amount = parse_amount_present(self.fine_amount.as_deref())
            .or(due)
            .unwrap_or(Decimal::ZERO);
        record.payment_status = refine_partial(
            classify_payment(due, self.violation_status.as_deref()),
            paid,
            due.unwrap_or(Decimal::ZERO),
        );
        record.fine_type = infer_fine_type(self.violation.as_deref());
        record.address = clean_text(self.county.as_deref());
        record.note = clean_text(self.violation.as_deref());
        Some(record.settle(due))
    }
}

pub fn new_york_city(
    settings: &FinderSettings,
    open_data_url: &str,
    citypay_url: &str,
) -> Result<Arc<dyn Finder>, FinderError> {
    let info = FinderInfo::new(
        "NYC Department of Finance",
        "https://www.nyc.gov/site/finance/vehicles/services-payments.page",
        "NY",
        NYC_PROVIDER,
    );
    let open_data = SocrataClient::new(
        build_client(settings, false)?,
        SocrataDataset {
            resource_url: join_url(open_data_url, "/resource/nc67-uf89.json"),
            plate_field: "plate",
            state_field: Some("state"),
            order_field: "issue_date",
        },
        settings.page_size,
        settings.max_records,
    );
    let portal = PortalSession::new(
        build_client(settings, true)?,
        citypay_url,
        PortalForm {
            page_path: "/citypay/Parking",
            action_path: Some("/citypay/Parking/searchByViolation"),
            plate_field: "VIOLATION_NUMBER",
            state_field: None,
            extra_fields: &[("SEARCH_TYPE", "VIOLATION")],
        },
    );
    Ok(Arc::new(HybridFinder::<NycViolationRow>::new(
        info,
        open_data,
        portal,
        settings.portal_delay,
    )))
}

// --- Rutgers (session portal) ---

pub fn rutgers_portal(
    settings: &FinderSettings,
    base_url: &str,
) -> Result<Arc<dyn Finder>, FinderError> {
    let info = FinderInfo::new(
        "Rutgers Parking Services",
        "https://ipo.rutgers.edu/dots/parking-citations",
        "NJ",
        RUTGERS_PROVIDER,
    );
    let session = PortalSession::new(
        build_client(settings, true)?,
        base_url,
        PortalForm {
            page_path: "/v2/portal/citations",
            action_path: Some("/v2/portal/citations/search"),
            plate_field: "LicensePlate",
            state_field: Some("StateCode"),
            extra_fields: &[("SearchBy", "Plate")],
        },
    );
    Ok(Arc::new(SessionFinder::new(info, session)))
}

// --- Nationwide (heuristic) ---

pub fn national_lookup(
    settings: &FinderSettings,
    base_url: &str,
) -> Result<Arc<dyn Finder>, FinderError> {
    let info = FinderInfo::new(
        "National Citation Lookup",
        "https://www.citationlookup.us",
        "USA",
        NATIONAL_PROVIDER,
    );
    let endpoints = vec![
        JsonEndpoint {
            path: "/api/v2/citations",
            plate_param: "plate",
            state_param: Some("state"),
        },
        JsonEndpoint {
            path: "/api/citations/search",
            plate_param: "licensePlate",
            state_param: Some("plateState"),
        },
    ];
    let form = PortalSession::new(
        build_client(settings, true)?,
        base_url,
        PortalForm {
            page_path: "/search",
            action_path: None,
            plate_field: "plate",
            state_field: Some("state"),
            extra_fields: &[],
        },
    );
    Ok(Arc::new(HeuristicFinder::new(
        info,
        build_client(settings, false)?,
        base_url,
        endpoints,
        Some(form),
    )))
}
