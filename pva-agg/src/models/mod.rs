//! Data models for pva-agg
//!
//! - query: plate/state search inputs
//! - violation: canonical record, payment status, persisted form
//! - aggregation: request/response bodies and the audit row

pub mod aggregation;
pub mod query;
pub mod violation;

pub use aggregation::{
    AggregationRequest, AggregationResult, AggregationRunRecord, CompanyAggregationRequest,
    CompanyAggregationResult, DateRange,
};
pub use query::{normalize_plate, normalize_state, CarInput, ViolationQuery, NATIONWIDE};
pub use violation::{
    FineType, PaymentStatus, PersistedViolation, UpsertOutcome, ViolationRecord, DEFAULT_CURRENCY,
};
