//! # PVA Common Library
//!
//! Shared code for the parking-violation aggregation services:
//! - Error types
//! - Event types and the broadcast EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
