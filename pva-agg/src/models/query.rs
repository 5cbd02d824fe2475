//! Search input types
//!
//! A [`ViolationQuery`] is one (plate, state) pair handed to a finder.
//! Plates are normalized once here so every finder sees the same spelling.

use serde::{Deserialize, Serialize};

/// State code meaning "applies regardless of requested state"
pub const NATIONWIDE: &str = "USA";

/// One plate lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationQuery {
    /// Upper-cased, whitespace-free plate
    pub license_plate: String,
    /// Upper-cased 2-letter state, empty when the vehicle has none
    pub state: String,
}

impl ViolationQuery {
    /// Normalize a raw plate/state pair. Returns `None` for a blank plate.
    pub fn new(license_plate: &str, state: Option<&str>) -> Option<Self> {
        let license_plate = normalize_plate(license_plate);
        if license_plate.is_empty() {
            return None;
        }

        Some(Self {
            license_plate,
            state: state.map(normalize_state).unwrap_or_default(),
        })
    }

    /// State to send to a finder registered for `finder_state`
    ///
    /// A vehicle without a state borrows the finder's own jurisdiction
    /// (nationwide finders receive an empty state).
    pub fn state_for(&self, finder_state: &str) -> String {
        if self.state.is_empty() && !finder_state.eq_ignore_ascii_case(NATIONWIDE) {
            normalize_state(finder_state)
        } else {
            self.state.clone()
        }
    }
}

/// Strip all whitespace and upper-case
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Trim and upper-case
pub fn normalize_state(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Vehicle as it arrives in a request body or from the vehicles table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarInput {
    #[serde(default)]
    pub license_plate: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl CarInput {
    pub fn new(license_plate: impl Into<String>, state: Option<&str>) -> Self {
        Self {
            license_plate: license_plate.into(),
            state: state.map(str::to_string),
        }
    }
}
