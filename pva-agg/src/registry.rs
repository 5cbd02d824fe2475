//! Static finder registry
//!
//! Built once at startup from the compiled jurisdiction list and read-only
//! afterwards, so it is shared behind an `Arc` without locking.

use crate::finders::jurisdictions::{builtin_finders, JurisdictionUrls};
use crate::finders::{Finder, FinderError, FinderInfo, FinderSettings, RegisteredFinder};
use crate::models::normalize_state;
use pva_common::config::TomlConfig;
use pva_common::events::EventBus;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct FinderRegistry {
    finders: Vec<RegisteredFinder>,
}

impl FinderRegistry {
    /// Wrap `finders` with the isolation policy (events + per-call timeout)
    pub fn new(finders: Vec<Arc<dyn Finder>>, events: EventBus, timeout: Duration) -> Self {
        Self {
            finders: finders
                .into_iter()
                .map(|f| RegisteredFinder::new(f, events.clone(), timeout))
                .collect(),
        }
    }

    /// Built-in jurisdictions minus `aggregation.disabled_finders`
    pub fn from_config(config: &TomlConfig, events: EventBus) -> Result<Self, FinderError> {
        Self::from_config_with_urls(config, &JurisdictionUrls::default(), events)
    }

    pub fn from_config_with_urls(
        config: &TomlConfig,
        urls: &JurisdictionUrls,
        events: EventBus,
    ) -> Result<Self, FinderError> {
        let settings = FinderSettings::from_config(&config.aggregation, &config.socrata);
        let disabled = &config.aggregation.disabled_finders;

        let finders: Vec<Arc<dyn Finder>> = builtin_finders(&settings, urls)?
            .into_iter()
            .filter(|f| {
                let name = &f.info().name;
                let keep = !disabled.iter().any(|d| d.trim().eq_ignore_ascii_case(name));
                if !keep {
                    info!(finder = %name, "Finder disabled by configuration");
                }
                keep
            })
            .collect();

        info!(count = finders.len(), "Finder registry initialized");
        Ok(Self::new(finders, events, settings.timeout))
    }

    pub fn list_finders(&self) -> &[RegisteredFinder] {
        &self.finders
    }

    pub fn infos(&self) -> Vec<FinderInfo> {
        self.finders.iter().map(|f| f.info().clone()).collect()
    }

    /// Finders whose state is in `states` (any case) plus all nationwide finders
    pub fn finders_for_states(&self, states: &HashSet<String>) -> Vec<RegisteredFinder> {
        let wanted: HashSet<String> = states.iter().map(|s| normalize_state(s)).collect();
        self.finders
            .iter()
            .filter(|f| f.info().matches_any(&wanted))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.finders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finders::FinderError;
    use crate::models::{ViolationQuery, ViolationRecord};
    use async_trait::async_trait;

    struct Named(FinderInfo);

    #[async_trait]
    impl Finder for Named {
        fn info(&self) -> &FinderInfo {
            &self.0
        }

        async fn search(&self, _: &ViolationQuery) -> Result<Vec<ViolationRecord>, FinderError> {
            Ok(Vec::new())
        }
    }

    fn registry() -> FinderRegistry {
        let finders: Vec<Arc<dyn Finder>> = vec![
            Arc::new(Named(FinderInfo::new("A", "", "NY", 1))),
            Arc::new(Named(FinderInfo::new("B", "", "USA", 2))),
            Arc::new(Named(FinderInfo::new("C", "", "CA", 3))),
        ];
        FinderRegistry::new(finders, EventBus::new(4), Duration::from_secs(1))
    }

    fn names(finders: &[RegisteredFinder]) -> HashSet<String> {
        finders.iter().map(|f| f.info().name.clone()).collect()
    }

    fn states(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_state_match_includes_nationwide() {
        let matched = registry().finders_for_states(&states(&["NY"]));
        assert_eq!(names(&matched), states(&["A", "B"]));
    }

    #[test]
    fn test_state_match_is_case_insensitive() {
        let matched = registry().finders_for_states(&states(&["ca", " ny "]));
        assert_eq!(names(&matched), states(&["A", "B", "C"]));
    }

    #[test]
    fn test_unknown_state_still_gets_nationwide() {
        let matched = registry().finders_for_states(&states(&["TX"]));
        assert_eq!(names(&matched), states(&["B"]));
    }

    #[test]
    fn test_disabled_finders_are_skipped() {
        let mut config = TomlConfig::default();
        config.aggregation.disabled_finders = vec!["rutgers parking services".to_string()];
        let registry = FinderRegistry::from_config(&config, EventBus::new(4)).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry
            .infos()
            .iter()
            .all(|i| i.name != "Rutgers Parking Services"));
    }
}
