//! Metadata filters: conjunction of exact field matches

use crate::store::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Required metadata values; a chunk must match every entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    fields: BTreeMap<String, String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required `field == value` pair
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Parse a `field=value` argument
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (field, value) = pair.split_once('=')?;
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some((field.to_string(), value.trim().to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    /// True when every field is present with exactly the required value
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

impl FromIterator<(String, String)> for Filter {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&Metadata::new()));
    }

    #[test]
    fn test_conjunction() {
        let filter = Filter::new().with("topic", "solar").with("page", "3");
        assert!(filter.matches(&meta(&[("topic", "solar"), ("page", "3"), ("source", "x")])));
        assert!(!filter.matches(&meta(&[("topic", "solar"), ("page", "4")])));
        assert!(!filter.matches(&meta(&[("topic", "solar")])));
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let filter = Filter::new().with("topic", "wind");
        assert!(!filter.matches(&meta(&[("topic", "Wind")])));
        assert!(!filter.matches(&meta(&[("topic", "wind farm")])));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            Filter::parse_pair("topic = wind"),
            Some(("topic".to_string(), "wind".to_string()))
        );
        assert_eq!(Filter::parse_pair("topic"), None);
        assert_eq!(Filter::parse_pair("=wind"), None);
    }

    #[test]
    fn test_deserialize_from_map() {
        let filter: Filter = serde_json::from_str(r#"{"topic":"wind"}"#).unwrap();
        assert_eq!(filter, Filter::new().with("topic", "wind"));
    }

    #[quickcheck]
    fn prop_filter_built_from_metadata_matches_it(pairs: Vec<(String, String)>) -> bool {
        let metadata: Metadata = pairs.iter().cloned().collect();
        let filter: Filter = metadata.clone().into_iter().collect();
        filter.matches(&metadata)
    }

    #[quickcheck]
    fn prop_adding_a_field_never_widens(pairs: Vec<(String, String)>, extra: (String, String)) -> bool {
        let metadata: Metadata = pairs.into_iter().collect();
        let base: Filter = metadata.clone().into_iter().take(1).collect();
        let narrowed = base.clone().with(extra.0, extra.1);
        !narrowed.matches(&metadata) || base.matches(&metadata)
    }
}
