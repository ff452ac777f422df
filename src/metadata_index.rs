//! Secondary index mapping `(field, value) -> set<noun_id>`, plus the composable
//! filter grammar used to evaluate structured predicates against a noun's metadata.
//!
//! Grounded on the teacher's `query::Filter` enum and its `matches_value`/
//! `get_field` dotted-path evaluator, renamed `MetadataFilter` and extended with
//! `StartsWith` (the teacher only has `Contains` and regex `Matches`).

use dashmap::{DashMap, DashSet};
use serde_json::Value as JsonValue;

/// A composable metadata predicate.
#[derive(Debug, Clone)]
pub enum MetadataFilter {
    Eq(String, JsonValue),
    Ne(String, JsonValue),
    Gt(String, JsonValue),
    Lt(String, JsonValue),
    Ge(String, JsonValue),
    Le(String, JsonValue),
    Contains(String, String),
    StartsWith(String, String),
    Exists(String),
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// Evaluate this filter against a noun's metadata object.
    pub fn matches(&self, metadata: &serde_json::Map<String, JsonValue>) -> bool {
        match self {
            MetadataFilter::Eq(field, value) => get_field(metadata, field) == Some(value),
            MetadataFilter::Ne(field, value) => get_field(metadata, field) != Some(value),
            MetadataFilter::Gt(field, value) => {
                compare_json(get_field(metadata, field), value) == Some(std::cmp::Ordering::Greater)
            }
            MetadataFilter::Lt(field, value) => {
                compare_json(get_field(metadata, field), value) == Some(std::cmp::Ordering::Less)
            }
            MetadataFilter::Ge(field, value) => {
                matches!(
                    compare_json(get_field(metadata, field), value),
                    Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
                )
            }
            MetadataFilter::Le(field, value) => {
                matches!(
                    compare_json(get_field(metadata, field), value),
                    Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
                )
            }
            MetadataFilter::Contains(field, needle) => get_field(metadata, field)
                .and_then(JsonValue::as_str)
                .map(|s| s.contains(needle.as_str()))
                .unwrap_or(false),
            MetadataFilter::StartsWith(field, prefix) => get_field(metadata, field)
                .and_then(JsonValue::as_str)
                .map(|s| s.starts_with(prefix.as_str()))
                .unwrap_or(false),
            MetadataFilter::Exists(field) => get_field(metadata, field).is_some(),
            MetadataFilter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            MetadataFilter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }
}

/// Resolve a dotted path (`nested.deep.value`) against a metadata object.
fn get_field<'a>(metadata: &'a serde_json::Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = metadata.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare_json(actual: Option<&JsonValue>, expected: &JsonValue) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Normalize a leaf JSON value into the string form the inverted index stores.
fn normalize_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The `(field, value) -> set<noun_id>` secondary index, rebuilt lazily from a
/// full noun scan on cold start (grounded on the teacher's `DashMap`-based
/// indexes throughout `storage.rs`/`causal_graph.rs`).
#[derive(Debug, Default)]
pub struct MetadataIndex {
    by_field_value: DashMap<(String, String), DashSet<String>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every top-level and dotted-nested field on a noun's metadata.
    pub fn index_noun(&self, noun_id: &str, metadata: &serde_json::Map<String, JsonValue>) {
        for (field, value) in flatten(metadata) {
            self.by_field_value
                .entry((field, normalize_value(&value)))
                .or_default()
                .insert(noun_id.to_string());
        }
    }

    /// Remove a noun's entries for the given metadata snapshot (its last known values).
    pub fn remove_noun(&self, noun_id: &str, metadata: &serde_json::Map<String, JsonValue>) {
        for (field, value) in flatten(metadata) {
            if let Some(set) = self.by_field_value.get(&(field, normalize_value(&value))) {
                set.remove(noun_id);
            }
        }
    }

    /// O(1)-expected exact lookup.
    pub fn get_ids(&self, field: &str, value: &JsonValue) -> Vec<String> {
        self.by_field_value
            .get(&(field.to_string(), normalize_value(value)))
            .map(|set| set.iter().map(|e| e.clone()).collect())
            .unwrap_or_default()
    }

    /// Distinct indexed field names, for statistics reporting.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_field_value
            .iter()
            .map(|entry| entry.key().0.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Composite predicate evaluation: every noun whose metadata satisfies `filter`.
    ///
    /// Uses the inverted index as a fast path for a bare `Eq` leaf or an `And`
    /// rooted in one; falls back to scanning the provided metadata snapshot map
    /// for anything richer (`Or`, ranges, `contains`/`startsWith`).
    pub fn get_ids_matching(
        &self,
        filter: &MetadataFilter,
        all_metadata: &DashMap<String, serde_json::Map<String, JsonValue>>,
    ) -> Vec<String> {
        if let MetadataFilter::Eq(field, value) = filter {
            return self.get_ids(field, value);
        }
        all_metadata
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

fn flatten(metadata: &serde_json::Map<String, JsonValue>) -> Vec<(String, JsonValue)> {
    let mut out = Vec::new();
    flatten_into(metadata, "", &mut out);
    out
}

fn flatten_into(metadata: &serde_json::Map<String, JsonValue>, prefix: &str, out: &mut Vec<(String, JsonValue)>) {
    for (key, value) in metadata {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            JsonValue::Object(nested) => flatten_into(nested, &path, out),
            leaf => out.push((path, leaf.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, JsonValue)]) -> serde_json::Map<String, JsonValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn eq_filter_matches_exact_value() {
        let m = meta(&[("domain", json!("finance"))]);
        assert!(MetadataFilter::Eq("domain".to_string(), json!("finance")).matches(&m));
        assert!(!MetadataFilter::Eq("domain".to_string(), json!("health")).matches(&m));
    }

    #[test]
    fn nested_dotted_path_resolves() {
        let m = meta(&[("address", json!({"city": "Austin"}))]);
        assert!(MetadataFilter::Eq("address.city".to_string(), json!("Austin")).matches(&m));
    }

    #[test]
    fn and_or_combinators_compose() {
        let m = meta(&[("age", json!(30)), ("domain", json!("finance"))]);
        let f = MetadataFilter::And(vec![
            MetadataFilter::Gt("age".to_string(), json!(18)),
            MetadataFilter::Or(vec![
                MetadataFilter::Eq("domain".to_string(), json!("finance")),
                MetadataFilter::Eq("domain".to_string(), json!("health")),
            ]),
        ]);
        assert!(f.matches(&m));
    }

    #[test]
    fn starts_with_and_contains() {
        let m = meta(&[("title", json!("Quarterly Report"))]);
        assert!(MetadataFilter::StartsWith("title".to_string(), "Quarterly".to_string()).matches(&m));
        assert!(MetadataFilter::Contains("title".to_string(), "Report".to_string()).matches(&m));
    }

    #[test]
    fn inverted_index_round_trips() {
        let index = MetadataIndex::new();
        let m = meta(&[("domain", json!("finance"))]);
        index.index_noun("n1", &m);
        assert_eq!(index.get_ids("domain", &json!("finance")), vec!["n1".to_string()]);
        index.remove_noun("n1", &m);
        assert!(index.get_ids("domain", &json!("finance")).is_empty());
    }
}
