//! Value computations for label, version and project-field policies.

use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Labels may not contain spaces.
pub(crate) fn sanitize_label(tag: &str) -> String {
    tag.replace(' ', "_")
}

/// Computes the label set for the tags policy, sorted.
pub(crate) fn merged_labels(upstream: &[String], current: &[String], overwrite: bool) -> Vec<String> {
    let mut labels: BTreeSet<String> = upstream.iter().map(|t| sanitize_label(t)).collect();
    if !overwrite {
        labels.extend(current.iter().map(|t| sanitize_label(t)));
    }
    labels.into_iter().collect()
}

/// Unions extra labels into the current set, sorted.
pub(crate) fn with_labels(current: &[String], extra: &[String]) -> Vec<String> {
    current
        .iter()
        .chain(extra)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Computes fix versions: existing ones first (unless overwriting), then any
/// new upstream names.
pub(crate) fn merged_fix_versions(
    upstream: &[Option<String>],
    current: &[String],
    overwrite: bool,
) -> Vec<String> {
    let mut versions = if overwrite { Vec::new() } else { current.to_vec() };
    for version in upstream.iter().flatten() {
        if !versions.contains(version) {
            versions.push(version.clone());
        }
    }
    versions
}

/// Order-insensitive equality of two name lists.
pub(crate) fn same_set(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

/// Parses a story-point estimate into a JSON number.
pub(crate) fn storypoints_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(points) = trimmed.parse::<i64>() {
        return Some(json!(points));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .and_then(|p| serde_json::Number::from_f64(p).map(Value::Number))
}

/// Builds the tracker value for a priority name.
pub(crate) fn priority_value(name: &str) -> Value {
    json!({ "name": name })
}

/// Returns true if a stored field value already equals `wanted`. Numbers
/// compare by value, objects with a `name` compare by name.
pub(crate) fn field_matches(current: Option<&Value>, wanted: &Value) -> bool {
    let Some(current) = current else {
        return false;
    };
    match (current, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Object(a), Value::Object(b)) => a.get("name") == b.get("name"),
        _ => current == wanted,
    }
}
