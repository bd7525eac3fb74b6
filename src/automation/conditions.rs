//! Condition tree evaluation over flattened event payload paths.

use serde_json::Value;

use super::RuleError;
use crate::models::Condition;

/// Walk a dotted key path into a JSON payload, e.g. `item.status`.
pub fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Evaluate one condition against a trigger payload.
///
/// Absent fields fail equality, comparison, and membership tests (and
/// satisfy `NotEq`); a present but non-numeric field under a numeric
/// comparison is a rule error, isolated to the rule that carries it.
pub fn evaluate(condition: &Condition, payload: &Value) -> Result<bool, RuleError> {
    match condition {
        Condition::All { conditions } => {
            for condition in conditions {
                if !evaluate(condition, payload)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any { conditions } => {
            for condition in conditions {
                if evaluate(condition, payload)? {
                    return Ok(true);
                }
            }
            Ok(conditions.is_empty())
        }
        Condition::Eq { path, value } => {
            Ok(lookup_path(payload, path) == Some(value))
        }
        Condition::NotEq { path, value } => {
            Ok(lookup_path(payload, path) != Some(value))
        }
        Condition::Gt { path, value } => numeric(payload, path)
            .map(|n| n.map(|n| n > *value).unwrap_or(false)),
        Condition::Gte { path, value } => numeric(payload, path)
            .map(|n| n.map(|n| n >= *value).unwrap_or(false)),
        Condition::Lt { path, value } => numeric(payload, path)
            .map(|n| n.map(|n| n < *value).unwrap_or(false)),
        Condition::Lte { path, value } => numeric(payload, path)
            .map(|n| n.map(|n| n <= *value).unwrap_or(false)),
        Condition::In { path, values } => {
            Ok(lookup_path(payload, path)
                .map(|v| values.contains(v))
                .unwrap_or(false))
        }
    }
}

/// Every condition in the set must hold; an empty set matches unconditionally.
pub fn evaluate_all(conditions: &[Condition], payload: &Value) -> Result<bool, RuleError> {
    for condition in conditions {
        if !evaluate(condition, payload)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn numeric(payload: &Value, path: &str) -> Result<Option<f64>, RuleError> {
    match lookup_path(payload, path) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(RuleError::TypeMismatch {
                path: path.to_string(),
                expected: "a number",
            }),
    }
}
