//! Field mapping projection: event fields into action parameters.
//!
//! Mapping values are literals; strings may embed `{{event.path}}`
//! placeholders. A string that is exactly one placeholder projects the raw
//! JSON value at that path (numbers stay numbers); placeholders inside a
//! longer string interpolate as text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::conditions::lookup_path;
use super::RuleError;
use crate::models::automation_rule::FieldMappings;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*event\.([A-Za-z0-9_.]+)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Project field mappings against a trigger payload.
pub fn project(
    mappings: &FieldMappings,
    payload: &Value,
) -> Result<Map<String, Value>, RuleError> {
    let mut params = Map::new();
    for (name, template) in mappings {
        params.insert(name.clone(), project_value(template, payload)?);
    }
    Ok(params)
}

fn project_value(template: &Value, payload: &Value) -> Result<Value, RuleError> {
    let Value::String(text) = template else {
        return Ok(template.clone());
    };
    let regex = placeholder_regex();

    // Whole-string placeholder keeps the source value's JSON type.
    if let Some(captures) = regex.captures(text) {
        if captures.get(0).map(|m| m.as_str()) == Some(text.as_str()) {
            let path = &captures[1];
            return lookup_path(payload, path)
                .cloned()
                .ok_or_else(|| RuleError::MissingField {
                    path: path.to_string(),
                });
        }
    }

    let mut missing = None;
    let interpolated = regex.replace_all(text, |captures: &regex::Captures<'_>| {
        let path = &captures[1];
        match lookup_path(payload, path) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                missing.get_or_insert_with(|| path.to_string());
                String::new()
            }
        }
    });
    if let Some(path) = missing {
        return Err(RuleError::MissingField { path });
    }
    Ok(Value::String(interpolated.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "serial_number": "SN-42",
            "step_number": 40,
            "item": { "status": "completed" }
        })
    }

    fn mappings(pairs: &[(&str, Value)]) -> FieldMappings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_literals_pass_through() {
        let params = project(
            &mappings(&[("status", json!("on_hold")), ("count", json!(3))]),
            &payload(),
        )
        .unwrap();
        assert_eq!(params["status"], json!("on_hold"));
        assert_eq!(params["count"], json!(3));
    }

    #[test]
    fn test_whole_placeholder_keeps_type() {
        let params = project(
            &mappings(&[("step", json!("{{event.step_number}}"))]),
            &payload(),
        )
        .unwrap();
        assert_eq!(params["step"], json!(40));
    }

    #[test]
    fn test_embedded_placeholders_interpolate() {
        let params = project(
            &mappings(&[(
                "message",
                json!("unit {{event.serial_number}} reached step {{event.step_number}}"),
            )]),
            &payload(),
        )
        .unwrap();
        assert_eq!(params["message"], json!("unit SN-42 reached step 40"));
    }

    #[test]
    fn test_nested_path() {
        let params = project(
            &mappings(&[("status", json!("{{event.item.status}}"))]),
            &payload(),
        )
        .unwrap();
        assert_eq!(params["status"], json!("completed"));
    }

    #[test]
    fn test_missing_field_is_rule_error() {
        let err = project(
            &mappings(&[("oops", json!("{{event.absent}}"))]),
            &payload(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::MissingField { path } if path == "absent"));
    }
}
