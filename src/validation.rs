//! Validation of operator-recorded results against step validation rules.
//!
//! Two failure classes with different handling (see the error taxonomy):
//! structurally missing inputs are synchronous [`ValidationError`]s that leave
//! the execution untouched; constraint breaches (range, pattern) produce a
//! failed [`ValidationReport`] that flows into the execution's
//! validation_status.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::StepDefinition;

/// Operator input for one `record_result` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedResult {
    pub value_recorded: Option<String>,
    #[serde(default)]
    pub measurement_values: HashMap<String, serde_json::Value>,
    pub barcode_scanned: Option<String>,
    pub batch_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required input(s): {}", fields.join(", "))]
    MissingInput { fields: Vec<String> },

    #[error("invalid validation pattern for '{field}': {pattern}")]
    BadPattern { field: String, pattern: String },
}

/// One constraint breach on a recorded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub field: String,
    pub reason: String,
}

/// Aggregate result of validating one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.failures.push(ValidationFailure {
            field: field.to_string(),
            reason: reason.into(),
        });
    }
}

/// Reject a recording that omits inputs the step requires.
pub fn check_required_inputs(
    step: &StepDefinition,
    result: &RecordedResult,
) -> Result<(), ValidationError> {
    let mut missing = Vec::new();
    if step.requires_value_input && result.value_recorded.is_none() {
        missing.push("value_recorded".to_string());
    }
    if step.requires_batch_number && result.batch_number.is_none() {
        missing.push("batch_number".to_string());
    }
    if step.requires_barcode_scan && result.barcode_scanned.is_none() {
        missing.push("barcode_scanned".to_string());
    }
    for (field, constraint) in &step.validation_rules {
        if constraint.required && !result.measurement_values.contains_key(field) {
            missing.push(format!("measurement:{field}"));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort();
        Err(ValidationError::MissingInput { fields: missing })
    }
}

/// Evaluate range and pattern constraints against a recording.
///
/// Assumes [`check_required_inputs`] already passed; absent optional fields
/// are not failures here.
pub fn validate(
    step: &StepDefinition,
    result: &RecordedResult,
) -> Result<ValidationReport, ValidationError> {
    let mut report = ValidationReport::default();

    for (field, constraint) in &step.validation_rules {
        let Some(value) = result.measurement_values.get(field) else {
            continue;
        };
        if constraint.min.is_some() || constraint.max.is_some() {
            match value.as_f64() {
                Some(numeric) => {
                    if let Some(min) = constraint.min {
                        if numeric < min {
                            report.fail(field, format!("{numeric} below minimum {min}"));
                        }
                    }
                    if let Some(max) = constraint.max {
                        if numeric > max {
                            report.fail(field, format!("{numeric} above maximum {max}"));
                        }
                    }
                }
                None => report.fail(field, "expected a numeric value"),
            }
        }
        if let Some(pattern) = &constraint.pattern {
            let regex = compile(field, pattern)?;
            match value.as_str() {
                Some(text) if regex.is_match(text) => {}
                Some(text) => report.fail(field, format!("'{text}' does not match {pattern}")),
                None => report.fail(field, "expected a string value"),
            }
        }
    }

    if let (Some(pattern), Some(barcode)) = (&step.barcode_pattern, &result.barcode_scanned) {
        let regex = compile("barcode_scanned", pattern)?;
        if !regex.is_match(barcode) {
            report.fail(
                "barcode_scanned",
                format!("'{barcode}' does not match {pattern}"),
            );
        }
    }

    Ok(report)
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ValidationError> {
    Regex::new(pattern).map_err(|_| ValidationError::BadPattern {
        field: field.to_string(),
        pattern: pattern.to_string(),
    })
}
