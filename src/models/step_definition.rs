use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShopfloorError};

/// One stage in a product type's manufacturing sequence.
///
/// Definitions are immutable, seeded per product type. `step_number` is the
/// stable identity of the step within its product type; `sort_order` defines
/// the traversal order. Branching is data, not code: `conditional_on_step`
/// gates applicability on a value recorded earlier, `restart_from_step`
/// rewinds the unit on a blocking failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_number: u32,
    pub name: String,
    pub sort_order: u32,
    pub requires_barcode_scan: bool,
    pub requires_batch_number: bool,
    pub requires_value_input: bool,
    pub has_checklist: bool,
    pub blocks_on_failure: bool,
    /// This step only applies if `conditional_on_step` recorded `conditional_value`.
    pub conditional_on_step: Option<u32>,
    pub conditional_value: Option<String>,
    /// On a blocking failure, rewind the unit to this step instead of holding.
    pub restart_from_step: Option<u32>,
    /// Constraints keyed by measurement field name.
    #[serde(default)]
    pub validation_rules: HashMap<String, FieldConstraint>,
    /// Regex a scanned barcode must match, when `requires_barcode_scan`.
    #[serde(default)]
    pub barcode_pattern: Option<String>,
}

impl StepDefinition {
    /// Whether any recorded result on this step is subject to validation.
    pub fn has_validation(&self) -> bool {
        !self.validation_rules.is_empty()
            || self.requires_value_input
            || self.requires_batch_number
            || self.requires_barcode_scan
    }
}

/// Structured constraint for one measurement field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraint {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// The loaded, validated step sequence for one product type.
///
/// Construction is the fail-fast point for configuration problems: an empty
/// sequence, duplicate step numbers, or conditional/restart references that
/// do not point at an earlier step are rejected here, never at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSequence {
    product_type: String,
    steps: Vec<StepDefinition>,
}

impl StepSequence {
    pub fn new(product_type: impl Into<String>, mut steps: Vec<StepDefinition>) -> Result<Self> {
        let product_type = product_type.into();
        if steps.is_empty() {
            return Err(ShopfloorError::ConfigurationError(format!(
                "product type '{product_type}' has zero step definitions"
            )));
        }
        steps.sort_by_key(|s| s.sort_order);

        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if !seen.insert(step.step_number) {
                return Err(ShopfloorError::ConfigurationError(format!(
                    "product type '{product_type}' has duplicate step_number {}",
                    step.step_number
                )));
            }
        }
        for (idx, step) in steps.iter().enumerate() {
            if let Some(dep) = step.conditional_on_step {
                let dep_idx = steps.iter().position(|s| s.step_number == dep);
                match dep_idx {
                    Some(d) if d < idx => {}
                    _ => {
                        return Err(ShopfloorError::ConfigurationError(format!(
                            "step {} of '{product_type}' is conditional on step {dep}, \
                             which is not an earlier step",
                            step.step_number
                        )))
                    }
                }
                if step.conditional_value.is_none() {
                    return Err(ShopfloorError::ConfigurationError(format!(
                        "step {} of '{product_type}' sets conditional_on_step without \
                         conditional_value",
                        step.step_number
                    )));
                }
            }
            if let Some(restart) = step.restart_from_step {
                let restart_idx = steps.iter().position(|s| s.step_number == restart);
                match restart_idx {
                    Some(r) if r < idx => {}
                    _ => {
                        return Err(ShopfloorError::ConfigurationError(format!(
                            "step {} of '{product_type}' restarts from step {restart}, \
                             which is not an earlier step",
                            step.step_number
                        )))
                    }
                }
            }
        }

        Ok(Self {
            product_type,
            steps,
        })
    }

    pub fn product_type(&self) -> &str {
        &self.product_type
    }

    /// Steps in traversal (sort_order) order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn by_step_number(&self, step_number: u32) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// Index of a step in traversal order.
    pub fn position_of(&self, step_number: u32) -> Option<usize> {
        self.steps.iter().position(|s| s.step_number == step_number)
    }
}

/// Catalogue of step sequences keyed by product type.
#[derive(Debug, Clone, Default)]
pub struct SequenceCatalog {
    sequences: HashMap<String, StepSequence>,
}

impl SequenceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sequence: StepSequence) {
        self.sequences
            .insert(sequence.product_type().to_string(), sequence);
    }

    pub fn sequence_for(&self, product_type: &str) -> Result<&StepSequence> {
        self.sequences.get(product_type).ok_or_else(|| {
            ShopfloorError::ConfigurationError(format!(
                "no step sequence loaded for product type '{product_type}'"
            ))
        })
    }
}
