//! Step graph resolution.
//!
//! Pure functions over a loaded [`StepSequence`] and the unit's recorded
//! history. Branching is declarative data on the definitions
//! (conditional_on_step, restart_from_step); no per-product code paths.

use std::collections::HashMap;

use crate::models::{ExecutionStatus, StepDefinition, StepExecution, StepSequence};

/// Outcome of the attempt the unit just finished at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Pass,
    Fail,
}

/// Where the unit goes after a step, per the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Advance to `step`; `skipped` lists conditionally inapplicable steps
    /// passed over on the way, in traversal order, for audit records.
    Next { step: u32, skipped: Vec<u32> },
    /// Blocking failure with a configured rewind point.
    Restart { step: u32 },
    /// Blocking failure with no rewind; unit holds at the current step.
    Blocked,
    /// No further applicable definition; the unit is done.
    Terminal { skipped: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolverError {
    #[error("step {step_number} does not belong to product type '{product_type}'")]
    UnknownStep {
        step_number: u32,
        product_type: String,
    },
}

/// Recorded values per completed step, used to evaluate step conditions.
#[derive(Debug, Clone, Default)]
pub struct UnitHistory {
    recorded: HashMap<u32, String>,
}

impl UnitHistory {
    /// Build history from a unit's executions: the latest completed,
    /// non-superseded value per step. Superseded attempts are audit trail
    /// only and do not drive branching.
    pub fn from_executions(executions: &[StepExecution]) -> Self {
        let mut recorded = HashMap::new();
        for execution in executions {
            if execution.status == ExecutionStatus::Completed && !execution.is_superseded() {
                if let Some(value) = &execution.value_recorded {
                    recorded.insert(execution.step_number, value.clone());
                }
            }
        }
        Self { recorded }
    }

    pub fn record(&mut self, step_number: u32, value: impl Into<String>) {
        self.recorded.insert(step_number, value.into());
    }

    pub fn recorded_value(&self, step_number: u32) -> Option<&str> {
        self.recorded.get(&step_number).map(String::as_str)
    }
}

/// Whether a definition applies to this unit given its recorded history.
fn applies(step: &StepDefinition, history: &UnitHistory) -> bool {
    match (step.conditional_on_step, &step.conditional_value) {
        (Some(dep), Some(expected)) => {
            history.recorded_value(dep) == Some(expected.as_str())
        }
        _ => true,
    }
}

fn scan_forward(sequence: &StepSequence, history: &UnitHistory, start: usize) -> Resolution {
    let mut skipped = Vec::new();
    for step in &sequence.steps()[start..] {
        if applies(step, history) {
            return Resolution::Next {
                step: step.step_number,
                skipped,
            };
        }
        skipped.push(step.step_number);
    }
    Resolution::Terminal { skipped }
}

/// First applicable step for a unit with no execution history yet.
pub fn first_applicable(sequence: &StepSequence, history: &UnitHistory) -> Resolution {
    scan_forward(sequence, history, 0)
}

/// Resolve the step after `completed_step` given the attempt's outcome.
pub fn resolve_next(
    sequence: &StepSequence,
    history: &UnitHistory,
    completed_step: u32,
    outcome: StepOutcome,
) -> Result<Resolution, ResolverError> {
    let position = sequence.position_of(completed_step).ok_or_else(|| {
        ResolverError::UnknownStep {
            step_number: completed_step,
            product_type: sequence.product_type().to_string(),
        }
    })?;
    let definition = &sequence.steps()[position];

    if outcome == StepOutcome::Fail && definition.blocks_on_failure {
        if let Some(restart) = definition.restart_from_step {
            return Ok(Resolution::Restart { step: restart });
        }
        return Ok(Resolution::Blocked);
    }

    // Pass, or a recorded non-blocking defect: flow continues.
    Ok(scan_forward(sequence, history, position + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn step(step_number: u32, sort_order: u32) -> StepDefinition {
        StepDefinition {
            step_number,
            name: format!("step-{step_number}"),
            sort_order,
            requires_barcode_scan: false,
            requires_batch_number: false,
            requires_value_input: false,
            has_checklist: false,
            blocks_on_failure: false,
            conditional_on_step: None,
            conditional_value: None,
            restart_from_step: None,
            validation_rules: StdHashMap::new(),
            barcode_pattern: None,
        }
    }

    fn sequence() -> StepSequence {
        // 10 -> 20 (conditional on 10 == "variant-a") -> 30 (blocking,
        // restart from 10) -> 40
        let mut conditional = step(20, 2);
        conditional.conditional_on_step = Some(10);
        conditional.conditional_value = Some("variant-a".to_string());
        let mut blocking = step(30, 3);
        blocking.blocks_on_failure = true;
        blocking.restart_from_step = Some(10);
        StepSequence::new("widget", vec![step(10, 1), conditional, blocking, step(40, 4)])
            .unwrap()
    }

    #[test]
    fn test_first_applicable_is_first_in_sort_order() {
        let resolution = first_applicable(&sequence(), &UnitHistory::default());
        assert_eq!(
            resolution,
            Resolution::Next {
                step: 10,
                skipped: vec![]
            }
        );
    }

    #[test]
    fn test_pass_advances_to_applicable_conditional() {
        let mut history = UnitHistory::default();
        history.record(10, "variant-a");
        let resolution =
            resolve_next(&sequence(), &history, 10, StepOutcome::Pass).unwrap();
        assert_eq!(
            resolution,
            Resolution::Next {
                step: 20,
                skipped: vec![]
            }
        );
    }

    #[test]
    fn test_failed_condition_reports_skip() {
        let mut history = UnitHistory::default();
        history.record(10, "variant-b");
        let resolution =
            resolve_next(&sequence(), &history, 10, StepOutcome::Pass).unwrap();
        assert_eq!(
            resolution,
            Resolution::Next {
                step: 30,
                skipped: vec![20]
            }
        );
    }

    #[test]
    fn test_blocking_failure_with_restart_rewinds() {
        let resolution = resolve_next(
            &sequence(),
            &UnitHistory::default(),
            30,
            StepOutcome::Fail,
        )
        .unwrap();
        assert_eq!(resolution, Resolution::Restart { step: 10 });
    }

    #[test]
    fn test_blocking_failure_without_restart_blocks() {
        let mut blocking = step(30, 3);
        blocking.blocks_on_failure = true;
        let seq = StepSequence::new("widget", vec![step(10, 1), blocking]).unwrap();
        let resolution =
            resolve_next(&seq, &UnitHistory::default(), 30, StepOutcome::Fail).unwrap();
        assert_eq!(resolution, Resolution::Blocked);
    }

    #[test]
    fn test_non_blocking_failure_advances() {
        let seq = StepSequence::new("widget", vec![step(10, 1), step(20, 2)]).unwrap();
        let resolution =
            resolve_next(&seq, &UnitHistory::default(), 10, StepOutcome::Fail).unwrap();
        assert_eq!(
            resolution,
            Resolution::Next {
                step: 20,
                skipped: vec![]
            }
        );
    }

    #[test]
    fn test_last_step_is_terminal() {
        let resolution = resolve_next(
            &sequence(),
            &UnitHistory::default(),
            40,
            StepOutcome::Pass,
        )
        .unwrap();
        assert_eq!(resolution, Resolution::Terminal { skipped: vec![] });
    }

    #[test]
    fn test_trailing_inapplicable_steps_skip_to_terminal() {
        let mut trailing = step(20, 2);
        trailing.conditional_on_step = Some(10);
        trailing.conditional_value = Some("never".to_string());
        let seq = StepSequence::new("widget", vec![step(10, 1), trailing]).unwrap();
        let mut history = UnitHistory::default();
        history.record(10, "something-else");
        let resolution = resolve_next(&seq, &history, 10, StepOutcome::Pass).unwrap();
        assert_eq!(resolution, Resolution::Terminal { skipped: vec![20] });
    }

    #[test]
    fn test_unknown_step_rejected() {
        let err = resolve_next(
            &sequence(),
            &UnitHistory::default(),
            99,
            StepOutcome::Pass,
        )
        .unwrap_err();
        assert!(matches!(err, ResolverError::UnknownStep { step_number: 99, .. }));
    }
}
