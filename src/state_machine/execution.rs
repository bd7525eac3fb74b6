use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::errors::{StateMachineError, StateMachineResult};
use crate::events::{DomainEvent, EventPublisher};
use crate::models::{
    ExecutionStatus, ProductionUnit, StepDefinition, StepExecution, UnitStatus, ValidationStatus,
};
use crate::store::Store;
use crate::validation::{self, RecordedResult};

/// Events driving step execution transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    Start,
    Complete,
    FailBlocking,
    Skip,
}

/// Result of recording an operator result on an execution.
#[derive(Debug, Clone)]
pub enum RecordedOutcome {
    /// Validation passed, or the defect was non-blocking; execution is terminal.
    Completed(StepExecution),
    /// Blocking validation failure; execution stays in_progress, unit on hold.
    Blocked(StepExecution),
}

/// State machine over step executions, persisting through the store and
/// emitting domain events on completion and blockage.
#[derive(Clone)]
pub struct ExecutionStateMachine {
    store: Arc<dyn Store>,
    publisher: EventPublisher,
}

impl ExecutionStateMachine {
    pub fn new(store: Arc<dyn Store>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Determine the target state for an event, or reject the transition.
    pub fn determine_target_state(
        current: ExecutionStatus,
        event: ExecutionEvent,
    ) -> StateMachineResult<ExecutionStatus> {
        let target = match (current, event) {
            (ExecutionStatus::Pending, ExecutionEvent::Start) => ExecutionStatus::InProgress,
            (ExecutionStatus::InProgress, ExecutionEvent::Complete) => ExecutionStatus::Completed,
            // A blocking failure holds the execution in place for retry.
            (ExecutionStatus::InProgress, ExecutionEvent::FailBlocking) => {
                ExecutionStatus::InProgress
            }
            (ExecutionStatus::Pending, ExecutionEvent::Skip) => ExecutionStatus::Skipped,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: format!("{event:?}"),
                })
            }
        };
        Ok(target)
    }

    /// Create an execution for (unit, step) and move it straight to
    /// in_progress. Fails with `AlreadyActive` if a non-terminal execution
    /// already exists, via the store's uniqueness constraint.
    pub async fn begin(
        &self,
        unit: &ProductionUnit,
        step: &StepDefinition,
    ) -> StateMachineResult<StepExecution> {
        let mut execution = StepExecution::create(unit.id, step.step_number);
        self.store.insert_execution(execution.clone()).await?;

        execution.status =
            Self::determine_target_state(execution.status, ExecutionEvent::Start)?;
        execution.started_at = Some(Utc::now());
        execution.touch();
        self.store.update_execution(execution.clone()).await?;

        debug!(
            serial_number = %unit.serial_number,
            step_number = step.step_number,
            execution_id = %execution.id,
            "step execution started"
        );
        Ok(execution)
    }

    /// Record an operator result on an in_progress execution.
    ///
    /// Missing required inputs are rejected synchronously and leave the
    /// execution untouched. Constraint failures set validation_status=failed;
    /// whether that completes the execution or blocks the unit depends on the
    /// step's blocks_on_failure flag.
    pub async fn record_result(
        &self,
        execution_id: uuid::Uuid,
        unit: &ProductionUnit,
        step: &StepDefinition,
        result: RecordedResult,
    ) -> StateMachineResult<RecordedOutcome> {
        let mut execution = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(StateMachineError::ExecutionNotFound(execution_id))?;
        if execution.status != ExecutionStatus::InProgress {
            return Err(StateMachineError::InvalidTransition {
                from: execution.status.to_string(),
                event: "RecordResult".to_string(),
            });
        }

        validation::check_required_inputs(step, &result)?;
        let report = validation::validate(step, &result)?;

        execution.value_recorded = result.value_recorded;
        execution.measurement_values = result.measurement_values;
        execution.barcode_scanned = result.barcode_scanned;
        execution.batch_number = result.batch_number;

        if report.passed() {
            execution.validation_status = Some(ValidationStatus::Passed);
            self.complete(unit, execution).await.map(RecordedOutcome::Completed)
        } else if !step.blocks_on_failure {
            // Non-blocking defect: recorded, but flow continues.
            execution.validation_status = Some(ValidationStatus::Failed);
            warn!(
                serial_number = %unit.serial_number,
                step_number = step.step_number,
                failures = report.failures.len(),
                "validation failed on non-blocking step; completing with defect recorded"
            );
            self.complete(unit, execution).await.map(RecordedOutcome::Completed)
        } else {
            execution.validation_status = Some(ValidationStatus::Failed);
            execution.status = Self::determine_target_state(
                execution.status,
                ExecutionEvent::FailBlocking,
            )?;
            execution.retry_count += 1;
            execution.touch();
            self.store.update_execution(execution.clone()).await?;

            let mut held = unit.clone();
            held.status = UnitStatus::OnHold;
            held.touch();
            self.store.update_unit(held).await?;

            info!(
                serial_number = %unit.serial_number,
                step_number = step.step_number,
                retry_count = execution.retry_count,
                "blocking validation failure; unit on hold"
            );
            self.publisher.publish(DomainEvent::StepBlocked {
                unit_id: unit.id,
                serial_number: unit.serial_number.clone(),
                step_number: step.step_number,
                retry_count: execution.retry_count,
                timestamp: Utc::now(),
            })?;
            Ok(RecordedOutcome::Blocked(execution))
        }
    }

    /// Mark a conditionally inapplicable step as skipped for audit
    /// completeness. The execution never enters in_progress.
    pub async fn skip(
        &self,
        unit: &ProductionUnit,
        step: &StepDefinition,
        reason: &str,
    ) -> StateMachineResult<StepExecution> {
        let mut execution = StepExecution::create(unit.id, step.step_number);
        execution.status =
            Self::determine_target_state(execution.status, ExecutionEvent::Skip)?;
        execution.skip_reason = Some(reason.to_string());
        execution.touch();
        self.store.insert_execution(execution.clone()).await?;

        debug!(
            serial_number = %unit.serial_number,
            step_number = step.step_number,
            reason,
            "step skipped"
        );
        Ok(execution)
    }

    async fn complete(
        &self,
        unit: &ProductionUnit,
        mut execution: StepExecution,
    ) -> StateMachineResult<StepExecution> {
        execution.status =
            Self::determine_target_state(execution.status, ExecutionEvent::Complete)?;
        execution.completed_at = Some(Utc::now());
        execution.touch();
        self.store.update_execution(execution.clone()).await?;

        let validation_status = execution
            .validation_status
            .unwrap_or(ValidationStatus::Passed);
        self.publisher.publish(DomainEvent::StepCompleted {
            unit_id: unit.id,
            serial_number: unit.serial_number.clone(),
            step_number: execution.step_number,
            validation_status,
            measurement_values: execution.measurement_values.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProductionUnit, FieldConstraint};
    use crate::store::InMemoryStore;
    use std::collections::HashMap;
    use serde_json::json;

    fn machine() -> (ExecutionStateMachine, Arc<InMemoryStore>, EventPublisher) {
        let store = Arc::new(InMemoryStore::new());
        let publisher = EventPublisher::new(32);
        (
            ExecutionStateMachine::new(store.clone(), publisher.clone()),
            store,
            publisher,
        )
    }

    async fn seeded_unit(store: &InMemoryStore) -> ProductionUnit {
        let unit = ProductionUnit::create(NewProductionUnit {
            serial_number: "SN-100".to_string(),
            work_order_id: uuid::Uuid::new_v4(),
            position_in_batch: 1,
            product_type: "widget".to_string(),
            batch_number: None,
        });
        store.insert_unit(unit.clone()).await.unwrap();
        unit
    }

    fn plain_step(step_number: u32) -> StepDefinition {
        StepDefinition {
            step_number,
            name: format!("step-{step_number}"),
            sort_order: step_number,
            requires_barcode_scan: false,
            requires_batch_number: false,
            requires_value_input: false,
            has_checklist: false,
            blocks_on_failure: false,
            conditional_on_step: None,
            conditional_value: None,
            restart_from_step: None,
            validation_rules: HashMap::new(),
            barcode_pattern: None,
        }
    }

    #[test]
    fn test_transition_table() {
        use ExecutionEvent::*;
        use ExecutionStatus::*;
        assert_eq!(
            ExecutionStateMachine::determine_target_state(Pending, Start).unwrap(),
            InProgress
        );
        assert_eq!(
            ExecutionStateMachine::determine_target_state(InProgress, Complete).unwrap(),
            Completed
        );
        assert_eq!(
            ExecutionStateMachine::determine_target_state(InProgress, FailBlocking).unwrap(),
            InProgress
        );
        assert_eq!(
            ExecutionStateMachine::determine_target_state(Pending, Skip).unwrap(),
            Skipped
        );
        assert!(ExecutionStateMachine::determine_target_state(Completed, Start).is_err());
        assert!(ExecutionStateMachine::determine_target_state(Skipped, Complete).is_err());
    }

    #[tokio::test]
    async fn test_begin_then_duplicate_is_already_active() {
        let (machine, store, _publisher) = machine();
        let unit = seeded_unit(&store).await;
        let step = plain_step(10);

        let execution = machine.begin(&unit, &step).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::InProgress);
        assert!(execution.started_at.is_some());

        let err = machine.begin(&unit, &step).await.unwrap_err();
        assert!(matches!(err, StateMachineError::AlreadyActive { .. }));
    }

    #[tokio::test]
    async fn test_record_passing_result_completes_and_emits() {
        let (machine, store, publisher) = machine();
        let mut rx = publisher.subscribe();
        let unit = seeded_unit(&store).await;
        let step = plain_step(10);

        let execution = machine.begin(&unit, &step).await.unwrap();
        let outcome = machine
            .record_result(execution.id, &unit, &step, RecordedResult::default())
            .await
            .unwrap();
        let RecordedOutcome::Completed(completed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(completed.status, ExecutionStatus::Completed);
        assert_eq!(completed.validation_status, Some(ValidationStatus::Passed));
        assert!(completed.completed_at.is_some());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "step_completed");
    }

    #[tokio::test]
    async fn test_blocking_failure_holds_unit_and_increments_retry() {
        let (machine, store, publisher) = machine();
        let mut rx = publisher.subscribe();
        let unit = seeded_unit(&store).await;
        let mut step = plain_step(10);
        step.blocks_on_failure = true;
        step.validation_rules.insert(
            "torque".to_string(),
            FieldConstraint {
                required: true,
                min: Some(5.0),
                max: Some(9.0),
                ..Default::default()
            },
        );

        let execution = machine.begin(&unit, &step).await.unwrap();
        let failing = RecordedResult {
            measurement_values: [("torque".to_string(), json!(12.0))].into(),
            ..Default::default()
        };
        let outcome = machine
            .record_result(execution.id, &unit, &step, failing)
            .await
            .unwrap();
        let RecordedOutcome::Blocked(blocked) = outcome else {
            panic!("expected blockage");
        };
        assert_eq!(blocked.status, ExecutionStatus::InProgress);
        assert_eq!(blocked.retry_count, 1);
        assert_eq!(blocked.validation_status, Some(ValidationStatus::Failed));

        let held = store.unit(unit.id).await.unwrap().unwrap();
        assert_eq!(held.status, UnitStatus::OnHold);
        assert_eq!(rx.recv().await.unwrap().name(), "step_blocked");

        // Operator retries on the same execution with a passing value.
        let passing = RecordedResult {
            measurement_values: [("torque".to_string(), json!(7.0))].into(),
            ..Default::default()
        };
        let outcome = machine
            .record_result(blocked.id, &unit, &step, passing)
            .await
            .unwrap();
        assert!(matches!(outcome, RecordedOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_non_blocking_failure_completes_with_defect() {
        let (machine, store, _publisher) = machine();
        let unit = seeded_unit(&store).await;
        let mut step = plain_step(10);
        step.validation_rules.insert(
            "gap".to_string(),
            FieldConstraint {
                max: Some(1.0),
                ..Default::default()
            },
        );

        let execution = machine.begin(&unit, &step).await.unwrap();
        let result = RecordedResult {
            measurement_values: [("gap".to_string(), json!(3.0))].into(),
            ..Default::default()
        };
        let outcome = machine
            .record_result(execution.id, &unit, &step, result)
            .await
            .unwrap();
        let RecordedOutcome::Completed(completed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(completed.validation_status, Some(ValidationStatus::Failed));
        assert_eq!(completed.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_required_input_leaves_execution_untouched() {
        let (machine, store, _publisher) = machine();
        let unit = seeded_unit(&store).await;
        let mut step = plain_step(10);
        step.requires_value_input = true;

        let execution = machine.begin(&unit, &step).await.unwrap();
        let err = machine
            .record_result(execution.id, &unit, &step, RecordedResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateMachineError::Validation(_)));

        let unchanged = store.execution(execution.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ExecutionStatus::InProgress);
        assert_eq!(unchanged.retry_count, 0);
        assert!(unchanged.validation_status.is_none());
    }

    #[tokio::test]
    async fn test_skip_never_enters_in_progress() {
        let (machine, store, _publisher) = machine();
        let unit = seeded_unit(&store).await;
        let step = plain_step(20);

        let skipped = machine
            .skip(&unit, &step, "conditional_value not recorded")
            .await
            .unwrap();
        assert_eq!(skipped.status, ExecutionStatus::Skipped);
        assert!(skipped.started_at.is_none());
        assert_eq!(
            skipped.skip_reason.as_deref(),
            Some("conditional_value not recorded")
        );
    }
}
