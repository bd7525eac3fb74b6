use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ShopfloorError;
use crate::events::{DomainEvent, EventPublisher, PublishError};
use crate::models::{
    ExecutionStatus, ProductionUnit, SequenceCatalog, StepExecution, StepSequence, UnitStatus,
    ValidationStatus,
};
use crate::resolver::{self, Resolution, ResolverError, StepOutcome, UnitHistory};
use crate::state_machine::{ExecutionStateMachine, RecordedOutcome, StateMachineError};
use crate::store::{Store, StoreError};
use crate::validation::RecordedResult;

#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    #[error("production unit not found: {0}")]
    UnitNotFound(String),

    #[error("unit {0} is cancelled and cannot advance")]
    UnitCancelled(String),

    #[error("no active execution to record a result on for unit {0}")]
    NoActiveExecution(String),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    StateMachine(StateMachineError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event publish error: {0}")]
    Publish(#[from] PublishError),
}

impl From<ShopfloorError> for ProgressionError {
    fn from(err: ShopfloorError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// What a call to `advance` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A new execution was begun at `step`.
    Advanced { step: u32 },
    /// A non-terminal execution already exists; the call was a no-op.
    AlreadyActive,
    /// The unit is held on a blocked step awaiting operator retry.
    OnHold,
    /// A blocking failure rewound the unit to `step`.
    Restarted { step: u32 },
    /// All applicable steps are terminal; the unit is completed.
    Completed,
    /// The unit was already in a terminal status.
    NoOp,
}

/// Orchestrates advancing a unit across steps.
#[derive(Clone)]
pub struct UnitProgressionController {
    store: Arc<dyn Store>,
    catalog: Arc<SequenceCatalog>,
    machine: ExecutionStateMachine,
    publisher: EventPublisher,
}

impl UnitProgressionController {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<SequenceCatalog>,
        publisher: EventPublisher,
    ) -> Self {
        let machine = ExecutionStateMachine::new(store.clone(), publisher.clone());
        Self {
            store,
            catalog,
            machine,
            publisher,
        }
    }

    /// Advance a unit to its next applicable step.
    ///
    /// Idempotent: calling twice without an intervening `record_result` is a
    /// no-op, detected through the state machine's `AlreadyActive` error.
    pub async fn advance(&self, serial_number: &str) -> Result<AdvanceOutcome, ProgressionError> {
        let unit = self.load_unit(serial_number).await?;
        if unit.status == UnitStatus::Cancelled {
            return Err(ProgressionError::UnitCancelled(serial_number.to_string()));
        }
        if unit.status == UnitStatus::Completed {
            return Ok(AdvanceOutcome::NoOp);
        }

        let sequence = self.catalog.sequence_for(&unit.product_type)?.clone();
        let executions = self.store.executions_for_unit(unit.id).await?;
        let history = UnitHistory::from_executions(&executions);
        let latest = executions
            .iter()
            .rev()
            .find(|e| e.status != ExecutionStatus::Skipped && !e.is_superseded());

        match latest {
            None => {
                let resolution = resolver::first_applicable(&sequence, &history);
                self.apply_forward(&unit, &sequence, resolution).await
            }
            Some(active) if active.status.is_active() => {
                if active.validation_status == Some(ValidationStatus::Failed) {
                    // Blocked step: the resolver decides hold vs rewind.
                    let resolution = resolver::resolve_next(
                        &sequence,
                        &history,
                        active.step_number,
                        StepOutcome::Fail,
                    )?;
                    match resolution {
                        Resolution::Restart { step } => {
                            self.apply_restart(&unit, &sequence, active, step).await
                        }
                        _ => Ok(AdvanceOutcome::OnHold),
                    }
                } else {
                    debug!(
                        serial_number,
                        step_number = active.step_number,
                        "advance called with an execution already active; no-op"
                    );
                    Ok(AdvanceOutcome::AlreadyActive)
                }
            }
            Some(completed) => {
                let outcome = match completed.validation_status {
                    Some(ValidationStatus::Failed) => StepOutcome::Fail,
                    _ => StepOutcome::Pass,
                };
                let resolution = resolver::resolve_next(
                    &sequence,
                    &history,
                    completed.step_number,
                    outcome,
                )?;
                match resolution {
                    Resolution::Restart { step } => {
                        self.apply_restart(&unit, &sequence, completed, step).await
                    }
                    Resolution::Blocked => Ok(AdvanceOutcome::OnHold),
                    forward => self.apply_forward(&unit, &sequence, forward).await,
                }
            }
        }
    }

    /// Record an operator result on the unit's active execution, by serial.
    pub async fn record_result(
        &self,
        serial_number: &str,
        result: RecordedResult,
    ) -> Result<RecordedOutcome, ProgressionError> {
        let unit = self.load_unit(serial_number).await?;
        let step_number = unit
            .current_step
            .ok_or_else(|| ProgressionError::NoActiveExecution(serial_number.to_string()))?;
        let active = self
            .store
            .active_execution(unit.id, step_number)
            .await?
            .ok_or_else(|| ProgressionError::NoActiveExecution(serial_number.to_string()))?;
        let sequence = self.catalog.sequence_for(&unit.product_type)?;
        let step = sequence.by_step_number(step_number).ok_or_else(|| {
            ProgressionError::Configuration(format!(
                "unit {serial_number} points at step {step_number} missing from '{}'",
                unit.product_type
            ))
        })?;

        self.machine
            .record_result(active.id, &unit, step, result)
            .await
            .map_err(ProgressionError::StateMachine)
    }

    /// Cancel a unit. Terminal: further advances are refused; execution
    /// history is left untouched for audit.
    pub async fn cancel(&self, serial_number: &str) -> Result<(), ProgressionError> {
        let mut unit = self.load_unit(serial_number).await?;
        if unit.status == UnitStatus::Completed {
            return Ok(());
        }
        unit.status = UnitStatus::Cancelled;
        unit.touch();
        self.store.update_unit(unit).await?;
        info!(serial_number, "unit cancelled");
        Ok(())
    }

    async fn load_unit(&self, serial_number: &str) -> Result<ProductionUnit, ProgressionError> {
        self.store
            .unit_by_serial(serial_number)
            .await?
            .ok_or_else(|| ProgressionError::UnitNotFound(serial_number.to_string()))
    }

    /// Apply a forward resolution: record skips, then either begin the next
    /// execution or complete the unit.
    async fn apply_forward(
        &self,
        unit: &ProductionUnit,
        sequence: &StepSequence,
        resolution: Resolution,
    ) -> Result<AdvanceOutcome, ProgressionError> {
        match resolution {
            Resolution::Next { step, skipped } => {
                self.record_skips(unit, sequence, &skipped).await?;
                let definition = sequence.by_step_number(step).ok_or_else(|| {
                    ProgressionError::Configuration(format!(
                        "resolver produced step {step} missing from '{}'",
                        sequence.product_type()
                    ))
                })?;
                match self.machine.begin(unit, definition).await {
                    Ok(_) => {}
                    Err(StateMachineError::AlreadyActive { .. }) => {
                        debug!(
                            serial_number = %unit.serial_number,
                            step_number = step,
                            "concurrent advance lost the race; no-op"
                        );
                        return Ok(AdvanceOutcome::AlreadyActive);
                    }
                    Err(other) => return Err(ProgressionError::StateMachine(other)),
                }

                let mut updated = unit.clone();
                updated.current_step = Some(step);
                updated.status = UnitStatus::InProgress;
                updated.touch();
                self.store.update_unit(updated).await?;
                info!(
                    serial_number = %unit.serial_number,
                    step_number = step,
                    "unit advanced"
                );
                Ok(AdvanceOutcome::Advanced { step })
            }
            Resolution::Terminal { skipped } => {
                self.record_skips(unit, sequence, &skipped).await?;
                let mut updated = unit.clone();
                updated.status = UnitStatus::Completed;
                updated.touch();
                self.store.update_unit(updated).await?;
                info!(serial_number = %unit.serial_number, "unit completed");
                self.publisher.publish(DomainEvent::UnitCompleted {
                    unit_id: unit.id,
                    serial_number: unit.serial_number.clone(),
                    work_order_id: unit.work_order_id,
                    timestamp: Utc::now(),
                })?;
                Ok(AdvanceOutcome::Completed)
            }
            Resolution::Restart { .. } | Resolution::Blocked => {
                // Callers route these before reaching here.
                Ok(AdvanceOutcome::OnHold)
            }
        }
    }

    /// Rewind the unit to `restart_step` after a blocking failure.
    ///
    /// Audit-preserving: every non-superseded execution at steps after the
    /// restart point (including the failed attempt) is marked with
    /// `superseded_by` referencing the fresh execution; nothing is deleted.
    async fn apply_restart(
        &self,
        unit: &ProductionUnit,
        sequence: &StepSequence,
        failed: &StepExecution,
        restart_step: u32,
    ) -> Result<AdvanceOutcome, ProgressionError> {
        let restart_position = sequence.position_of(restart_step).ok_or_else(|| {
            ProgressionError::Configuration(format!(
                "restart step {restart_step} missing from '{}'",
                sequence.product_type()
            ))
        })?;
        let failed_position = sequence
            .position_of(failed.step_number)
            .ok_or_else(|| {
                ProgressionError::Configuration(format!(
                    "failed step {} missing from '{}'",
                    failed.step_number,
                    sequence.product_type()
                ))
            })?;

        let definition = &sequence.steps()[restart_position];
        let replacement = self
            .machine
            .begin(unit, definition)
            .await
            .map_err(ProgressionError::StateMachine)?;

        let executions = self.store.executions_for_unit(unit.id).await?;
        for execution in executions {
            if execution.id == replacement.id || execution.is_superseded() {
                continue;
            }
            let Some(position) = sequence.position_of(execution.step_number) else {
                continue;
            };
            if position > restart_position && position <= failed_position {
                self.supersede(execution, replacement.id).await?;
            }
        }

        let mut updated = unit.clone();
        updated.current_step = Some(restart_step);
        updated.status = UnitStatus::InProgress;
        updated.touch();
        self.store.update_unit(updated).await?;
        info!(
            serial_number = %unit.serial_number,
            failed_step = failed.step_number,
            restart_step,
            "unit rewound after blocking failure"
        );
        Ok(AdvanceOutcome::Restarted { step: restart_step })
    }

    async fn supersede(
        &self,
        mut execution: StepExecution,
        replacement_id: Uuid,
    ) -> Result<(), ProgressionError> {
        execution.superseded_by = Some(replacement_id);
        execution.touch();
        self.store.update_execution(execution).await?;
        Ok(())
    }

    async fn record_skips(
        &self,
        unit: &ProductionUnit,
        sequence: &StepSequence,
        skipped: &[u32],
    ) -> Result<(), ProgressionError> {
        for step_number in skipped {
            let definition = sequence.by_step_number(*step_number).ok_or_else(|| {
                ProgressionError::Configuration(format!(
                    "skipped step {step_number} missing from '{}'",
                    sequence.product_type()
                ))
            })?;
            match self
                .machine
                .skip(unit, definition, "conditional step not applicable")
                .await
            {
                Ok(_) => {}
                // The store admits one skip record per (unit, step), so a
                // concurrent advance that already wrote it surfaces here.
                Err(StateMachineError::AlreadyActive { .. }) => {}
                Err(other) => return Err(ProgressionError::StateMachine(other)),
            }
        }
        Ok(())
    }
}
