use uuid::Uuid;

use crate::events::PublishError;
use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    /// A non-terminal execution already exists for this (unit, step).
    /// Recovered by the progression controller as a no-op.
    #[error("execution already active for unit {unit_id} at step {step_number}")]
    AlreadyActive { unit_id: Uuid, step_number: u32 },

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("event publish error: {0}")]
    Publish(#[from] PublishError),
}

impl From<StoreError> for StateMachineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ActiveExecutionExists {
                unit_id,
                step_number,
            } => Self::AlreadyActive {
                unit_id,
                step_number,
            },
            other => Self::Store(other),
        }
    }
}

pub type StateMachineResult<T> = std::result::Result<T, StateMachineError>;
