//! Execution state machine for step attempts.
//!
//! Owns the lifecycle of one step attempt for one unit:
//! pending → in_progress → {completed, skipped}. A blocking validation
//! failure is not a state change; the execution stays in_progress with an
//! incremented retry_count until the operator records a passing result.

pub mod errors;
pub mod execution;

pub use errors::{StateMachineError, StateMachineResult};
pub use execution::{ExecutionEvent, ExecutionStateMachine, RecordedOutcome};
