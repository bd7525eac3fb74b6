//! Unit progression orchestration.
//!
//! The progression controller is the single invariant-enforcing choke point
//! for `unit.current_step`: it consumes resolver output, drives the execution
//! state machine, and keeps the unit's aggregate status consistent. No other
//! component writes `current_step`.

pub mod progression;

pub use progression::{AdvanceOutcome, ProgressionError, UnitProgressionController};
