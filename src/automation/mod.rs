//! Automation rule evaluation and action execution.
//!
//! Inbound trigger events are matched against the enabled rules for their
//! source; every matching rule fires (this is not a first-match dispatcher),
//! in ascending sort_order, with each rule's failure isolated from its
//! siblings. Webhook actions hand off to the dispatcher; the other action
//! types write directly to the backing store.

pub mod conditions;
pub mod engine;
pub mod mappings;

use serde::{Deserialize, Serialize};

use crate::dispatcher::DeliveryError;
use crate::events::DomainEvent;
use crate::store::StoreError;

pub use engine::{
    AutomationRuleEngine, AutomationSettings, EvaluationReport, PlannedAction, RuleFailure,
};

/// Structured inbound trigger record.
///
/// The calling layer authenticates and dedupes inbound deliveries before
/// handing events to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub source_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl From<&DomainEvent> for TriggerEvent {
    fn from(event: &DomainEvent) -> Self {
        Self {
            source_id: event.name().to_string(),
            event_type: event.name().to_string(),
            payload: event.payload(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("event field missing: {path}")]
    MissingField { path: String },

    #[error("event field {path} is not {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("action parameter missing or malformed: {name}")]
    BadParameter { name: String },

    #[error("action timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}
