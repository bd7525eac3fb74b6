//! Typed domain events and the broadcast publisher.
//!
//! State transitions emit events onto an internal channel rather than calling
//! the rule engine directly; the flow is testable by asserting on emitted
//! events instead of side effects.

pub mod publisher;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ValidationStatus;

pub use publisher::{EventPublisher, PublishError};

/// Event names double as trigger source ids for the automation engine.
pub mod names {
    pub const STEP_COMPLETED: &str = "step_completed";
    pub const STEP_BLOCKED: &str = "step_blocked";
    pub const UNIT_COMPLETED: &str = "unit_completed";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    StepCompleted {
        unit_id: Uuid,
        serial_number: String,
        step_number: u32,
        validation_status: ValidationStatus,
        measurement_values: HashMap<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
    },
    StepBlocked {
        unit_id: Uuid,
        serial_number: String,
        step_number: u32,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    },
    UnitCompleted {
        unit_id: Uuid,
        serial_number: String,
        work_order_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StepCompleted { .. } => names::STEP_COMPLETED,
            Self::StepBlocked { .. } => names::STEP_BLOCKED,
            Self::UnitCompleted { .. } => names::UNIT_COMPLETED,
        }
    }

    /// JSON payload the automation engine evaluates conditions against.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
