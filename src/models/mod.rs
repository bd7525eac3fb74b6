//! Data model layer for the production tracking core.
//!
//! Plain serde structs plus the status enums that back the execution state
//! machine. Records are identified by UUID and persisted through the
//! [`crate::store`] abstraction.

pub mod activity;
pub mod automation_rule;
pub mod production_unit;
pub mod step_definition;
pub mod step_execution;
pub mod webhook;
pub mod work_order;

pub use activity::ActivityLogEntry;
pub use automation_rule::{ActionType, AutomationRule, Condition, NewAutomationRule};
pub use production_unit::{NewProductionUnit, ProductionUnit, UnitStatus};
pub use step_definition::{FieldConstraint, SequenceCatalog, StepDefinition, StepSequence};
pub use step_execution::{ExecutionStatus, StepExecution, ValidationStatus};
pub use webhook::{
    DeliveryLogEntry, EndpointHealthRecord, NewOutgoingWebhookConfig, OutgoingWebhookConfig,
};
pub use work_order::{NewWorkOrder, WorkOrder, WorkOrderStatus};
