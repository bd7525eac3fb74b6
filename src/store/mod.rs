//! Backing store abstraction.
//!
//! The core treats persistence as a transactional row store accessed by
//! primary key plus a small set of indexed lookups (by unit, by step, by
//! trigger source, by webhook config). The store is the source of truth for
//! the one concurrency constraint the execution model relies on: at most one
//! non-terminal execution per (unit, step).

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ActivityLogEntry, AutomationRule, DeliveryLogEntry, EndpointHealthRecord,
    OutgoingWebhookConfig, ProductionUnit, StepExecution, WorkOrder,
};

pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// The unique non-terminal execution constraint fired.
    #[error("active execution already exists for unit {unit_id} at step {step_number}")]
    ActiveExecutionExists { unit_id: Uuid, step_number: u32 },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Transactional row-store surface consumed by the core.
#[async_trait]
pub trait Store: Send + Sync {
    // Production units
    async fn insert_unit(&self, unit: ProductionUnit) -> StoreResult<()>;
    async fn unit(&self, id: Uuid) -> StoreResult<Option<ProductionUnit>>;
    async fn unit_by_serial(&self, serial_number: &str) -> StoreResult<Option<ProductionUnit>>;
    async fn update_unit(&self, unit: ProductionUnit) -> StoreResult<()>;

    // Step executions
    /// Insert honoring the unique non-terminal constraint per (unit, step).
    /// A second non-superseded skipped record for (unit, step) is likewise
    /// rejected, so racing advances cannot duplicate skip audit records.
    async fn insert_execution(&self, execution: StepExecution) -> StoreResult<()>;
    async fn execution(&self, id: Uuid) -> StoreResult<Option<StepExecution>>;
    async fn update_execution(&self, execution: StepExecution) -> StoreResult<()>;
    /// All executions for a unit in creation order.
    async fn executions_for_unit(&self, unit_id: Uuid) -> StoreResult<Vec<StepExecution>>;
    /// The non-terminal execution for (unit, step), if any.
    async fn active_execution(
        &self,
        unit_id: Uuid,
        step_number: u32,
    ) -> StoreResult<Option<StepExecution>>;

    // Automation rules
    async fn insert_rule(&self, rule: AutomationRule) -> StoreResult<()>;
    async fn update_rule(&self, rule: AutomationRule) -> StoreResult<()>;
    /// Enabled rules for a trigger source, ascending sort_order.
    async fn rules_for_source(&self, trigger_source_id: &str) -> StoreResult<Vec<AutomationRule>>;

    // Webhook configs
    async fn insert_webhook_config(&self, config: OutgoingWebhookConfig) -> StoreResult<()>;
    async fn webhook_config(&self, id: Uuid) -> StoreResult<Option<OutgoingWebhookConfig>>;
    async fn update_webhook_config(&self, config: OutgoingWebhookConfig) -> StoreResult<()>;
    /// Configs subscribed to an event type (enabled or not; the dispatcher
    /// filters on enabled so a disable can be observed mid-flight).
    async fn webhook_configs_for_event(
        &self,
        event_type: &str,
    ) -> StoreResult<Vec<OutgoingWebhookConfig>>;

    // Endpoint health (persisted failure history)
    async fn upsert_endpoint_health(&self, record: EndpointHealthRecord) -> StoreResult<()>;
    async fn endpoint_health(
        &self,
        webhook_config_id: Uuid,
    ) -> StoreResult<Option<EndpointHealthRecord>>;
    async fn all_endpoint_health(&self) -> StoreResult<Vec<EndpointHealthRecord>>;

    // Delivery log (append-only)
    async fn append_delivery_log(&self, entry: DeliveryLogEntry) -> StoreResult<()>;
    async fn delivery_log_for_config(
        &self,
        webhook_config_id: Uuid,
    ) -> StoreResult<Vec<DeliveryLogEntry>>;

    // Work orders
    async fn insert_work_order(&self, order: WorkOrder) -> StoreResult<()>;
    async fn work_order(&self, id: Uuid) -> StoreResult<Option<WorkOrder>>;
    async fn update_work_order(&self, order: WorkOrder) -> StoreResult<()>;

    // Activity log (append-only)
    async fn append_activity(&self, entry: ActivityLogEntry) -> StoreResult<()>;
    async fn activity_log(&self) -> StoreResult<Vec<ActivityLogEntry>>;
}
