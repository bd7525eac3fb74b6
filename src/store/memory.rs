//! In-memory store backed by concurrent maps.
//!
//! Primary-key access goes through `DashMap`s; the secondary indexes the core
//! needs (executions by unit, units by serial) are maintained alongside.
//! Execution inserts serialize through one mutex so the non-terminal
//! uniqueness check and the insert are atomic with respect to each other.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    ActivityLogEntry, AutomationRule, DeliveryLogEntry, EndpointHealthRecord, ExecutionStatus,
    OutgoingWebhookConfig, ProductionUnit, StepExecution, WorkOrder,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    units: DashMap<Uuid, ProductionUnit>,
    serial_index: DashMap<String, Uuid>,
    executions: DashMap<Uuid, StepExecution>,
    unit_execution_index: DashMap<Uuid, Vec<Uuid>>,
    execution_write_lock: Mutex<()>,
    rules: DashMap<Uuid, AutomationRule>,
    webhook_configs: DashMap<Uuid, OutgoingWebhookConfig>,
    endpoint_health: DashMap<Uuid, EndpointHealthRecord>,
    delivery_log: Mutex<Vec<DeliveryLogEntry>>,
    work_orders: DashMap<Uuid, WorkOrder>,
    activity_log: Mutex<Vec<ActivityLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_unit(&self, unit: ProductionUnit) -> StoreResult<()> {
        if self.serial_index.contains_key(&unit.serial_number) {
            return Err(StoreError::Duplicate {
                kind: "production_unit",
                id: unit.serial_number.clone(),
            });
        }
        self.serial_index.insert(unit.serial_number.clone(), unit.id);
        self.units.insert(unit.id, unit);
        Ok(())
    }

    async fn unit(&self, id: Uuid) -> StoreResult<Option<ProductionUnit>> {
        Ok(self.units.get(&id).map(|u| u.clone()))
    }

    async fn unit_by_serial(&self, serial_number: &str) -> StoreResult<Option<ProductionUnit>> {
        let Some(id) = self.serial_index.get(serial_number).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.units.get(&id).map(|u| u.clone()))
    }

    async fn update_unit(&self, unit: ProductionUnit) -> StoreResult<()> {
        if !self.units.contains_key(&unit.id) {
            return Err(StoreError::NotFound {
                kind: "production_unit",
                id: unit.id.to_string(),
            });
        }
        self.units.insert(unit.id, unit);
        Ok(())
    }

    async fn insert_execution(&self, execution: StepExecution) -> StoreResult<()> {
        let _guard = self.execution_write_lock.lock();
        let existing_ids = self
            .unit_execution_index
            .get(&execution.unit_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        for id in &existing_ids {
            if let Some(other) = self.executions.get(id) {
                if other.step_number != execution.step_number || other.is_superseded() {
                    continue;
                }
                // One non-terminal attempt and at most one skip audit record
                // per (unit, step).
                let duplicate_skip = execution.status == ExecutionStatus::Skipped
                    && other.status == ExecutionStatus::Skipped;
                if !other.status.is_terminal() || duplicate_skip {
                    return Err(StoreError::ActiveExecutionExists {
                        unit_id: execution.unit_id,
                        step_number: execution.step_number,
                    });
                }
            }
        }
        self.unit_execution_index
            .entry(execution.unit_id)
            .or_default()
            .push(execution.id);
        self.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn execution(&self, id: Uuid) -> StoreResult<Option<StepExecution>> {
        Ok(self.executions.get(&id).map(|e| e.clone()))
    }

    async fn update_execution(&self, execution: StepExecution) -> StoreResult<()> {
        if !self.executions.contains_key(&execution.id) {
            return Err(StoreError::NotFound {
                kind: "step_execution",
                id: execution.id.to_string(),
            });
        }
        self.executions.insert(execution.id, execution);
        Ok(())
    }

    async fn executions_for_unit(&self, unit_id: Uuid) -> StoreResult<Vec<StepExecution>> {
        let ids = self
            .unit_execution_index
            .get(&unit_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        let mut executions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(execution) = self.executions.get(&id) {
                executions.push(execution.clone());
            }
        }
        Ok(executions)
    }

    async fn active_execution(
        &self,
        unit_id: Uuid,
        step_number: u32,
    ) -> StoreResult<Option<StepExecution>> {
        let executions = self.executions_for_unit(unit_id).await?;
        Ok(executions.into_iter().find(|e| {
            e.step_number == step_number && !e.status.is_terminal() && !e.is_superseded()
        }))
    }

    async fn insert_rule(&self, rule: AutomationRule) -> StoreResult<()> {
        if self.rules.contains_key(&rule.id) {
            return Err(StoreError::Duplicate {
                kind: "automation_rule",
                id: rule.id.to_string(),
            });
        }
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn update_rule(&self, rule: AutomationRule) -> StoreResult<()> {
        if !self.rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound {
                kind: "automation_rule",
                id: rule.id.to_string(),
            });
        }
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn rules_for_source(&self, trigger_source_id: &str) -> StoreResult<Vec<AutomationRule>> {
        let mut rules: Vec<AutomationRule> = self
            .rules
            .iter()
            .filter(|r| r.enabled && r.trigger_source_id == trigger_source_id)
            .map(|r| r.clone())
            .collect();
        rules.sort_by_key(|r| r.sort_order);
        Ok(rules)
    }

    async fn insert_webhook_config(&self, config: OutgoingWebhookConfig) -> StoreResult<()> {
        if self.webhook_configs.contains_key(&config.id) {
            return Err(StoreError::Duplicate {
                kind: "webhook_config",
                id: config.id.to_string(),
            });
        }
        self.webhook_configs.insert(config.id, config);
        Ok(())
    }

    async fn webhook_config(&self, id: Uuid) -> StoreResult<Option<OutgoingWebhookConfig>> {
        Ok(self.webhook_configs.get(&id).map(|c| c.clone()))
    }

    async fn update_webhook_config(&self, config: OutgoingWebhookConfig) -> StoreResult<()> {
        if !self.webhook_configs.contains_key(&config.id) {
            return Err(StoreError::NotFound {
                kind: "webhook_config",
                id: config.id.to_string(),
            });
        }
        self.webhook_configs.insert(config.id, config);
        Ok(())
    }

    async fn webhook_configs_for_event(
        &self,
        event_type: &str,
    ) -> StoreResult<Vec<OutgoingWebhookConfig>> {
        Ok(self
            .webhook_configs
            .iter()
            .filter(|c| c.event_type == event_type)
            .map(|c| c.clone())
            .collect())
    }

    async fn upsert_endpoint_health(&self, record: EndpointHealthRecord) -> StoreResult<()> {
        self.endpoint_health.insert(record.webhook_config_id, record);
        Ok(())
    }

    async fn endpoint_health(
        &self,
        webhook_config_id: Uuid,
    ) -> StoreResult<Option<EndpointHealthRecord>> {
        Ok(self.endpoint_health.get(&webhook_config_id).map(|r| r.clone()))
    }

    async fn all_endpoint_health(&self) -> StoreResult<Vec<EndpointHealthRecord>> {
        Ok(self.endpoint_health.iter().map(|r| r.clone()).collect())
    }

    async fn append_delivery_log(&self, entry: DeliveryLogEntry) -> StoreResult<()> {
        self.delivery_log.lock().push(entry);
        Ok(())
    }

    async fn delivery_log_for_config(
        &self,
        webhook_config_id: Uuid,
    ) -> StoreResult<Vec<DeliveryLogEntry>> {
        Ok(self
            .delivery_log
            .lock()
            .iter()
            .filter(|e| e.webhook_config_id == webhook_config_id)
            .cloned()
            .collect())
    }

    async fn insert_work_order(&self, order: WorkOrder) -> StoreResult<()> {
        if self.work_orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                kind: "work_order",
                id: order.id.to_string(),
            });
        }
        self.work_orders.insert(order.id, order);
        Ok(())
    }

    async fn work_order(&self, id: Uuid) -> StoreResult<Option<WorkOrder>> {
        Ok(self.work_orders.get(&id).map(|o| o.clone()))
    }

    async fn update_work_order(&self, order: WorkOrder) -> StoreResult<()> {
        if !self.work_orders.contains_key(&order.id) {
            return Err(StoreError::NotFound {
                kind: "work_order",
                id: order.id.to_string(),
            });
        }
        self.work_orders.insert(order.id, order);
        Ok(())
    }

    async fn append_activity(&self, entry: ActivityLogEntry) -> StoreResult<()> {
        self.activity_log.lock().push(entry);
        Ok(())
    }

    async fn activity_log(&self) -> StoreResult<Vec<ActivityLogEntry>> {
        Ok(self.activity_log.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, NewProductionUnit};

    fn unit() -> ProductionUnit {
        ProductionUnit::create(NewProductionUnit {
            serial_number: format!("SN-{}", Uuid::new_v4()),
            work_order_id: Uuid::new_v4(),
            position_in_batch: 1,
            product_type: "widget".to_string(),
            batch_number: None,
        })
    }

    #[tokio::test]
    async fn test_duplicate_serial_rejected() {
        let store = InMemoryStore::new();
        let mut a = unit();
        a.serial_number = "SN-1".to_string();
        let mut b = unit();
        b.serial_number = "SN-1".to_string();
        store.insert_unit(a).await.unwrap();
        let err = store.insert_unit(b).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_unique_non_terminal_execution_per_unit_step() {
        let store = InMemoryStore::new();
        let u = unit();
        let unit_id = u.id;
        store.insert_unit(u).await.unwrap();

        store
            .insert_execution(StepExecution::create(unit_id, 10))
            .await
            .unwrap();
        let err = store
            .insert_execution(StepExecution::create(unit_id, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActiveExecutionExists { .. }));

        // A second attempt is admitted once the first is terminal.
        let mut first = store
            .active_execution(unit_id, 10)
            .await
            .unwrap()
            .expect("active execution");
        first.status = ExecutionStatus::Completed;
        store.update_execution(first).await.unwrap();
        store
            .insert_execution(StepExecution::create(unit_id, 10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_inserts_admit_exactly_one() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let u = unit();
        let unit_id = u.id;
        store.insert_unit(u).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_execution(StepExecution::create(unit_id, 10))
                    .await
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_second_skip_record_for_same_step_rejected() {
        let store = InMemoryStore::new();
        let u = unit();
        let unit_id = u.id;
        store.insert_unit(u).await.unwrap();

        let mut skip = StepExecution::create(unit_id, 20);
        skip.status = ExecutionStatus::Skipped;
        let skip_id = skip.id;
        store.insert_execution(skip).await.unwrap();

        let mut again = StepExecution::create(unit_id, 20);
        again.status = ExecutionStatus::Skipped;
        let err = store.insert_execution(again).await.unwrap_err();
        assert!(matches!(err, StoreError::ActiveExecutionExists { .. }));

        // A superseded skip no longer blocks a fresh record.
        let mut first = store.execution(skip_id).await.unwrap().unwrap();
        first.superseded_by = Some(Uuid::new_v4());
        store.update_execution(first).await.unwrap();
        let mut fresh = StepExecution::create(unit_id, 20);
        fresh.status = ExecutionStatus::Skipped;
        store.insert_execution(fresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_rules_for_source_filters_and_sorts() {
        let store = InMemoryStore::new();
        use crate::models::{ActionType, AutomationRule, NewAutomationRule};
        for (name, source, sort_order, enabled) in [
            ("b", "step_completed", 2, true),
            ("a", "step_completed", 1, true),
            ("disabled", "step_completed", 0, false),
            ("other", "unit_completed", 0, true),
        ] {
            store
                .insert_rule(AutomationRule::create(NewAutomationRule {
                    name: name.to_string(),
                    trigger_source_id: source.to_string(),
                    action_type: ActionType::LogActivity,
                    conditions: vec![],
                    field_mappings: Default::default(),
                    sort_order,
                    enabled,
                }))
                .await
                .unwrap();
        }
        let rules = store.rules_for_source("step_completed").await.unwrap();
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
