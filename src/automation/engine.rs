use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::conditions::evaluate_all;
use super::mappings::project;
use super::{RuleError, TriggerEvent};
use crate::dispatcher::WebhookDispatcher;
use crate::events::DomainEvent;
use crate::models::{
    ActionType, ActivityLogEntry, NewWorkOrder, UnitStatus, WorkOrder, WorkOrderStatus,
};
use crate::store::{Store, StoreError};

/// A matched rule's action with projected parameters, ready to execute.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub sort_order: u32,
    pub action_type: ActionType,
    pub params: Map<String, Value>,
}

/// One rule that failed during evaluation or execution.
#[derive(Debug, Clone)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub error: String,
}

/// Aggregate partial-failure report for one trigger event.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub matched: usize,
    pub executed: Vec<String>,
    pub failures: Vec<RuleFailure>,
}

/// Fan-out tuning for action execution.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub max_concurrency: usize,
    pub action_timeout: Duration,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// Evaluates trigger events against automation rules and executes the
/// resulting actions.
#[derive(Clone)]
pub struct AutomationRuleEngine {
    store: Arc<dyn Store>,
    dispatcher: WebhookDispatcher,
    semaphore: Arc<Semaphore>,
    action_timeout: Duration,
}

impl AutomationRuleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: WebhookDispatcher,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            action_timeout: settings.action_timeout,
        }
    }

    /// Match rules and project their field mappings, without executing
    /// anything. Per-rule errors are isolated into the failure list; only a
    /// failure to load the rule set at all is returned as an error.
    pub async fn evaluate(
        &self,
        event: &TriggerEvent,
    ) -> Result<(Vec<PlannedAction>, Vec<RuleFailure>), StoreError> {
        let rules = self.store.rules_for_source(&event.source_id).await?;
        let mut actions = Vec::new();
        let mut failures = Vec::new();

        for rule in rules {
            match evaluate_all(&rule.conditions, &event.payload) {
                Ok(false) => continue,
                Ok(true) => match project(&rule.field_mappings, &event.payload) {
                    Ok(params) => actions.push(PlannedAction {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        sort_order: rule.sort_order,
                        action_type: rule.action_type,
                        params,
                    }),
                    Err(e) => {
                        warn!(rule = %rule.name, error = %e, "field mapping projection failed");
                        failures.push(RuleFailure {
                            rule_id: rule.id,
                            rule_name: rule.name.clone(),
                            error: e.to_string(),
                        });
                    }
                },
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "condition evaluation failed");
                    failures.push(RuleFailure {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok((actions, failures))
    }

    /// Evaluate and execute all matching rules for one trigger event.
    ///
    /// Actions fan out concurrently (spawned in ascending sort_order,
    /// bounded by the semaphore) with a per-action timeout, so one slow
    /// action cannot block its siblings. Each failure is isolated and
    /// reported; siblings still run.
    pub async fn process(&self, event: &TriggerEvent) -> Result<EvaluationReport, StoreError> {
        let (actions, mut failures) = self.evaluate(event).await?;
        let matched = actions.len() + failures.len();
        debug!(
            source_id = %event.source_id,
            matched,
            "processing trigger event"
        );

        let mut handles = Vec::with_capacity(actions.len());
        for action in actions {
            let engine = self.clone();
            let event = event.clone();
            handles.push(tokio::spawn(async move {
                let _permit = engine
                    .semaphore
                    .acquire()
                    .await
                    .expect("action semaphore is never closed");
                let result = tokio::time::timeout(
                    engine.action_timeout,
                    engine.execute_action(&event, &action),
                )
                .await
                .unwrap_or(Err(RuleError::Timeout {
                    timeout_ms: engine.action_timeout.as_millis() as u64,
                }));
                (action, result)
            }));
        }

        let mut executed = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok((action, Ok(()))) => executed.push(action.rule_name),
                Ok((action, Err(e))) => {
                    warn!(rule = %action.rule_name, error = %e, "rule action failed");
                    failures.push(RuleFailure {
                        rule_id: action.rule_id,
                        rule_name: action.rule_name,
                        error: e.to_string(),
                    });
                }
                Err(join_error) => {
                    error!(error = %join_error, "rule action task panicked");
                }
            }
        }
        Ok(EvaluationReport {
            matched,
            executed,
            failures,
        })
    }

    /// Subscribe the engine to a domain event stream. Events are converted
    /// to trigger events and processed until the channel closes.
    pub fn spawn_event_loop(
        self,
        mut receiver: tokio::sync::broadcast::Receiver<DomainEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let trigger = TriggerEvent::from(&event);
                        match self.process(&trigger).await {
                            Ok(report) if report.failures.is_empty() => {}
                            Ok(report) => warn!(
                                source_id = %trigger.source_id,
                                failed = report.failures.len(),
                                "trigger processed with rule failures"
                            ),
                            Err(e) => error!(
                                source_id = %trigger.source_id,
                                error = %e,
                                "failed to load rules for trigger"
                            ),
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "automation engine lagged behind event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn execute_action(
        &self,
        event: &TriggerEvent,
        action: &PlannedAction,
    ) -> Result<(), RuleError> {
        match action.action_type {
            ActionType::CreateWorkOrder => {
                let order_number = str_param(&action.params, "order_number")?.to_string();
                let quantity = action
                    .params
                    .get("quantity")
                    .and_then(Value::as_u64)
                    .unwrap_or(1) as u32;
                let notes = action
                    .params
                    .get("notes")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let order = WorkOrder::create(NewWorkOrder {
                    order_number,
                    quantity,
                    notes,
                });
                info!(rule = %action.rule_name, order_number = %order.order_number, "creating work order");
                self.store.insert_work_order(order).await?;
                Ok(())
            }
            ActionType::UpdateWorkOrderStatus => {
                let id = uuid_param(&action.params, "work_order_id")?;
                let status: WorkOrderStatus = str_param(&action.params, "status")?
                    .parse()
                    .map_err(|_| RuleError::BadParameter {
                        name: "status".to_string(),
                    })?;
                let mut order = self.store.work_order(id).await?.ok_or(RuleError::Store(
                    StoreError::NotFound {
                        kind: "work_order",
                        id: id.to_string(),
                    },
                ))?;
                order.status = status;
                order.updated_at = Utc::now();
                self.store.update_work_order(order).await?;
                Ok(())
            }
            ActionType::UpdateItemStatus => {
                let serial = str_param(&action.params, "serial_number")?;
                let status: UnitStatus = str_param(&action.params, "status")?
                    .parse()
                    .map_err(|_| RuleError::BadParameter {
                        name: "status".to_string(),
                    })?;
                let mut unit = self.store.unit_by_serial(serial).await?.ok_or(
                    RuleError::Store(StoreError::NotFound {
                        kind: "production_unit",
                        id: serial.to_string(),
                    }),
                )?;
                unit.status = status;
                unit.touch();
                self.store.update_unit(unit).await?;
                Ok(())
            }
            ActionType::LogActivity => {
                let message = str_param(&action.params, "message")?.to_string();
                let entry = ActivityLogEntry::new(
                    action.rule_name.clone(),
                    message,
                    Value::Object(action.params.clone()),
                );
                self.store.append_activity(entry).await?;
                Ok(())
            }
            ActionType::TriggerOutgoingWebhook => {
                let event_type = action
                    .params
                    .get("event_type")
                    .and_then(Value::as_str)
                    .unwrap_or(&event.event_type)
                    .to_string();
                let payload = match action.params.get("payload") {
                    Some(explicit) => explicit.clone(),
                    None if !action.params.is_empty() => Value::Object(action.params.clone()),
                    None => event.payload.clone(),
                };
                let queued = self.dispatcher.enqueue_event(&event_type, payload).await?;
                debug!(rule = %action.rule_name, event_type, queued, "webhook deliveries queued");
                Ok(())
            }
        }
    }
}

fn str_param<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a str, RuleError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| RuleError::BadParameter {
            name: name.to_string(),
        })
}

fn uuid_param(params: &Map<String, Value>, name: &str) -> Result<Uuid, RuleError> {
    str_param(params, name)?
        .parse()
        .map_err(|_| RuleError::BadParameter {
            name: name.to_string(),
        })
}
