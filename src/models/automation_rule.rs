use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Effect an automation rule produces when its conditions match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateWorkOrder,
    UpdateWorkOrderStatus,
    UpdateItemStatus,
    LogActivity,
    TriggerOutgoingWebhook,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateWorkOrder => write!(f, "create_work_order"),
            Self::UpdateWorkOrderStatus => write!(f, "update_work_order_status"),
            Self::UpdateItemStatus => write!(f, "update_item_status"),
            Self::LogActivity => write!(f, "log_activity"),
            Self::TriggerOutgoingWebhook => write!(f, "trigger_outgoing_webhook"),
        }
    }
}

/// Boolean predicate over trigger-event payload fields.
///
/// Paths are flattened dotted key paths into the JSON payload, e.g.
/// `item.status`. Comparison semantics live in [`crate::automation::conditions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Eq { path: String, value: serde_json::Value },
    NotEq { path: String, value: serde_json::Value },
    Gt { path: String, value: f64 },
    Gte { path: String, value: f64 },
    Lt { path: String, value: f64 },
    Lte { path: String, value: f64 },
    In { path: String, values: Vec<serde_json::Value> },
}

/// Declarative mapping from trigger-event fields into action parameters.
///
/// Values are literals; strings may embed `{{event.path}}` placeholders which
/// are interpolated from the trigger payload at evaluation time.
pub type FieldMappings = HashMap<String, serde_json::Value>;

/// One automation rule bound to an inbound trigger source.
///
/// All matching enabled rules for a trigger fire, in ascending `sort_order`;
/// this is not a first-match dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub trigger_source_id: String,
    pub action_type: ActionType,
    /// Empty condition set matches unconditionally.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub field_mappings: FieldMappings,
    pub sort_order: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New automation rule for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAutomationRule {
    pub name: String,
    pub trigger_source_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub field_mappings: FieldMappings,
    pub sort_order: u32,
    pub enabled: bool,
}

impl AutomationRule {
    pub fn create(new_rule: NewAutomationRule) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new_rule.name,
            trigger_source_id: new_rule.trigger_source_id,
            action_type: new_rule.action_type,
            conditions: new_rule.conditions,
            field_mappings: new_rule.field_mappings,
            sort_order: new_rule.sort_order,
            enabled: new_rule.enabled,
            created_at: now,
            updated_at: now,
        }
    }
}
