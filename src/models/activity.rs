use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only activity log line written by `log_activity` rule actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub source: String,
    pub message: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(source: impl Into<String>, message: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            message: message.into(),
            context,
            created_at: Utc::now(),
        }
    }
}
