use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration for one outgoing webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingWebhookConfig {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Event type this endpoint subscribes to, e.g. `step_completed`.
    pub event_type: String,
    pub enabled: bool,
    /// HMAC-SHA256 signing secret; unsigned delivery when absent.
    pub secret: Option<String>,
    /// Maximum total attempts per delivery (minimum 1).
    pub retry_attempts: u32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New webhook config for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutgoingWebhookConfig {
    pub name: String,
    pub url: String,
    pub event_type: String,
    pub enabled: bool,
    pub secret: Option<String>,
    pub retry_attempts: u32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl OutgoingWebhookConfig {
    pub fn create(new_config: NewOutgoingWebhookConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new_config.name,
            url: new_config.url,
            event_type: new_config.event_type,
            enabled: new_config.enabled,
            secret: new_config.secret,
            retry_attempts: new_config.retry_attempts.max(1),
            headers: new_config.headers,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted failure history for one endpoint.
///
/// Flushed by the dispatcher after every attempt set (and on manual
/// re-enable) so health counters survive a restart; the tracker is seeded
/// from these records at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointHealthRecord {
    pub webhook_config_id: Uuid,
    pub consecutive_failures: u32,
    pub disabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of one delivery attempt set.
///
/// Written exactly once by the dispatcher after the final attempt, whether
/// the delivery succeeded, exhausted its retries, or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub webhook_config_id: Uuid,
    /// Stable per logical delivery, shared across its retries; lets the
    /// receiving endpoint dedupe.
    pub delivery_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub response_status: Option<u16>,
    /// Truncated to the configured limit before persisting.
    pub response_body: Option<String>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub succeeded: bool,
    pub created_at: DateTime<Utc>,
}
