//! Outgoing webhook dispatch.
//!
//! Deliveries are queued and processed by dedicated workers so retry backoff
//! never blocks the triggering path. Each logical delivery carries a stable
//! `delivery_id` across its retries, is signed when the config has a secret,
//! and writes exactly one delivery log entry when its attempt set finishes.
//! Per-endpoint health tracking auto-disables configs that fail permanently
//! too many times in a row.

pub mod dispatcher;
pub mod health;
pub mod retry;
pub mod signature;

use std::time::Duration;

use uuid::Uuid;

use crate::store::StoreError;

pub use dispatcher::{DeliveryRequest, DeliveryResult, WebhookDispatcher};
pub use health::HealthTracker;
pub use retry::{AttemptClass, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook config not found: {0}")]
    ConfigNotFound(Uuid),

    #[error("webhook config {0} is disabled")]
    Disabled(Uuid),

    /// The endpoint crossed the consecutive-failure threshold and was
    /// auto-disabled; no network call is made until it is manually reset.
    #[error("endpoint health degraded for webhook config {0}")]
    HealthDegraded(Uuid),

    #[error("delivery queue is full")]
    QueueFull,

    #[error("delivery queue is closed")]
    QueueClosed,

    #[error("http client error: {0}")]
    Client(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Runtime tuning for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    pub queue_capacity: usize,
    pub workers: usize,
    /// Response bodies are truncated to this many bytes in the delivery log.
    pub response_body_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            queue_capacity: 1024,
            workers: 4,
            response_body_limit: 4096,
            retry: RetryPolicy::default(),
        }
    }
}
