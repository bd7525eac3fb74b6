use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry::{classify_status, AttemptClass};
use super::signature;
use super::{DeliveryError, DispatcherConfig, HealthTracker};
use crate::models::{DeliveryLogEntry, EndpointHealthRecord, OutgoingWebhookConfig};
use crate::store::Store;

/// One logical delivery queued for a worker.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub config_id: Uuid,
    /// Stable across all retries of this delivery.
    pub delivery_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub test: bool,
}

/// Final outcome of one delivery attempt set.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub delivery_id: Uuid,
    pub succeeded: bool,
    pub attempts: u32,
    pub response_status: Option<u16>,
}

#[derive(Debug)]
struct Attempt {
    class: AttemptClass,
    status: Option<u16>,
    body: Option<String>,
    error: Option<String>,
    retry_after: Option<Duration>,
    response_time: Duration,
}

struct Inner {
    store: Arc<dyn Store>,
    health: Arc<HealthTracker>,
    client: reqwest::Client,
    config: DispatcherConfig,
    tx: mpsc::Sender<DeliveryRequest>,
}

/// Queued, signed webhook delivery with retry/backoff and health gating.
#[derive(Clone)]
pub struct WebhookDispatcher {
    inner: Arc<Inner>,
}

impl WebhookDispatcher {
    /// Build the dispatcher and spawn its worker tasks.
    pub fn new(
        store: Arc<dyn Store>,
        health: Arc<HealthTracker>,
        config: DispatcherConfig,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let workers = config.workers.max(1);
        let inner = Arc::new(Inner {
            store,
            health,
            client,
            config,
            tx,
        });
        let shared_rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..workers {
            let inner = inner.clone();
            let shared_rx = shared_rx.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, inner, shared_rx).await;
            });
        }
        Ok(Self { inner })
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.inner.health
    }

    /// Queue one delivery for a specific config. Returns the delivery id.
    ///
    /// Short-circuits with `HealthDegraded` for auto-disabled endpoints
    /// before anything touches the network or the queue.
    pub async fn enqueue(
        &self,
        config_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
        test: bool,
    ) -> Result<Uuid, DeliveryError> {
        if self.inner.health.is_disabled(config_id) {
            return Err(DeliveryError::HealthDegraded(config_id));
        }
        let config = self
            .inner
            .store
            .webhook_config(config_id)
            .await?
            .ok_or(DeliveryError::ConfigNotFound(config_id))?;
        if !config.enabled {
            return Err(DeliveryError::Disabled(config_id));
        }

        let delivery_id = Uuid::new_v4();
        let request = DeliveryRequest {
            config_id,
            delivery_id,
            event_type: event_type.to_string(),
            payload,
            test,
        };
        self.inner.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::QueueClosed,
        })?;
        debug!(%config_id, %delivery_id, event_type, "delivery queued");
        Ok(delivery_id)
    }

    /// Queue deliveries for every enabled config subscribed to `event_type`.
    /// Returns how many were queued; unhealthy or disabled configs are
    /// skipped with a debug signal rather than failing the caller.
    pub async fn enqueue_event(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<usize, DeliveryError> {
        let configs = self
            .inner
            .store
            .webhook_configs_for_event(event_type)
            .await?;
        let mut queued = 0;
        for config in configs {
            match self
                .enqueue(config.id, event_type, payload.clone(), false)
                .await
            {
                Ok(_) => queued += 1,
                Err(DeliveryError::HealthDegraded(id)) => {
                    debug!(config_id = %id, event_type, "skipping health-degraded endpoint");
                }
                Err(DeliveryError::Disabled(id)) => {
                    debug!(config_id = %id, event_type, "skipping disabled config");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(queued)
    }

    /// Seed health counters from persisted failure history. Called once at
    /// startup so endpoints auto-disabled before a restart stay disabled.
    pub async fn restore_health(&self) -> Result<(), DeliveryError> {
        for record in self.inner.store.all_endpoint_health().await? {
            self.inner.health.seed(
                record.webhook_config_id,
                record.consecutive_failures,
                record.disabled,
            );
        }
        Ok(())
    }

    /// Manually re-enable an endpoint: clears the tracker and flushes the
    /// cleared history back to the store.
    pub async fn reset_health(&self, config_id: Uuid) -> Result<(), DeliveryError> {
        self.inner.health.reset(config_id);
        self.inner
            .store
            .upsert_endpoint_health(EndpointHealthRecord {
                webhook_config_id: config_id,
                consecutive_failures: 0,
                disabled: false,
                updated_at: Utc::now(),
            })
            .await?;
        info!(%config_id, "endpoint health manually reset");
        Ok(())
    }

    /// Run one delivery attempt set to completion: send, retry transient
    /// failures with backoff, score health, and write exactly one delivery
    /// log entry. Public so callers can deliver synchronously (test pings).
    pub async fn deliver(
        &self,
        config: &OutgoingWebhookConfig,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult, DeliveryError> {
        deliver(&self.inner, config, request).await
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<Inner>,
    rx: Arc<Mutex<mpsc::Receiver<DeliveryRequest>>>,
) {
    loop {
        let request = { rx.lock().await.recv().await };
        let Some(request) = request else {
            debug!(worker_id, "delivery queue closed; worker exiting");
            break;
        };

        // A config disabled after enqueue drops not-yet-started deliveries.
        let config = match inner.store.webhook_config(request.config_id).await {
            Ok(Some(config)) if config.enabled => config,
            Ok(_) => {
                debug!(
                    config_id = %request.config_id,
                    delivery_id = %request.delivery_id,
                    "config disabled before start; delivery dropped"
                );
                continue;
            }
            Err(e) => {
                error!(
                    config_id = %request.config_id,
                    error = %e,
                    "failed to load webhook config; delivery dropped"
                );
                continue;
            }
        };
        if inner.health.is_disabled(request.config_id) {
            debug!(
                config_id = %request.config_id,
                delivery_id = %request.delivery_id,
                "endpoint health-degraded before start; delivery dropped"
            );
            continue;
        }

        if let Err(e) = deliver(&inner, &config, &request).await {
            error!(
                config_id = %request.config_id,
                delivery_id = %request.delivery_id,
                error = %e,
                "delivery failed to record its outcome"
            );
        }
    }
}

async fn deliver(
    inner: &Inner,
    config: &OutgoingWebhookConfig,
    request: &DeliveryRequest,
) -> Result<DeliveryResult, DeliveryError> {
    let body = json!({
        "event": request.event_type,
        "test": request.test,
        "timestamp": Utc::now().to_rfc3339(),
        "data": request.payload,
    });
    let raw = serde_json::to_vec(&body).unwrap_or_default();
    let max_attempts = config.retry_attempts.max(1);

    let mut attempts = 0;
    let mut last = loop {
        attempts += 1;
        let attempt = send_once(inner, config, request, &raw).await;
        match attempt.class {
            AttemptClass::Success => break attempt,
            AttemptClass::Permanent => break attempt,
            AttemptClass::Transient if attempts >= max_attempts => break attempt,
            AttemptClass::Transient => {
                let delay = attempt
                    .retry_after
                    .unwrap_or_else(|| inner.config.retry.backoff_delay(attempts));
                warn!(
                    config_id = %config.id,
                    delivery_id = %request.delivery_id,
                    attempt = attempts,
                    status = attempt.status,
                    delay_ms = delay.as_millis() as u64,
                    "transient delivery failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    };

    let succeeded = last.class == AttemptClass::Success;
    if succeeded {
        inner.health.record_success(config.id);
        info!(
            config_id = %config.id,
            delivery_id = %request.delivery_id,
            attempts,
            status = last.status,
            "delivery succeeded"
        );
    } else {
        // Exhausted transient retries count as permanent for scoring: the
        // endpoint is unusable either way.
        inner.health.record_permanent_failure(config.id);
        warn!(
            config_id = %config.id,
            delivery_id = %request.delivery_id,
            attempts,
            status = last.status,
            error = last.error.as_deref(),
            "delivery failed"
        );
    }

    // Flush the scored counters so failure history survives a restart.
    inner
        .store
        .upsert_endpoint_health(EndpointHealthRecord {
            webhook_config_id: config.id,
            consecutive_failures: inner.health.consecutive_failures(config.id),
            disabled: inner.health.is_disabled(config.id),
            updated_at: Utc::now(),
        })
        .await?;

    let entry = DeliveryLogEntry {
        id: Uuid::new_v4(),
        webhook_config_id: config.id,
        delivery_id: request.delivery_id,
        event_type: request.event_type.clone(),
        payload: body,
        response_status: last.status,
        response_body: last.body.take(),
        response_time_ms: Some(last.response_time.as_millis() as u64),
        error_message: last.error.take(),
        attempts,
        succeeded,
        created_at: Utc::now(),
    };
    // Persisting the attempt record is part of the operation's success
    // criteria, independent of the delivery's own outcome.
    inner.store.append_delivery_log(entry).await?;

    Ok(DeliveryResult {
        delivery_id: request.delivery_id,
        succeeded,
        attempts,
        response_status: last.status,
    })
}

async fn send_once(
    inner: &Inner,
    config: &OutgoingWebhookConfig,
    request: &DeliveryRequest,
    raw: &[u8],
) -> Attempt {
    let mut builder = inner
        .client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .header("X-Delivery-Id", request.delivery_id.to_string());
    if let Some(secret) = &config.secret {
        builder = builder.header("X-Signature", signature::signature_header(secret, raw));
    }
    for (name, value) in &config.headers {
        builder = builder.header(name, value);
    }

    let started = Instant::now();
    match builder.body(raw.to_vec()).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| inner.config.retry.retry_after(v));
            let response_time = started.elapsed();
            let text = response.text().await.unwrap_or_default();
            Attempt {
                class: classify_status(status),
                status: Some(status),
                body: Some(truncate(&text, inner.config.response_body_limit)),
                error: None,
                retry_after,
                response_time,
            }
        }
        Err(e) => {
            // Builder errors (malformed URL, bad header) are configuration
            // problems; everything else is network-level and retryable.
            let class = if e.is_builder() {
                AttemptClass::Permanent
            } else {
                AttemptClass::Transient
            };
            Attempt {
                class,
                status: None,
                body: None,
                error: Some(e.to_string()),
                retry_after: None,
                response_time: started.elapsed(),
            }
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
