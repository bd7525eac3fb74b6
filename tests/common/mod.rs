//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use shopfloor_core::events::EventPublisher;
use shopfloor_core::models::{
    FieldConstraint, NewOutgoingWebhookConfig, NewProductionUnit, OutgoingWebhookConfig,
    ProductionUnit, SequenceCatalog, StepDefinition, StepSequence,
};
use shopfloor_core::orchestration::UnitProgressionController;
use shopfloor_core::store::{InMemoryStore, Store};
use shopfloor_core::validation::RecordedResult;

pub fn step(step_number: u32, sort_order: u32) -> StepDefinition {
    StepDefinition {
        step_number,
        name: format!("step-{step_number}"),
        sort_order,
        requires_barcode_scan: false,
        requires_batch_number: false,
        requires_value_input: false,
        has_checklist: false,
        blocks_on_failure: false,
        conditional_on_step: None,
        conditional_value: None,
        restart_from_step: None,
        validation_rules: HashMap::new(),
        barcode_pattern: None,
    }
}

/// Three-step widget line: record a variant at 10, step 20 only applies to
/// variant-b, step 30 is a blocking torque check that rewinds to 10.
pub fn widget_sequence() -> StepSequence {
    let mut record_variant = step(10, 1);
    record_variant.requires_value_input = true;

    let mut variant_b_only = step(20, 2);
    variant_b_only.conditional_on_step = Some(10);
    variant_b_only.conditional_value = Some("variant-b".to_string());

    let mut torque_check = step(30, 3);
    torque_check.blocks_on_failure = true;
    torque_check.restart_from_step = Some(10);
    torque_check.validation_rules.insert(
        "torque".to_string(),
        FieldConstraint {
            required: true,
            min: Some(5.0),
            max: Some(9.0),
            ..Default::default()
        },
    );

    StepSequence::new("widget", vec![record_variant, variant_b_only, torque_check])
        .expect("widget sequence is valid")
}

pub struct TestRig {
    pub store: Arc<InMemoryStore>,
    pub publisher: EventPublisher,
    pub controller: UnitProgressionController,
}

pub fn rig() -> TestRig {
    rig_with_sequence(widget_sequence())
}

pub fn rig_with_sequence(sequence: StepSequence) -> TestRig {
    let store = Arc::new(InMemoryStore::new());
    let publisher = EventPublisher::new(64);
    let mut catalog = SequenceCatalog::new();
    catalog.insert(sequence);
    let controller = UnitProgressionController::new(
        store.clone(),
        Arc::new(catalog),
        publisher.clone(),
    );
    TestRig {
        store,
        publisher,
        controller,
    }
}

pub async fn seed_unit(store: &InMemoryStore, serial: &str) -> ProductionUnit {
    let unit = ProductionUnit::create(NewProductionUnit {
        serial_number: serial.to_string(),
        work_order_id: Uuid::new_v4(),
        position_in_batch: 1,
        product_type: "widget".to_string(),
        batch_number: None,
    });
    store.insert_unit(unit.clone()).await.unwrap();
    unit
}

pub async fn seed_webhook_config(
    store: &InMemoryStore,
    url: &str,
    event_type: &str,
    secret: Option<&str>,
    retry_attempts: u32,
) -> OutgoingWebhookConfig {
    let config = OutgoingWebhookConfig::create(NewOutgoingWebhookConfig {
        name: "erp".to_string(),
        url: url.to_string(),
        event_type: event_type.to_string(),
        enabled: true,
        secret: secret.map(str::to_string),
        retry_attempts,
        headers: HashMap::new(),
    });
    store.insert_webhook_config(config.clone()).await.unwrap();
    config
}

pub fn value_result(value: &str) -> RecordedResult {
    RecordedResult {
        value_recorded: Some(value.to_string()),
        ..Default::default()
    }
}

pub fn torque_result(torque: f64) -> RecordedResult {
    RecordedResult {
        measurement_values: [("torque".to_string(), serde_json::json!(torque))].into(),
        ..Default::default()
    }
}
