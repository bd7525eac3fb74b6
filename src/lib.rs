#![allow(clippy::doc_markdown)] // Allow technical terms like HMAC, TOML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Shopfloor Core
//!
//! Production-unit manufacturing tracking engine: step graph resolution,
//! execution state management, unit progression, automation rules, and
//! signed outgoing webhook delivery.
//!
//! ## Overview
//!
//! A production unit (one serialized piece in a work order) moves through an
//! ordered sequence of manufacturing steps. Steps can be conditional on
//! earlier recorded results, can block the unit on failure, and can rewind
//! the unit to an earlier step for rework. Every attempt at a step is kept as
//! an execution record, so the full audit trail of a unit survives restarts
//! and supersession.
//!
//! Domain events emitted as units progress feed an automation rule engine
//! (every matching rule fires, in order) and an outgoing webhook dispatcher
//! that signs payloads with HMAC-SHA256 and retries transient failures with
//! jittered exponential backoff.
//!
//! ## Module Organization
//!
//! - [`models`] - Step definitions, production units, executions, rules, webhooks
//! - [`store`] - Storage abstraction and the in-memory implementation
//! - [`resolver`] - Next-step resolution over the step graph
//! - [`state_machine`] - Step execution lifecycle transitions
//! - [`orchestration`] - Unit progression controller
//! - [`automation`] - Rule evaluation and action execution
//! - [`dispatcher`] - Signed webhook delivery with retry and health tracking
//! - [`events`] - Domain event types and the broadcast publisher
//! - [`validation`] - Recorded-result constraint checking
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shopfloor_core::config::ShopfloorConfig;
//! use shopfloor_core::events::EventPublisher;
//! use shopfloor_core::models::SequenceCatalog;
//! use shopfloor_core::orchestration::UnitProgressionController;
//! use shopfloor_core::store::{InMemoryStore, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ShopfloorConfig::load()?;
//! let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
//! let publisher = EventPublisher::new(config.events.channel_capacity);
//! let catalog = Arc::new(SequenceCatalog::new());
//!
//! let controller = UnitProgressionController::new(store, catalog, publisher);
//! let outcome = controller.advance("SN-0001").await?;
//! println!("advance outcome: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod automation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resolver;
pub mod state_machine;
pub mod store;
pub mod validation;

pub use automation::{AutomationRuleEngine, AutomationSettings, TriggerEvent};
pub use config::ShopfloorConfig;
pub use dispatcher::{DispatcherConfig, WebhookDispatcher};
pub use error::{Result, ShopfloorError};
pub use events::{DomainEvent, EventPublisher};
pub use orchestration::{AdvanceOutcome, UnitProgressionController};
pub use resolver::{resolve_next, Resolution, StepOutcome};
pub use state_machine::ExecutionStateMachine;
pub use store::{InMemoryStore, Store};
