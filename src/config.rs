//! Runtime configuration.
//!
//! Loaded from TOML files with environment-specific overrides plus
//! `SHOPFLOOR__*` environment variables, then explicitly validated. Bad
//! values fail at load, not at the point of use.
//!
//! ```rust,no_run
//! use shopfloor_core::config::ShopfloorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ShopfloorConfig::load()?;
//! println!("dispatcher workers: {}", config.dispatcher.workers);
//! # Ok(())
//! # }
//! ```

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::automation::AutomationSettings;
use crate::dispatcher::{DispatcherConfig, RetryPolicy};
use crate::error::{Result, ShopfloorError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopfloorConfig {
    pub events: EventSettings,
    pub automation: AutomationSection,
    pub dispatcher: DispatcherSection,
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Broadcast channel capacity for domain events.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSection {
    pub max_concurrency: usize,
    pub action_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSection {
    pub timeout_seconds: u64,
    pub queue_capacity: usize,
    pub workers: usize,
    pub response_body_limit_bytes: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Consecutive permanent failures before an endpoint is auto-disabled.
    pub failure_threshold: u32,
}

impl Default for ShopfloorConfig {
    fn default() -> Self {
        Self {
            events: EventSettings::default(),
            automation: AutomationSection::default(),
            dispatcher: DispatcherSection::default(),
            health: HealthSettings::default(),
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            action_timeout_seconds: 30,
        }
    }
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            queue_capacity: 1024,
            workers: 4,
            response_body_limit_bytes: 4096,
            backoff_base_ms: 1000,
            backoff_cap_ms: 30_000,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
        }
    }
}

impl ShopfloorConfig {
    /// Load configuration for the current environment
    /// (`SHOPFLOOR_ENV`, defaulting to `development`).
    pub fn load() -> Result<Self> {
        let environment =
            std::env::var("SHOPFLOOR_ENV").unwrap_or_else(|_| "development".to_string());
        let config = Config::builder()
            .add_source(File::with_name("config/shopfloor").required(false))
            .add_source(
                File::with_name(&format!("config/shopfloor.{environment}")).required(false),
            )
            .add_source(Environment::with_prefix("SHOPFLOOR").separator("__"))
            .build()
            .map_err(|e| ShopfloorError::ConfigurationError(e.to_string()))?;
        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ShopfloorError::ConfigurationError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| ShopfloorError::ConfigurationError(e.to_string()))?;
        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ShopfloorError::ConfigurationError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.events.channel_capacity == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.automation.max_concurrency == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "automation.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.workers == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "dispatcher.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.timeout_seconds == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "dispatcher.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.backoff_base_ms > self.dispatcher.backoff_cap_ms {
            return Err(ShopfloorError::ConfigurationError(
                "dispatcher.backoff_base_ms exceeds backoff_cap_ms".to_string(),
            ));
        }
        if self.health.failure_threshold == 0 {
            return Err(ShopfloorError::ConfigurationError(
                "health.failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn automation_settings(&self) -> AutomationSettings {
        AutomationSettings {
            max_concurrency: self.automation.max_concurrency,
            action_timeout: Duration::from_secs(self.automation.action_timeout_seconds),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timeout: Duration::from_secs(self.dispatcher.timeout_seconds),
            queue_capacity: self.dispatcher.queue_capacity,
            workers: self.dispatcher.workers,
            response_body_limit: self.dispatcher.response_body_limit_bytes,
            retry: RetryPolicy {
                base: Duration::from_millis(self.dispatcher.backoff_base_ms),
                cap: Duration::from_millis(self.dispatcher.backoff_cap_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ShopfloorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.timeout_seconds, 10);
        assert_eq!(config.health.failure_threshold, 5);
    }

    #[test]
    fn test_from_toml_overrides() {
        let config = ShopfloorConfig::from_toml(
            r#"
            [dispatcher]
            workers = 2
            backoff_cap_ms = 5000

            [health]
            failure_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.dispatcher.workers, 2);
        assert_eq!(config.health.failure_threshold, 3);
        // Untouched sections keep defaults.
        assert_eq!(config.automation.max_concurrency, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ShopfloorConfig::from_toml(
            r#"
            [dispatcher]
            workers = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("workers"));

        let err = ShopfloorConfig::from_toml(
            r#"
            [dispatcher]
            backoff_base_ms = 60000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("backoff_base_ms"));
    }

    #[test]
    fn test_conversions() {
        let config = ShopfloorConfig::default();
        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.timeout, Duration::from_secs(10));
        assert_eq!(dispatcher.retry.cap, Duration::from_secs(30));
        let automation = config.automation_settings();
        assert_eq!(automation.action_timeout, Duration::from_secs(30));
    }
}
