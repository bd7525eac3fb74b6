use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ShopfloorError {
    StoreError(String),
    StateTransitionError(String),
    ResolverError(String),
    ValidationError(String),
    RuleEvaluationError(String),
    DeliveryError(String),
    ConfigurationError(String),
    EventError(String),
}

impl fmt::Display for ShopfloorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShopfloorError::StoreError(msg) => write!(f, "Store error: {msg}"),
            ShopfloorError::StateTransitionError(msg) => {
                write!(f, "State transition error: {msg}")
            }
            ShopfloorError::ResolverError(msg) => write!(f, "Resolver error: {msg}"),
            ShopfloorError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            ShopfloorError::RuleEvaluationError(msg) => {
                write!(f, "Rule evaluation error: {msg}")
            }
            ShopfloorError::DeliveryError(msg) => write!(f, "Delivery error: {msg}"),
            ShopfloorError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            ShopfloorError::EventError(msg) => write!(f, "Event error: {msg}"),
        }
    }
}

impl std::error::Error for ShopfloorError {}

pub type Result<T> = std::result::Result<T, ShopfloorError>;
