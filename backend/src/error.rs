//! Error types for the accessibility pipeline.
//!
//! Failures are absorbed at the smallest scope that can handle them:
//!
//! - [`ValidationError`]: a malformed population or target record. Loaders skip
//!   the record and report it; only direct mutations (`add_target`) return it.
//! - [`ProviderError`]: routing failed for one (point, target) pair. The route
//!   service turns it into an `Unreachable`/`Failed` status and never aborts a batch.
//! - [`ConfigError`]: an invalid distribution or application configuration,
//!   returned to the caller with the previous state left untouched.
//!
//! Results from superseded generations are not errors at all; they are dropped
//! by the route service and the aggregation service.

use std::fmt;

/// Result type for service entry points.
pub type AccessResult<T> = Result<T, AccessError>;

/// Structured context attached to validation and configuration errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation being performed (e.g., "load_population", "add_target")
    pub operation: Option<String>,
    /// The entity type involved (e.g., "population_record", "target")
    pub entity: Option<String>,
    /// Identifier or index of the offending entity
    pub entity_id: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    /// Set the entity type.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Set the entity ID.
    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// Set additional details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operation.is_none()
            && self.entity.is_none()
            && self.entity_id.is_none()
            && self.details.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={}", entity));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// A population or target record failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Validation error: {message} {context}")]
pub struct ValidationError {
    pub message: String,
    pub context: ErrorContext,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            message: message.into(),
            context,
        }
    }

    /// Replace the error context, keeping the message.
    pub fn in_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }
}

/// Invalid configuration (distribution buckets, routing settings, config file).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Configuration error: {message} {context}")]
pub struct ConfigError {
    pub message: String,
    pub context: ErrorContext,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            message: message.into(),
            context,
        }
    }
}

/// Failure reported by a routing provider for a single request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered but found no route between the two locations.
    #[error("No route found")]
    NoRoute,

    /// Transport-level failure (connection refused, 5xx, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("Timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// The provider answered with something that is not a usable cost.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient failures worth another attempt while the request is still current.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }
}

/// Umbrella error for service entry points and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },
}

impl AccessError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }
}
