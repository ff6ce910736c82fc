//! Error types for protected operations

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the resilience engine and the units of work it protects.
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// The named breaker is rejecting traffic
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Breaker name
        name: String,
        /// Time until the breaker allows a half-open probe
        retry_after: Option<Duration>,
    },

    /// The caller exceeded one or more rate-limit scopes
    #[error("rate limit exceeded: {}", .violations.join(", "))]
    RateLimitExceeded {
        /// Violation codes, e.g. `user_transactions_per_minute_exceeded`
        violations: Vec<String>,
        /// Time to wait before retrying
        retry_after: Duration,
    },

    /// The payload is incorrect and must be fixed by the caller
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the payload
        message: String,
    },

    /// The protected resource itself failed
    #[error("resource '{resource}' failed: {message}")]
    TransientResource {
        /// Resource (gateway or subsystem) name
        resource: String,
        /// Failure description
        message: String,
    },

    /// No durable home could be found for an escalated operation
    #[error("manual queue write failed: {message}")]
    ManualQueueWrite {
        /// Failure description
        message: String,
        /// Underlying I/O or encoding error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The manual queue backlog could not be read
    #[error("manual queue read failed: {message}")]
    ManualQueueRead {
        /// Failure description
        message: String,
        /// Underlying I/O or decoding error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid resilience configuration
    #[error("invalid resilience configuration: {message}")]
    InvalidConfig {
        /// Configuration error details
        message: String,
    },
}

/// Error classification for decision making
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The resource failed; another attempt or another resource may succeed
    Transient,
    /// A protection (breaker or quota) rejected the call
    ResourceExhaustion,
    /// The caller sent something wrong
    Client,
    /// Nothing the engine can recover from
    Fatal,
}

impl ResilienceError {
    /// Create a circuit open error
    pub fn circuit_open(name: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::CircuitOpen {
            name: name.into(),
            retry_after,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a transient resource error
    pub fn transient(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientResource {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a manual queue write error
    pub fn queue_write<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ManualQueueWrite {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a manual queue read error
    pub fn queue_read<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ManualQueueRead {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Classify the error
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::TransientResource { .. } => ErrorClass::Transient,
            Self::CircuitOpen { .. } | Self::RateLimitExceeded { .. } => {
                ErrorClass::ResourceExhaustion
            }
            Self::Validation { .. } => ErrorClass::Client,
            Self::ManualQueueWrite { .. }
            | Self::ManualQueueRead { .. }
            | Self::InvalidConfig { .. } => ErrorClass::Fatal,
        }
    }

    /// Whether retrying later (or elsewhere) can succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classify(),
            ErrorClass::Transient | ErrorClass::ResourceExhaustion
        )
    }

    /// Whether the error is a rejection issued by a protection rather than a
    /// failure of the work itself
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self.classify(), ErrorClass::ResourceExhaustion)
    }

    /// Whether a breaker wrapping the failed call should count it.
    ///
    /// Bad payloads and rejections from nested protections say nothing about
    /// the health of the resource.
    #[must_use]
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self.classify(),
            ErrorClass::Client | ErrorClass::ResourceExhaustion
        )
    }

    /// Retry delay hint, if any
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
