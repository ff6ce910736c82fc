//! Result types for protected operations

use std::time::Duration;

use uuid::Uuid;

use super::error::ResilienceError;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Why a protection refused to run the work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A breaker is open
    CircuitOpen {
        /// Breaker name
        name: String,
        /// Time until a half-open probe is allowed
        retry_after: Option<Duration>,
    },
    /// A quota was exceeded
    RateLimited {
        /// Violation codes
        violations: Vec<String>,
        /// Time to wait before retrying
        retry_after: Duration,
    },
}

impl Rejection {
    /// Retry delay hint, if any
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
        }
    }
}

impl From<Rejection> for ResilienceError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::CircuitOpen { name, retry_after } => Self::CircuitOpen { name, retry_after },
            Rejection::RateLimited {
                violations,
                retry_after,
            } => Self::RateLimitExceeded {
                violations,
                retry_after,
            },
        }
    }
}

/// Tagged outcome of a protected operation.
///
/// Callers pattern-match instead of inspecting error variants to tell a
/// designed fallback (`Queued`) or a protection (`Rejected`) apart from a
/// real failure.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The work completed on `resource`
    Succeeded {
        /// Resource that served the call
        resource: String,
        /// Value produced by the work
        value: T,
    },
    /// Every automated path failed; the work waits in the manual queue
    Queued {
        /// Manual queue item id
        queue_id: Uuid,
    },
    /// A protection refused to run the work
    Rejected(Rejection),
    /// The work ran and failed in a way that is not absorbed
    Failed(ResilienceError),
}

impl<T> Outcome<T> {
    /// Lift a plain result, separating rejections from failures
    pub fn from_result(resource: impl Into<String>, result: ResilienceResult<T>) -> Self {
        match result {
            Ok(value) => Self::Succeeded {
                resource: resource.into(),
                value,
            },
            Err(error) => Self::from(error),
        }
    }

    /// Whether the work completed
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Whether the work was handed to the manual queue
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Map the success value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Succeeded { resource, value } => Outcome::Succeeded {
                resource,
                value: f(value),
            },
            Self::Queued { queue_id } => Outcome::Queued { queue_id },
            Self::Rejected(rejection) => Outcome::Rejected(rejection),
            Self::Failed(error) => Outcome::Failed(error),
        }
    }
}

impl<T> From<ResilienceError> for Outcome<T> {
    fn from(error: ResilienceError) -> Self {
        match error {
            ResilienceError::CircuitOpen { name, retry_after } => {
                Self::Rejected(Rejection::CircuitOpen { name, retry_after })
            }
            ResilienceError::RateLimitExceeded {
                violations,
                retry_after,
            } => Self::Rejected(Rejection::RateLimited {
                violations,
                retry_after,
            }),
            other => Self::Failed(other),
        }
    }
}
