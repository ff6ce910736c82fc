//! Prioritized failover across interchangeable resources
//!
//! A [`FailoverPlan`] maps an operation category (a payment method) to the
//! resources able to serve it, in global priority order. [`Failover::run`]
//! drops the candidates whose breaker rejects, then tries the rest in order
//! until one succeeds. Exhaustion is an outcome, not an error: the caller
//! decides where the work goes next.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::core::{ErrorClass, GatewayConfig, ResilienceResult};

/// Compatible resources per category, ordered by global priority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverPlan {
    priority: Vec<String>,
    compatibility: BTreeMap<String, Vec<String>>,
}

impl FailoverPlan {
    /// Build a plan from gateway configuration
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            priority: config.priority.clone(),
            compatibility: config.compatibility.clone(),
        }
    }

    /// Resources able to serve `category`, most preferred first.
    ///
    /// Unknown categories have no candidates.
    #[must_use]
    pub fn candidates(&self, category: &str) -> Vec<&str> {
        let Some(compatible) = self.compatibility.get(category) else {
            return Vec::new();
        };
        self.priority
            .iter()
            .filter(|resource| compatible.contains(resource))
            .map(String::as_str)
            .collect()
    }

    /// Global priority, most preferred first
    #[must_use]
    pub fn priority(&self) -> &[String] {
        &self.priority
    }
}

/// A candidate that was tried and failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    /// Resource name
    pub resource: String,
    /// Failure description
    pub error: String,
}

/// Result of a failover run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverOutcome<T> {
    /// A candidate succeeded
    Completed {
        /// Resource that served the call
        resource: String,
        /// Value returned by the resource
        value: T,
        /// Candidates tried before it
        failures: Vec<AttemptFailure>,
    },
    /// No candidate succeeded
    Exhausted {
        /// Candidates skipped because their breaker rejected
        skipped: Vec<String>,
        /// Candidates tried
        failures: Vec<AttemptFailure>,
    },
}

impl<T> FailoverOutcome<T> {
    /// Whether every candidate was skipped or failed
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Runs one unit of work against a list of breaker-guarded candidates
#[derive(Debug, Clone)]
pub struct Failover {
    candidates: Vec<Arc<CircuitBreaker>>,
}

impl Failover {
    /// Fail over across `candidates`, in the given order
    #[must_use]
    pub fn new(candidates: Vec<Arc<CircuitBreaker>>) -> Self {
        Self { candidates }
    }

    /// Try each admitted candidate until one succeeds.
    ///
    /// Resource failures are recorded against the candidate's breaker and
    /// the next candidate is tried. A client error (bad payload) aborts the
    /// run and is returned, since no other resource would accept it either.
    #[tracing::instrument(skip_all, fields(candidates = self.candidates.len()))]
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> ResilienceResult<FailoverOutcome<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        let mut eligible = Vec::with_capacity(self.candidates.len());
        let mut skipped = Vec::new();
        for breaker in &self.candidates {
            if breaker.can_execute().await {
                eligible.push(breaker);
            } else {
                debug!(resource = breaker.name(), "Skipping candidate with open circuit");
                skipped.push(breaker.name().to_string());
            }
        }

        let mut failures = Vec::new();
        for breaker in eligible {
            let resource = breaker.name().to_string();
            match breaker.protected_call(|| attempt(resource.clone())).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        info!(%resource, failed_over = failures.len(), "Failover succeeded");
                    }
                    return Ok(FailoverOutcome::Completed {
                        resource,
                        value,
                        failures,
                    });
                }
                Err(error) if error.classify() == ErrorClass::Client => {
                    debug!(%resource, %error, "Client error, aborting failover");
                    return Err(error);
                }
                Err(error) => {
                    warn!(%resource, %error, "Candidate failed, trying next");
                    failures.push(AttemptFailure {
                        resource,
                        error: error.to_string(),
                    });
                }
            }
        }

        warn!(
            skipped = skipped.len(),
            failed = failures.len(),
            "All failover candidates exhausted"
        );
        Ok(FailoverOutcome::Exhausted { skipped, failures })
    }
}
