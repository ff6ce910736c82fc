//! Payment processing with gateway failover
//!
//! A payment is rate limited per member, method and platform, then routed
//! through the compatible gateways in priority order. Gateways with an open
//! breaker are skipped. If nothing succeeds the payment goes to the manual
//! queue and the member gets a queued response instead of an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::{Outcome, Rejection, ResilienceError, ResilienceResult};
use crate::patterns::{Failover, FailoverOutcome};
use crate::queue::QueuePayload;
use crate::registry::ResilienceRegistry;

/// A payment to charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount in minor currency units
    pub amount: u64,
    /// Payment method, e.g. `card`, `oxxo`, `spei`
    pub method: String,
    /// Member or staff account paying
    pub actor_id: String,
    /// Free-form context passed through to gateways and the manual queue
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentRequest {
    /// Create a request without metadata
    pub fn new(amount: u64, method: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            amount,
            method: method.into(),
            actor_id: actor_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry
    #[must_use = "builder methods must be chained or built"]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> ResilienceResult<()> {
        if self.amount == 0 {
            return Err(ResilienceError::validation("amount must be greater than 0"));
        }
        if self.method.trim().is_empty() {
            return Err(ResilienceError::validation("payment method is required"));
        }
        if self.actor_id.trim().is_empty() {
            return Err(ResilienceError::validation("actor id is required"));
        }
        Ok(())
    }
}

/// Proof of a successful charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    /// Gateway transaction id
    pub transaction_id: String,
}

/// A payment gateway
///
/// Return [`ResilienceError::Validation`] for declines caused by the request
/// itself and [`ResilienceError::TransientResource`] for gateway faults.
#[async_trait]
pub trait GatewayClient: Send + Sync + fmt::Debug {
    /// Gateway name, matching its breaker
    fn name(&self) -> &str;

    /// Charge the payment
    async fn charge(&self, request: &PaymentRequest) -> ResilienceResult<GatewayReceipt>;
}

/// Status of a [`PaymentResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Charged by a gateway
    Success,
    /// Waiting in the manual queue
    QueuedForManualProcessing,
    /// Refused by a quota; retry later
    Rejected,
    /// The request itself was refused
    Failed,
}

/// Serializable response for API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Outcome
    pub status: PaymentStatus,
    /// Gateway that charged the payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Gateway transaction id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Manual queue item id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<Uuid>,
    /// Reason for a rejection or failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds to wait before retrying a rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl PaymentResponse {
    fn empty(status: PaymentStatus) -> Self {
        Self {
            status,
            resource: None,
            transaction_id: None,
            queue_id: None,
            message: None,
            retry_after_secs: None,
        }
    }
}

impl From<&Outcome<GatewayReceipt>> for PaymentResponse {
    fn from(outcome: &Outcome<GatewayReceipt>) -> Self {
        match outcome {
            Outcome::Succeeded { resource, value } => Self {
                resource: Some(resource.clone()),
                transaction_id: Some(value.transaction_id.clone()),
                ..Self::empty(PaymentStatus::Success)
            },
            Outcome::Queued { queue_id } => Self {
                queue_id: Some(*queue_id),
                ..Self::empty(PaymentStatus::QueuedForManualProcessing)
            },
            Outcome::Rejected(rejection) => Self {
                message: Some(ResilienceError::from(rejection.clone()).to_string()),
                retry_after_secs: rejection.retry_after().map(|d| d.as_secs()),
                ..Self::empty(PaymentStatus::Rejected)
            },
            Outcome::Failed(error) => Self {
                message: Some(error.to_string()),
                ..Self::empty(PaymentStatus::Failed)
            },
        }
    }
}

/// Routes payments through rate limiting, failover and the manual queue
pub struct PaymentProcessor {
    registry: Arc<ResilienceRegistry>,
    gateways: HashMap<String, Arc<dyn GatewayClient>>,
}

impl fmt::Debug for PaymentProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProcessor")
            .field("gateways", &self.gateways.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PaymentProcessor {
    /// Create a processor with no gateways
    #[must_use]
    pub fn new(registry: Arc<ResilienceRegistry>) -> Self {
        Self {
            registry,
            gateways: HashMap::new(),
        }
    }

    /// Register a gateway client
    #[must_use = "builder methods must be chained or built"]
    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayClient>) -> Self {
        self.gateways.insert(gateway.name().to_string(), gateway);
        self
    }

    /// Charge a payment.
    ///
    /// Gateway unavailability never surfaces as an error: the payment is
    /// queued instead. Only a failure to write the manual queue is returned
    /// as `Err`.
    #[tracing::instrument(skip(self, request), fields(amount = request.amount, method = %request.method, actor = %request.actor_id))]
    pub async fn process_payment(&self, request: PaymentRequest) -> ResilienceResult<Outcome<GatewayReceipt>> {
        if let Err(error) = request.validate() {
            return Ok(Outcome::Failed(error));
        }

        let check = self
            .registry
            .limiter()
            .check_and_record(&request.actor_id, request.amount, &request.method)
            .await;
        if !check.allowed {
            info!(violations = ?check.violations, "Payment rejected by rate limit");
            return Ok(Outcome::Rejected(Rejection::RateLimited {
                violations: check.violations,
                retry_after: check.retry_after.unwrap_or_default(),
            }));
        }

        let candidates: Vec<&str> = self
            .registry
            .plan()
            .candidates(&request.method)
            .into_iter()
            .filter(|name| self.gateways.contains_key(*name))
            .collect();
        let failover = Failover::new(self.registry.breakers(&candidates)?);

        let attempt = |gateway: String| {
            let client = self.gateways.get(&gateway).cloned();
            let request = &request;
            async move {
                match client {
                    Some(client) => client.charge(request).await,
                    None => Err(ResilienceError::transient(gateway, "no client registered")),
                }
            }
        };

        match failover.run(attempt).await {
            Ok(FailoverOutcome::Completed { resource, value, .. }) => {
                info!(gateway = %resource, transaction_id = %value.transaction_id, "Payment charged");
                Ok(Outcome::Succeeded { resource, value })
            }
            Ok(FailoverOutcome::Exhausted { skipped, failures }) => {
                warn!(
                    skipped = ?skipped,
                    failed = failures.len(),
                    "No gateway could process payment, queueing"
                );
                let mut payload = QueuePayload {
                    amount: request.amount,
                    method: request.method.clone(),
                    actor_id: request.actor_id.clone(),
                    metadata: request.metadata.clone(),
                };
                let attempted: Vec<_> = failures.iter().map(|f| f.resource.as_str()).collect();
                payload.metadata.insert("attempted_gateways".into(), attempted.join(","));
                payload.metadata.insert("skipped_gateways".into(), skipped.join(","));

                let queue_id = self.registry.queue().enqueue(payload).await?;
                Ok(Outcome::Queued { queue_id })
            }
            Err(error) => Ok(Outcome::from(error)),
        }
    }
}
