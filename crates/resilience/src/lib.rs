//! # Rally Resilience
//!
//! Fault isolation for the operations of the Rally club platform that depend
//! on something outside the process: payment gateways, tournament
//! inscription, bracket generation and match-result ingestion.
//!
//! ## Features
//!
//! - **Circuit Breaker**: per-resource state machine shared by every worker
//!   through a TTL store
//! - **Rate Limiting**: fixed-window quotas per member, method, platform and
//!   high-value amount, plus per-tournament and per-match scopes
//! - **Protected Operations**: one or several breakers and a quota around a
//!   unit of work
//! - **Failover**: prioritized gateway failover with a manual escalation
//!   queue as the last resort
//! - **Health Reporting**: read-only breaker and backlog status
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rally_resilience::prelude::*;
//!
//! let registry = Arc::new(ResilienceRegistry::builder().build()?);
//! let processor = PaymentProcessor::new(Arc::clone(&registry))
//!     .with_gateway(stripe_client)
//!     .with_gateway(paypal_client);
//!
//! let outcome = processor
//!     .process_payment(PaymentRequest::new(125_000, "card", "member-42"))
//!     .await?;
//! let response = PaymentResponse::from(&outcome);
//! ```
//!
//! State kept in the store is advisory. Losing it reopens traffic (breakers
//! read as closed, quotas allow) rather than blocking it.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod core;
pub mod domain;
pub mod observability;
pub mod patterns;
pub mod queue;
pub mod store;

mod registry;

pub use crate::registry::{RegistryBuilder, ResilienceRegistry};

pub use crate::core::{
    BreakerConfig, Clock, ErrorClass, ManualClock, Outcome, Rejection, ResilienceConfig,
    ResilienceError, ResilienceResult, SystemClock,
};

pub use crate::patterns::{
    BreakerSnapshot, CircuitBreaker, CircuitState, Failover, FailoverOutcome, FailoverPlan,
    Protection, RateCheck, RateLimiter, RateScope, Window,
};

pub use crate::queue::{EscalationQueue, FileQueue, InMemoryQueue, ManualQueue, QueueStatus};
pub use crate::store::{InMemoryStore, StateStore, StoreError};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{Outcome, ResilienceConfig, ResilienceError, ResilienceResult};
    pub use crate::domain::{
        BracketFormat, GatewayClient, GatewayReceipt, PaymentProcessor, PaymentRequest,
        PaymentResponse, TournamentGuard,
    };
    pub use crate::patterns::{CircuitBreaker, CircuitState, Protection};
    pub use crate::{ResilienceRegistry, StateStore};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
