//! Resilience patterns

pub mod circuit_breaker;
pub mod failover;
pub mod protection;
pub mod rate_limiter;

pub use circuit_breaker::{BreakerRecord, BreakerSnapshot, CircuitBreaker, CircuitState, Transition};
pub use failover::{AttemptFailure, Failover, FailoverOutcome, FailoverPlan};
pub use protection::Protection;
pub use rate_limiter::{RateCheck, RateLimiter, RateScope, ScopeUsage, Window};
