//! Multi-scope fixed-window rate limiting
//!
//! Every scope is a counter in the shared [`StateStore`], keyed by scope,
//! subject and the label of the current window. Counters expire with their
//! window, so there is nothing to clean up.
//!
//! [`RateLimiter::check`] is a pure read and [`RateLimiter::record`] does the
//! increments. Callers check first and record only once they decide to
//! proceed. Two workers racing between the two calls can push a counter a
//! little past its limit; the limiter is an abuse guard, not a ledger.
//!
//! # Examples
//!
//! ```rust,ignore
//! let check = limiter.check("member-42", 150_000, "card").await;
//! if check.allowed {
//!     limiter.record("member-42", 150_000, "card").await;
//! }
//! ```

mod window;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

pub use window::Window;

use crate::core::clock::Clock;
use crate::core::{RateLimitConfig, ResilienceError, ResilienceResult};
use crate::store::{self, StateStore, keys};

/// Subject used by the platform-wide scope
const GLOBAL_SUBJECT: &str = "global";

/// A single fixed-window quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateScope {
    /// Scope name, e.g. `inscriptions_per_minute`
    pub name: String,
    /// Maximum units per window
    pub limit: u64,
    /// Window length
    pub window: Window,
    /// Retry hint returned when the scope rejects
    pub retry_after: Duration,
}

impl RateScope {
    /// Create a scope with a one-minute retry hint
    pub fn new(name: impl Into<String>, limit: u64, window: Window) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
            retry_after: Duration::from_secs(60),
        }
    }

    /// Override the retry hint
    #[must_use = "builder methods must be chained or built"]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Violation code reported when this scope rejects
    #[must_use]
    pub fn code(&self) -> String {
        format!("{}_exceeded", self.name)
    }
}

/// Result of a rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateCheck {
    /// Whether every scope allowed the call
    pub allowed: bool,
    /// Scopes evaluated
    pub checked: Vec<String>,
    /// Violation codes of the scopes that rejected
    pub violations: Vec<String>,
    /// Retry hint, present only when rejected
    pub retry_after: Option<Duration>,
    /// Whether a scope was skipped because the store could not be read
    pub fail_open: bool,
}

impl RateCheck {
    /// Turn a rejection into [`ResilienceError::RateLimitExceeded`]
    pub fn into_result(self) -> ResilienceResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(ResilienceError::RateLimitExceeded {
                violations: self.violations,
                retry_after: self.retry_after.unwrap_or_default(),
            })
        }
    }
}

/// Current counter of one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeUsage {
    /// Scope name
    pub scope: String,
    /// Subject the counter belongs to
    pub subject: String,
    /// Units consumed in the current window
    pub current: u64,
    /// Maximum units per window
    pub limit: u64,
    /// Window length
    pub window: Window,
}

/// One scope applied to one subject with a per-call increment
#[derive(Debug)]
struct Charge {
    scope: RateScope,
    subject: String,
    units: u64,
}

/// Store-backed rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter over `store`
    #[must_use]
    pub fn new(config: RateLimitConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Payment quotas
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn payment_charges(&self, actor: &str, amount: u64, method: &str) -> Vec<Charge> {
        let limits = &self.config;
        let scope = |name: &str, limit: u64, window: Window| {
            RateScope::new(name, limit, window).with_retry_after(limits.retry_after)
        };
        let charge = |scope: RateScope, subject: &str, units: u64| Charge {
            scope,
            subject: subject.to_string(),
            units,
        };

        let mut charges = vec![
            charge(
                scope("user_transactions_per_minute", limits.user_transactions_per_minute, Window::Minute),
                actor,
                1,
            ),
            charge(
                scope("user_transactions_per_hour", limits.user_transactions_per_hour, Window::Hour),
                actor,
                1,
            ),
            charge(
                scope("user_daily_amount", limits.user_daily_amount, Window::Day),
                actor,
                amount,
            ),
            charge(
                scope("method_transactions_per_minute", limits.method_transactions_per_minute, Window::Minute),
                method,
                1,
            ),
            charge(
                scope("global_transactions_per_second", limits.global_transactions_per_second, Window::Second),
                GLOBAL_SUBJECT,
                1,
            ),
        ];
        if amount >= limits.high_value_threshold {
            charges.push(charge(
                scope("high_value_transactions_per_hour", limits.high_value_transactions_per_hour, Window::Hour),
                actor,
                1,
            ));
        }
        charges
    }

    fn key(&self, charge: &Charge) -> String {
        keys::rate(
            &charge.scope.name,
            &charge.subject,
            &charge.scope.window.label(self.clock.now()),
        )
    }

    async fn evaluate(&self, charges: &[Charge]) -> RateCheck {
        let mut check = RateCheck {
            allowed: true,
            checked: Vec::with_capacity(charges.len()),
            violations: Vec::new(),
            retry_after: None,
            fail_open: false,
        };

        for charge in charges {
            check.checked.push(charge.scope.name.clone());
            let current = match store::get_counter(self.store.as_ref(), &self.key(charge)).await {
                Ok(current) => current,
                Err(error) => {
                    warn!(
                        scope = %charge.scope.name,
                        subject = %charge.subject,
                        %error,
                        "Rate limit state unreadable, allowing"
                    );
                    check.fail_open = true;
                    continue;
                }
            };

            if current.saturating_add(charge.units) > charge.scope.limit {
                check.allowed = false;
                check.violations.push(charge.scope.code());
                check.retry_after = Some(
                    check
                        .retry_after
                        .map_or(charge.scope.retry_after, |r| r.max(charge.scope.retry_after)),
                );
            }
        }

        if !check.allowed {
            debug!(violations = ?check.violations, "Rate limit exceeded");
        }
        check
    }

    async fn charge(&self, charges: &[Charge]) {
        for charge in charges {
            let key = self.key(charge);
            if let Err(error) = self
                .store
                .incr_by(&key, charge.units, charge.scope.window.duration())
                .await
            {
                warn!(scope = %charge.scope.name, %error, "Failed to record rate limit usage");
            }
        }
    }

    /// Evaluate every payment scope for a transaction without consuming quota
    pub async fn check(&self, actor: &str, amount: u64, method: &str) -> RateCheck {
        self.evaluate(&self.payment_charges(actor, amount, method)).await
    }

    /// Consume quota in every payment scope for a transaction
    pub async fn record(&self, actor: &str, amount: u64, method: &str) {
        self.charge(&self.payment_charges(actor, amount, method)).await;
    }

    /// Check and, if allowed, record a transaction
    pub async fn check_and_record(&self, actor: &str, amount: u64, method: &str) -> RateCheck {
        let charges = self.payment_charges(actor, amount, method);
        let check = self.evaluate(&charges).await;
        if check.allowed {
            self.charge(&charges).await;
        }
        check
    }

    /// Evaluate a single scope for `subject` without consuming quota
    pub async fn check_scope(&self, scope: &RateScope, subject: &str) -> RateCheck {
        self.evaluate(&[Self::single(scope, subject)]).await
    }

    /// Consume one unit of a single scope for `subject`
    pub async fn record_scope(&self, scope: &RateScope, subject: &str) {
        self.charge(&[Self::single(scope, subject)]).await;
    }

    fn single(scope: &RateScope, subject: &str) -> Charge {
        Charge {
            scope: scope.clone(),
            subject: subject.to_string(),
            units: 1,
        }
    }

    /// Current counters of every payment scope for an actor and method.
    ///
    /// The high-value scope is always reported. Unreadable counters show as 0.
    pub async fn usage(&self, actor: &str, method: &str) -> Vec<ScopeUsage> {
        let mut usage = Vec::new();
        for charge in self.payment_charges(actor, u64::MAX, method) {
            let current = store::get_counter(self.store.as_ref(), &self.key(&charge))
                .await
                .unwrap_or_default();
            usage.push(ScopeUsage {
                scope: charge.scope.name,
                subject: charge.subject,
                current,
                limit: charge.scope.limit,
                window: charge.scope.window,
            });
        }
        usage
    }
}
