//! Protected operations: one or more breakers plus an optional rate scope
//!
//! Entering a protection checks the rate scope, then requires every breaker
//! to admit the call. Leaving it reports the outcome to every breaker in the
//! set, so compound operations that need several subsystems healthy at once
//! trip all of them together.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::circuit_breaker::CircuitBreaker;
use super::rate_limiter::{RateLimiter, RateScope};
use crate::core::ResilienceResult;

/// A set of breakers and an optional rate scope wrapped around a unit of work
#[derive(Debug, Clone)]
pub struct Protection {
    breakers: Vec<Arc<CircuitBreaker>>,
    limiter: Arc<RateLimiter>,
    rate: Option<(RateScope, String)>,
}

impl Protection {
    /// Protect with `breakers`, no rate scope
    #[must_use]
    pub fn new(breakers: Vec<Arc<CircuitBreaker>>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            breakers,
            limiter,
            rate: None,
        }
    }

    /// Also enforce `scope` for `subject` (a tournament id, a match id)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_rate_scope(mut self, scope: RateScope, subject: impl Into<String>) -> Self {
        self.rate = Some((scope, subject.into()));
        self
    }

    /// Admit one call.
    ///
    /// Fails with `RateLimitExceeded` or `CircuitOpen` before anything is
    /// consumed. Quota is charged only once every breaker has admitted.
    pub async fn enter(&self) -> ResilienceResult<()> {
        if let Some((scope, subject)) = &self.rate {
            self.limiter.check_scope(scope, subject).await.into_result()?;
        }

        // Look before acquiring so a blocked member leaves the others untouched.
        // A member that becomes due between the look and the acquire is
        // admitted here and the remaining members are still checked.
        for breaker in &self.breakers {
            if !breaker.allows_execution().await {
                breaker.acquire().await?;
            }
        }
        for breaker in &self.breakers {
            breaker.acquire().await?;
        }

        if let Some((scope, subject)) = &self.rate {
            self.limiter.record_scope(scope, subject).await;
        }
        Ok(())
    }

    /// Report the outcome to every breaker in the set
    pub async fn exit<T>(&self, result: &ResilienceResult<T>) {
        for breaker in &self.breakers {
            breaker.record_result(result).await;
        }
    }

    /// Run `operation` under this protection
    #[tracing::instrument(skip_all, fields(breakers = self.breakers.len()))]
    pub async fn call<T, F, Fut>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        if let Err(rejection) = self.enter().await {
            debug!(error = %rejection, "Protected call rejected");
            return Err(rejection);
        }
        let result = operation().await;
        self.exit(&result).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BreakerConfig, Clock, ManualClock, RateLimitConfig, ResilienceError};
    use crate::patterns::CircuitState;
    use crate::patterns::rate_limiter::Window;
    use crate::store::{InMemoryStore, StateStore};
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Returns the scripted instants in order, then repeats the last one
    #[derive(Debug)]
    struct ScriptedClock {
        instants: Mutex<VecDeque<DateTime<Utc>>>,
    }

    impl ScriptedClock {
        fn new(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
            Self {
                instants: Mutex::new(instants.into_iter().collect()),
            }
        }
    }

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Utc> {
            let mut instants = self.instants.lock();
            if instants.len() > 1 {
                instants.pop_front().unwrap()
            } else {
                *instants.front().unwrap()
            }
        }
    }

    struct Fixture {
        clock: ManualClock,
        store: Arc<dyn StateStore>,
        limiter: Arc<RateLimiter>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::starting_now();
            let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
            let limiter = Arc::new(RateLimiter::new(
                RateLimitConfig::default(),
                Arc::clone(&store),
                Arc::new(clock.clone()),
            ));
            Self {
                clock,
                store,
                limiter,
            }
        }

        fn breaker(&self, name: &str, failure_threshold: u32) -> Arc<CircuitBreaker> {
            self.breaker_on(name, failure_threshold, Arc::new(self.clock.clone()))
        }

        fn breaker_on(&self, name: &str, failure_threshold: u32, clock: Arc<dyn Clock>) -> Arc<CircuitBreaker> {
            Arc::new(
                CircuitBreaker::new(
                    name,
                    BreakerConfig::new(failure_threshold, 1, Duration::from_secs(300)),
                    Arc::clone(&self.store),
                    clock,
                    Duration::from_secs(3600),
                )
                .unwrap(),
            )
        }

        /// Open `inscription` at the fixture time and return a handle whose
        /// clock reads it as still open on the first look and due on the next.
        async fn inscription_turning_due(&self) -> Arc<CircuitBreaker> {
            self.breaker("inscription", 1).record_failure().await;
            let opened_at = self.clock.now();
            let clock = ScriptedClock::new([
                opened_at + chrono::Duration::seconds(299),
                opened_at + chrono::Duration::seconds(301),
            ]);
            self.breaker_on("inscription", 1, Arc::new(clock))
        }
    }

    #[tokio::test]
    async fn compound_rejects_before_body_when_any_member_open() {
        let fx = Fixture::new();
        let inscription = fx.breaker("inscription", 1);
        let bracket = fx.breaker("bracket_generation", 1);
        bracket.record_failure().await;

        let protection = Protection::new(
            vec![Arc::clone(&inscription), Arc::clone(&bracket)],
            Arc::clone(&fx.limiter),
        );
        let ran = AtomicBool::new(false);
        let result = protection
            .call(|| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { ref name, .. }) if name == "bracket_generation"));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(inscription.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn failure_is_propagated_to_every_member() {
        let fx = Fixture::new();
        let a = fx.breaker("inscription", 1);
        let b = fx.breaker("bracket_generation", 1);
        let protection = Protection::new(vec![Arc::clone(&a), Arc::clone(&b)], Arc::clone(&fx.limiter));

        let _ = protection
            .call(|| async { Err::<(), _>(ResilienceError::transient("bracket_generation", "db timeout")) })
            .await;

        assert_eq!(a.snapshot().await.state, CircuitState::Open);
        assert_eq!(b.snapshot().await.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn rate_scope_rejects_and_is_charged_on_admission() {
        let fx = Fixture::new();
        let scope = RateScope::new("match_results_per_minute", 2, Window::Minute);
        let protection = Protection::new(vec![fx.breaker("match_results", 7)], Arc::clone(&fx.limiter))
            .with_rate_scope(scope, "match-9");

        protection.call(|| async { Ok(()) }).await.unwrap();
        protection.call(|| async { Ok(()) }).await.unwrap();
        let result = protection.call(|| async { Ok(()) }).await;

        match result {
            Err(ResilienceError::RateLimitExceeded { violations, .. }) => {
                assert_eq!(violations, vec!["match_results_per_minute_exceeded"]);
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_member_probes_half_open() {
        let fx = Fixture::new();
        let breaker = fx.breaker("inscription", 1);
        breaker.record_failure().await;
        fx.clock.advance(Duration::from_secs(300));

        let protection = Protection::new(vec![Arc::clone(&breaker)], Arc::clone(&fx.limiter));
        protection.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn member_turning_due_mid_entry_does_not_skip_open_members() {
        let fx = Fixture::new();
        let inscription = fx.inscription_turning_due().await;
        let bracket = fx.breaker("bracket_generation", 1);
        bracket.record_failure().await;

        let scope = RateScope::new("bracket_generations_per_hour", 5, Window::Hour);
        let protection = Protection::new(
            vec![Arc::clone(&inscription), Arc::clone(&bracket)],
            Arc::clone(&fx.limiter),
        )
        .with_rate_scope(scope, "cup-2026");
        let ran = AtomicBool::new(false);
        let result = protection
            .call(|| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { ref name, .. }) if name == "bracket_generation"));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(bracket.snapshot().await.state, CircuitState::Open);

        // Nothing was charged against the tournament quota
        let one_left = RateScope::new("bracket_generations_per_hour", 1, Window::Hour);
        assert!(fx.limiter.check_scope(&one_left, "cup-2026").await.allowed);
    }

    #[tokio::test]
    async fn member_turning_due_mid_entry_still_charges_quota() {
        let fx = Fixture::new();
        let inscription = fx.inscription_turning_due().await;
        let bracket = fx.breaker("bracket_generation", 1);

        let scope = RateScope::new("bracket_generations_per_hour", 5, Window::Hour);
        let protection = Protection::new(vec![inscription, Arc::clone(&bracket)], Arc::clone(&fx.limiter))
            .with_rate_scope(scope, "cup-2026");
        protection.call(|| async { Ok(()) }).await.unwrap();

        let one_left = RateScope::new("bracket_generations_per_hour", 1, Window::Hour);
        assert!(!fx.limiter.check_scope(&one_left, "cup-2026").await.allowed);
    }
}
