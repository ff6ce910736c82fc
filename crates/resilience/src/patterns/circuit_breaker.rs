//! Circuit breaker pattern for automatic failure detection and recovery
//!
//! State lives in the shared [`StateStore`], so every worker process sees the
//! same breaker. Each call loads the record, applies one transition and
//! writes it back. The load-modify-store cycle is not atomic across workers:
//! under heavy concurrency a breaker may over- or under-count by a few
//! failures, which is tolerable for fault isolation.
//!
//! Store failures degrade to a fresh closed breaker. A breaker that cannot
//! read its own state lets traffic through instead of causing an outage.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::clock::{self, Clock};
use crate::core::{BreakerConfig, ResilienceError, ResilienceResult};
use crate::store::{self, StateStore, keys};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Operations are allowed
    #[default]
    Closed,
    /// Operations are rejected until the recovery timeout elapses
    Open,
    /// Probe operations are allowed to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A state change, reported for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before
    pub from: CircuitState,
    /// State after
    pub to: CircuitState,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Admission rule shared by records and snapshots
fn admits(state: CircuitState, next_attempt_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match state {
        CircuitState::Closed | CircuitState::HalfOpen => true,
        CircuitState::Open => recovery_due(next_attempt_time, now),
    }
}

fn recovery_due(next_attempt_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next_attempt_time.is_none_or(|next| now >= next)
}

/// Persisted breaker record.
///
/// `success_count` is only non-zero while half-open; `failure_count` is
/// zeroed on every transition into closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BreakerRecord {
    /// Current state
    pub state: CircuitState,
    /// Failures counted since the breaker last closed
    pub failure_count: u32,
    /// Successes counted during the current half-open period
    pub success_count: u32,
    /// Time of the most recent failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Earliest time an open breaker allows a probe
    pub next_attempt_time: Option<DateTime<Utc>>,
}

impl BreakerRecord {
    /// Whether a call at `now` would be let through, without changing state
    #[must_use]
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        admits(self.state, self.next_attempt_time, now)
    }

    /// Time until an open breaker allows a probe
    #[must_use]
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state {
            CircuitState::Open => Some(
                self.next_attempt_time
                    .map_or(Duration::ZERO, |next| clock::elapsed(now, next)),
            ),
            _ => None,
        }
    }

    fn recovery_due(&self, now: DateTime<Utc>) -> bool {
        recovery_due(self.next_attempt_time, now)
    }

    fn set_state(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        (from != to).then_some(Transition { from, to })
    }

    /// Admit one call, moving an expired open breaker to half-open
    pub(crate) fn try_acquire(&mut self, now: DateTime<Utc>) -> (bool, Option<Transition>) {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => (true, None),
            CircuitState::Open if self.recovery_due(now) => {
                self.success_count = 0;
                (true, self.set_state(CircuitState::HalfOpen))
            }
            CircuitState::Open => (false, None),
        }
    }

    pub(crate) fn on_success(&mut self, config: &BreakerConfig) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
                None
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.next_attempt_time = None;
                    self.set_state(CircuitState::Closed)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    pub(crate) fn on_failure(
        &mut self,
        config: &BreakerConfig,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_time = Some(now);

        match self.state {
            CircuitState::Closed if self.failure_count >= config.failure_threshold => {
                self.next_attempt_time = Some(clock::add(now, config.recovery_timeout));
                self.set_state(CircuitState::Open)
            }
            CircuitState::Closed | CircuitState::Open => None,
            CircuitState::HalfOpen => {
                self.success_count = 0;
                self.next_attempt_time = Some(clock::add(now, config.recovery_timeout));
                self.set_state(CircuitState::Open)
            }
        }
    }
}

/// Read-only view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failures counted since the breaker last closed
    pub failure_count: u32,
    /// Successes counted during the current half-open period
    pub success_count: u32,
    /// Time of the most recent failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Earliest time an open breaker allows a probe
    pub next_attempt_time: Option<DateTime<Utc>>,
}

impl BreakerSnapshot {
    fn new(name: &str, record: BreakerRecord) -> Self {
        Self {
            name: name.to_string(),
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            last_failure_time: record.last_failure_time,
            next_attempt_time: record.next_attempt_time,
        }
    }

    /// Whether a call at `now` would be let through
    #[must_use]
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        admits(self.state, self.next_attempt_time, now)
    }
}

/// Store-backed circuit breaker for one named resource
pub struct CircuitBreaker {
    name: String,
    key: String,
    config: BreakerConfig,
    state_ttl: Duration,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a breaker whose state lives in `store` for `state_ttl`
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        state_ttl: Duration,
    ) -> ResilienceResult<Self> {
        config.validate()?;
        let name = name.into();
        Ok(Self {
            key: keys::breaker(&name),
            name,
            config,
            state_ttl,
            store,
            clock,
        })
    }

    /// Breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker tunables
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    async fn load(&self) -> BreakerRecord {
        match store::get_json::<BreakerRecord>(self.store.as_ref(), &self.key).await {
            Ok(record) => record.unwrap_or_default(),
            Err(error) => {
                warn!(breaker = %self.name, %error, "Breaker state unreadable, assuming closed");
                BreakerRecord::default()
            }
        }
    }

    async fn save(&self, record: &BreakerRecord) {
        if let Err(error) =
            store::set_json(self.store.as_ref(), &self.key, record, self.state_ttl).await
        {
            warn!(breaker = %self.name, %error, "Failed to persist breaker state");
        }
    }

    fn log_transition(&self, transition: Transition, record: &BreakerRecord) {
        match transition.to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                state_transition = %transition,
                failure_count = record.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.name,
                state_transition = %transition,
                "Circuit breaker probing recovery"
            ),
            CircuitState::Closed => info!(
                breaker = %self.name,
                state_transition = %transition,
                "Circuit breaker closed after successful probes"
            ),
        }
    }

    /// Admit one call or explain why not.
    ///
    /// An open breaker whose recovery timeout has passed moves to half-open
    /// and admits the call.
    pub async fn acquire(&self) -> ResilienceResult<()> {
        let mut record = self.load().await;
        let now = self.clock.now();
        let (allowed, transition) = record.try_acquire(now);

        if let Some(transition) = transition {
            self.save(&record).await;
            self.log_transition(transition, &record);
        }

        if allowed {
            Ok(())
        } else {
            debug!(breaker = %self.name, "Call rejected by open circuit");
            Err(ResilienceError::circuit_open(
                self.name.clone(),
                record.retry_after(now),
            ))
        }
    }

    /// Whether a call may proceed now. May move open to half-open.
    pub async fn can_execute(&self) -> bool {
        self.acquire().await.is_ok()
    }

    /// Whether a call would be admitted, without changing any state
    pub async fn allows_execution(&self) -> bool {
        self.load().await.allows(self.clock.now())
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut record = self.load().await;
        let before = record.clone();
        let transition = record.on_success(&self.config);

        if record != before {
            self.save(&record).await;
        }
        match transition {
            Some(transition) => self.log_transition(transition, &record),
            None => debug!(
                breaker = %self.name,
                state = %record.state,
                failure_count = record.failure_count,
                success_count = record.success_count,
                "Circuit breaker success recorded"
            ),
        }
    }

    /// Record a failed call
    pub async fn record_failure(&self) {
        let mut record = self.load().await;
        let transition = record.on_failure(&self.config, self.clock.now());
        self.save(&record).await;

        match transition {
            Some(transition) => self.log_transition(transition, &record),
            None => debug!(
                breaker = %self.name,
                state = %record.state,
                failure_count = record.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker failure recorded"
            ),
        }
    }

    /// Record the outcome of a call made under this breaker
    pub async fn record_result<T>(&self, result: &ResilienceResult<T>) {
        match result {
            Ok(_) => self.record_success().await,
            Err(error) if error.counts_as_failure() => self.record_failure().await,
            Err(error) => {
                debug!(breaker = %self.name, %error, "Error not counted against breaker");
            }
        }
    }

    /// Run `operation` under this breaker.
    ///
    /// Returns [`ResilienceError::CircuitOpen`] without running the operation
    /// when the breaker rejects the call.
    #[tracing::instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn protected_call<T, F, Fut>(&self, operation: F) -> ResilienceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResilienceResult<T>>,
    {
        self.acquire().await?;
        let result = operation().await;
        self.record_result(&result).await;
        result
    }

    /// Read the current state
    pub async fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot::new(&self.name, self.load().await)
    }

    /// Force the breaker closed and forget its counters
    pub async fn reset(&self) {
        if let Err(error) = self.store.delete(&self.key).await {
            warn!(breaker = %self.name, %error, "Failed to reset breaker state");
        } else {
            info!(breaker = %self.name, "Circuit breaker manually reset");
        }
    }
}
