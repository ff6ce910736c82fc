//! Registry that owns every resilience component
//!
//! One [`ResilienceRegistry`] is built at startup and shared (behind an
//! `Arc`) by everything that needs protection. Breakers are created lazily on
//! first use from the configured presets; their state lives in the store, so
//! two registries over the same store see the same breakers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::{Clock, ResilienceConfig, ResilienceResult, SystemClock};
use crate::observability::{AlertSink, BreakerHealth, HealthReport, SystemStatus, TracingAlertSink};
use crate::patterns::{CircuitBreaker, Failover, FailoverPlan, Protection, RateCheck, RateLimiter};
use crate::queue::{EscalationQueue, InMemoryQueue, ManualQueue, QueueStatus};
use crate::store::{InMemoryStore, StateStore};

/// Builder for [`ResilienceRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    config: ResilienceConfig,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    queue: Option<Arc<dyn ManualQueue>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Start from the default presets
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the presets
    #[must_use = "builder methods must be chained or built"]
    pub fn with_config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared state store. Defaults to an in-memory store on the registry clock.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source. Defaults to the system clock.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Manual queue storage. Defaults to in-memory storage.
    #[must_use = "builder methods must be chained or built"]
    pub fn with_queue(mut self, queue: Arc<dyn ManualQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Alert destination. Defaults to [`TracingAlertSink`].
    #[must_use = "builder methods must be chained or built"]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Validate the configuration and build the registry
    pub fn build(self) -> ResilienceResult<ResilienceRegistry> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new(Arc::clone(&clock))));
        let queue = EscalationQueue::new(
            self.queue.unwrap_or_else(|| Arc::new(InMemoryQueue::new())),
            self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink)),
            Arc::clone(&clock),
        );
        let limiter = Arc::new(RateLimiter::new(
            self.config.rate_limits.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
        ));

        info!(
            breakers = self.config.breakers.len(),
            gateways = self.config.gateways.priority.len(),
            "Resilience registry ready"
        );
        Ok(ResilienceRegistry {
            plan: FailoverPlan::new(&self.config.gateways),
            config: self.config,
            store,
            clock,
            limiter,
            queue,
            breakers: RwLock::new(HashMap::new()),
        })
    }
}

/// Owner of the store, clock, breakers, limiter and manual queue
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    plan: FailoverPlan,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
    queue: EscalationQueue,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl fmt::Debug for ResilienceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceRegistry")
            .field("store", &self.store)
            .field("breakers", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ResilienceRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Time source shared by every component
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Shared state store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Payment rate limiter
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Manual escalation queue
    #[must_use]
    pub fn queue(&self) -> &EscalationQueue {
        &self.queue
    }

    /// Payment failover plan
    #[must_use]
    pub fn plan(&self) -> &FailoverPlan {
        &self.plan
    }

    /// Breaker for `name`, created from its preset on first use.
    ///
    /// Names without a preset use the default breaker configuration.
    pub fn breaker(&self, name: &str) -> ResilienceResult<Arc<CircuitBreaker>> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Ok(Arc::clone(breaker));
        }

        let mut breakers = self.breakers.write();
        if let Some(breaker) = breakers.get(name) {
            return Ok(Arc::clone(breaker));
        }
        let breaker = Arc::new(CircuitBreaker::new(
            name,
            self.config.breaker(name),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.breaker_state_ttl,
        )?);
        debug!(breaker = name, "Circuit breaker registered");
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        Ok(breaker)
    }

    /// Breakers for several names, in order
    pub fn breakers<S: AsRef<str>>(&self, names: &[S]) -> ResilienceResult<Vec<Arc<CircuitBreaker>>> {
        names.iter().map(|name| self.breaker(name.as_ref())).collect()
    }

    /// Names of every breaker with a preset
    #[must_use]
    pub fn known_breakers(&self) -> Vec<String> {
        self.config.breakers.keys().cloned().collect()
    }

    /// Protection over one or more breakers
    pub fn protect<S: AsRef<str>>(&self, names: &[S]) -> ResilienceResult<Protection> {
        Ok(Protection::new(self.breakers(names)?, Arc::clone(&self.limiter)))
    }

    /// Failover across the gateways able to process `method`
    pub fn failover(&self, method: &str) -> ResilienceResult<Failover> {
        Ok(Failover::new(self.breakers(&self.plan.candidates(method))?))
    }

    /// Evaluate payment quotas without consuming them
    pub async fn check_rate_limit(&self, actor: &str, amount: u64, method: &str) -> RateCheck {
        self.limiter.check(actor, amount, method).await
    }

    /// Consume payment quotas for a transaction
    pub async fn record_transaction(&self, actor: &str, amount: u64, method: &str) {
        self.limiter.record(actor, amount, method).await;
    }

    /// Health of the named breakers. Never changes breaker state.
    pub async fn health_status<S: AsRef<str>>(&self, names: &[S]) -> ResilienceResult<HealthReport> {
        let now = self.clock.now();
        let mut health = Vec::with_capacity(names.len());
        for breaker in self.breakers(names)? {
            health.push(BreakerHealth::from_snapshot(breaker.snapshot().await, now));
        }
        Ok(HealthReport::new(health))
    }

    /// Manual queue backlog
    pub async fn manual_queue_status(&self) -> ResilienceResult<QueueStatus> {
        self.queue.status().await
    }

    /// Health of every preset breaker plus the manual queue backlog
    pub async fn system_status(&self) -> ResilienceResult<SystemStatus> {
        Ok(SystemStatus {
            health: self.health_status(&self.known_breakers()).await?,
            manual_queue: self.manual_queue_status().await?,
        })
    }
}
