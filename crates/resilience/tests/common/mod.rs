//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rally_resilience::domain::{
    BracketFormat, GatewayClient, GatewayReceipt, PaymentProcessor, PaymentRequest,
    TournamentRepository, TournamentValidator,
};
use rally_resilience::observability::RecordingAlertSink;
use rally_resilience::store::{StateStore, StoreError, StoreResult};
use rally_resilience::{ManualClock, ManualQueue, ResilienceConfig, ResilienceError, ResilienceRegistry, ResilienceResult};
use serde_json::Value;

/// Registry on a manual clock with recorded alerts
pub struct Harness {
    pub registry: Arc<ResilienceRegistry>,
    pub clock: ManualClock,
    pub alerts: RecordingAlertSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ResilienceConfig::default())
    }

    pub fn with_config(config: ResilienceConfig) -> Self {
        Self::build(config, None, None)
    }

    pub fn build(
        config: ResilienceConfig,
        store: Option<Arc<dyn StateStore>>,
        queue: Option<Arc<dyn ManualQueue>>,
    ) -> Self {
        rally_log::init_test();
        let clock = ManualClock::starting_now();
        let alerts = RecordingAlertSink::new();
        let mut builder = ResilienceRegistry::builder()
            .with_config(config)
            .with_clock(Arc::new(clock.clone()))
            .with_alerts(Arc::new(alerts.clone()));
        if let Some(store) = store {
            builder = builder.with_store(store);
        }
        if let Some(queue) = queue {
            builder = builder.with_queue(queue);
        }
        Self {
            registry: Arc::new(builder.build().unwrap()),
            clock,
            alerts,
        }
    }

    /// Open a breaker by feeding it failures
    pub async fn trip(&self, name: &str) {
        let breaker = self.registry.breaker(name).unwrap();
        for _ in 0..breaker.config().failure_threshold {
            breaker.record_failure().await;
        }
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}

/// Gateway whose health can be flipped during a test
#[derive(Debug)]
pub struct FakeGateway {
    name: &'static str,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl FakeGateway {
    pub fn healthy(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        let gateway = Self::healthy(name);
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    fn name(&self) -> &str {
        self.name
    }

    async fn charge(&self, request: &PaymentRequest) -> ResilienceResult<GatewayReceipt> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResilienceError::transient(self.name, "503 Service Unavailable"));
        }
        Ok(GatewayReceipt {
            transaction_id: format!("{}-{}-{n}", self.name, request.actor_id),
        })
    }
}

/// Processor over the four standard gateways
pub fn processor(
    registry: &Arc<ResilienceRegistry>,
    gateways: &[Arc<FakeGateway>],
) -> PaymentProcessor {
    gateways.iter().fold(PaymentProcessor::new(Arc::clone(registry)), |processor, gateway| {
        processor.with_gateway(Arc::clone(gateway) as Arc<dyn GatewayClient>)
    })
}

/// Store that is always down
#[derive(Debug, Default)]
pub struct UnavailableStore;

#[async_trait]
impl StateStore for UnavailableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn incr_by(&self, _key: &str, _delta: u64, _ttl: Duration) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Validator that rejects payloads carrying `"invalid": true`
#[derive(Debug, Default)]
pub struct FlagValidator;

fn flagged(value: &Value) -> bool {
    value.get("invalid").and_then(Value::as_bool).unwrap_or(false)
}

#[async_trait]
impl TournamentValidator for FlagValidator {
    async fn validate_registration(&self, _tournament_id: &str, team: &Value) -> ResilienceResult<()> {
        if flagged(team) {
            return Err(ResilienceError::validation("team roster incomplete"));
        }
        Ok(())
    }

    async fn validate_bracket(
        &self,
        _tournament_id: &str,
        _format: BracketFormat,
        team_count: u32,
    ) -> ResilienceResult<()> {
        if team_count < 2 {
            return Err(ResilienceError::validation("a bracket needs at least two teams"));
        }
        Ok(())
    }

    async fn validate_match_result(&self, _match_id: &str, result: &Value, _actor: &str) -> ResilienceResult<()> {
        if flagged(result) {
            return Err(ResilienceError::validation("score missing"));
        }
        Ok(())
    }
}

/// Repository that records writes and can be made to fail
#[derive(Debug, Default)]
pub struct FakeRepository {
    pub failing: AtomicBool,
    pub writes: Mutex<Vec<String>>,
}

impl FakeRepository {
    fn write(&self, what: String) -> ResilienceResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResilienceError::transient("tournament_db", "connection reset"));
        }
        let mut writes = self.writes.lock();
        writes.push(what);
        Ok(format!("rec-{}", writes.len()))
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

#[async_trait]
impl TournamentRepository for FakeRepository {
    async fn save_registration(&self, tournament_id: &str, _team: &Value) -> ResilienceResult<String> {
        self.write(format!("registration:{tournament_id}"))
    }

    async fn save_bracket(
        &self,
        tournament_id: &str,
        format: BracketFormat,
        team_count: u32,
    ) -> ResilienceResult<String> {
        self.write(format!("bracket:{tournament_id}:{format}:{team_count}"))
    }

    async fn save_match_result(&self, match_id: &str, _result: &Value, _actor: &str) -> ResilienceResult<String> {
        self.write(format!("result:{match_id}"))
    }
}
