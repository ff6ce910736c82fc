//! In-process gateways for failover drills

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rally_resilience::domain::{GatewayClient, GatewayReceipt, PaymentRequest};
use rally_resilience::{ResilienceError, ResilienceResult};

/// Gateway that either charges every request or times out on every request
#[derive(Debug)]
pub struct SimulatedGateway {
    name: String,
    failing: bool,
    charges: AtomicU64,
}

impl SimulatedGateway {
    pub fn new(name: impl Into<String>, failing: bool) -> Self {
        Self {
            name: name.into(),
            failing,
            charges: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl GatewayClient for SimulatedGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn charge(&self, request: &PaymentRequest) -> ResilienceResult<GatewayReceipt> {
        if self.failing {
            return Err(ResilienceError::transient(&self.name, "simulated gateway timeout"));
        }
        let seq = self.charges.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(gateway = %self.name, actor = %request.actor_id, amount = request.amount, "simulated charge");
        Ok(GatewayReceipt {
            transaction_id: format!("{}-sim-{seq:06}", self.name),
        })
    }
}
