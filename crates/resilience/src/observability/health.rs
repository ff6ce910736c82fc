//! Read-only health reporting
//!
//! Reports are built from [`BreakerSnapshot`]s and never move a breaker
//! between states. An open breaker whose recovery timeout has passed reports
//! `can_execute = true` but stays open until real traffic probes it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::clock;
use crate::patterns::{BreakerSnapshot, CircuitState};
use crate::queue::QueueStatus;

/// Health of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerHealth {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failures counted since the breaker last closed
    pub failure_count: u32,
    /// Successes counted during the current half-open period
    pub success_count: u32,
    /// Time since the most recent failure
    #[serde(with = "humantime_serde")]
    pub time_since_last_failure: Option<Duration>,
    /// Whether a call would be admitted now
    pub can_execute: bool,
}

impl BreakerHealth {
    /// Derive health from a snapshot taken at `now`
    #[must_use]
    pub fn from_snapshot(snapshot: BreakerSnapshot, now: DateTime<Utc>) -> Self {
        let can_execute = snapshot.allows(now);
        Self {
            time_since_last_failure: snapshot
                .last_failure_time
                .map(|at| clock::elapsed(at, now)),
            name: snapshot.name,
            state: snapshot.state,
            failure_count: snapshot.failure_count,
            success_count: snapshot.success_count,
            can_execute,
        }
    }
}

/// Health of a set of breakers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Per-breaker health, in the order requested
    pub breakers: Vec<BreakerHealth>,
    /// False if any monitored breaker cannot execute
    pub overall_healthy: bool,
}

impl HealthReport {
    /// Aggregate per-breaker health
    #[must_use]
    pub fn new(breakers: Vec<BreakerHealth>) -> Self {
        let overall_healthy = breakers.iter().all(|b| b.can_execute);
        Self {
            breakers,
            overall_healthy,
        }
    }

    /// Health of one breaker by name
    #[must_use]
    pub fn breaker(&self, name: &str) -> Option<&BreakerHealth> {
        self.breakers.iter().find(|b| b.name == name)
    }
}

/// Breaker health plus the manual queue backlog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// Breaker health
    pub health: HealthReport,
    /// Manual queue backlog
    pub manual_queue: QueueStatus,
}
