//! Configuration types and validation
//!
//! Every tunable is `serde`-deserializable with human-readable durations
//! (`"600s"`, `"1h"`), so a deployment can override any preset from TOML or
//! environment variables. [`ResilienceConfig::default`] carries the presets
//! the platform ships with.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ResilienceError;
use super::result::ResilienceResult;

/// Breaker names used by the built-in presets
pub mod names {
    /// Card payments, primary gateway
    pub const STRIPE: &str = "stripe";
    /// Wallet payments, secondary card gateway
    pub const PAYPAL: &str = "paypal";
    /// Cash payments at convenience stores
    pub const OXXO: &str = "oxxo";
    /// Interbank transfers
    pub const SPEI: &str = "spei";
    /// Team registration into a tournament
    pub const INSCRIPTION: &str = "inscription";
    /// Bracket generation for a tournament
    pub const BRACKET_GENERATION: &str = "bracket_generation";
    /// Match result ingestion
    pub const MATCH_RESULTS: &str = "match_results";
}

/// Tunables of a single circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (net of decay) that open the circuit
    pub failure_threshold: u32,
    /// Half-open successes that close the circuit again
    pub success_threshold: u32,
    /// How long the circuit stays open before a half-open probe
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl BreakerConfig {
    /// Create a breaker configuration
    #[must_use]
    pub const fn new(failure_threshold: u32, success_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            recovery_timeout,
        }
    }

    /// Validate the tunables
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::invalid_config(
                "failure_threshold must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::invalid_config(
                "success_threshold must be greater than 0",
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ResilienceError::invalid_config(
                "recovery_timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new(5, 3, Duration::from_secs(60))
    }
}

/// Quotas applied to payment traffic. Amounts are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Transactions per actor per minute
    pub user_transactions_per_minute: u64,
    /// Transactions per actor per hour
    pub user_transactions_per_hour: u64,
    /// Summed amount per actor per day
    pub user_daily_amount: u64,
    /// Transactions per payment method per minute, across all actors
    pub method_transactions_per_minute: u64,
    /// Transactions per second across the whole platform
    pub global_transactions_per_second: u64,
    /// Amount at or above which a transaction counts as high-value
    pub high_value_threshold: u64,
    /// High-value transactions per actor per hour
    pub high_value_transactions_per_hour: u64,
    /// Retry hint returned with every rejection
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_transactions_per_minute: 10,
            user_transactions_per_hour: 100,
            user_daily_amount: 5_000_000,
            method_transactions_per_minute: 500,
            global_transactions_per_second: 100,
            high_value_threshold: 1_000_000,
            high_value_transactions_per_hour: 5,
            retry_after: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> ResilienceResult<()> {
        let limits = [
            ("user_transactions_per_minute", self.user_transactions_per_minute),
            ("user_transactions_per_hour", self.user_transactions_per_hour),
            ("user_daily_amount", self.user_daily_amount),
            ("method_transactions_per_minute", self.method_transactions_per_minute),
            ("global_transactions_per_second", self.global_transactions_per_second),
            ("high_value_threshold", self.high_value_threshold),
            ("high_value_transactions_per_hour", self.high_value_transactions_per_hour),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ResilienceError::invalid_config(format!(
                    "rate_limits.{field} must be greater than 0"
                )));
            }
        }
        if self.retry_after.is_zero() {
            return Err(ResilienceError::invalid_config(
                "rate_limits.retry_after must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Quotas applied to tournament operations, keyed by tournament or match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentLimits {
    /// Team registrations per tournament per minute
    pub inscriptions_per_minute: u64,
    /// Bracket generations per tournament per hour
    pub bracket_generations_per_hour: u64,
    /// Result submissions per match per minute
    pub match_results_per_minute: u64,
    /// Retry hint returned with every rejection
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
}

impl Default for TournamentLimits {
    fn default() -> Self {
        Self {
            inscriptions_per_minute: 30,
            bracket_generations_per_hour: 5,
            match_results_per_minute: 10,
            retry_after: Duration::from_secs(60),
        }
    }
}

/// Gateway ordering and method compatibility for payment failover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Global priority, most preferred first
    pub priority: Vec<String>,
    /// Payment method → gateways able to process it
    pub compatibility: BTreeMap<String, Vec<String>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let gateways = |list: &[&str]| list.iter().map(ToString::to_string).collect::<Vec<_>>();
        Self {
            priority: gateways(&[names::STRIPE, names::PAYPAL, names::OXXO, names::SPEI]),
            compatibility: BTreeMap::from([
                ("card".to_string(), gateways(&[names::STRIPE, names::PAYPAL])),
                ("paypal".to_string(), gateways(&[names::PAYPAL])),
                ("oxxo".to_string(), gateways(&[names::OXXO, names::STRIPE])),
                ("spei".to_string(), gateways(&[names::SPEI])),
                ("bank_transfer".to_string(), gateways(&[names::SPEI])),
            ]),
        }
    }
}

impl GatewayConfig {
    fn validate(&self) -> ResilienceResult<()> {
        if self.priority.is_empty() {
            return Err(ResilienceError::invalid_config(
                "gateways.priority must list at least one gateway",
            ));
        }
        for (index, gateway) in self.priority.iter().enumerate() {
            if self.priority[..index].contains(gateway) {
                return Err(ResilienceError::invalid_config(format!(
                    "gateways.priority lists '{gateway}' twice"
                )));
            }
        }
        for (method, candidates) in &self.compatibility {
            if let Some(unknown) = candidates.iter().find(|c| !self.priority.contains(c)) {
                return Err(ResilienceError::invalid_config(format!(
                    "gateways.compatibility.{method} names '{unknown}' which is not in gateways.priority"
                )));
            }
        }
        Ok(())
    }
}

/// Complete configuration of a resilience registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Tunables for breakers without an explicit entry
    pub default_breaker: BreakerConfig,
    /// Per-breaker tunables
    pub breakers: BTreeMap<String, BreakerConfig>,
    /// Payment quotas
    pub rate_limits: RateLimitConfig,
    /// Tournament quotas
    pub tournament_limits: TournamentLimits,
    /// Payment failover plan
    pub gateways: GatewayConfig,
    /// TTL of persisted breaker state
    #[serde(with = "humantime_serde")]
    pub breaker_state_ttl: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let secs = Duration::from_secs;
        Self {
            default_breaker: BreakerConfig::default(),
            breakers: BTreeMap::from([
                (names::STRIPE.to_string(), BreakerConfig::new(5, 3, secs(60))),
                (names::PAYPAL.to_string(), BreakerConfig::new(5, 3, secs(60))),
                (names::OXXO.to_string(), BreakerConfig::new(3, 2, secs(120))),
                (names::SPEI.to_string(), BreakerConfig::new(3, 2, secs(120))),
                (names::INSCRIPTION.to_string(), BreakerConfig::new(5, 3, secs(300))),
                (names::BRACKET_GENERATION.to_string(), BreakerConfig::new(3, 2, secs(600))),
                (names::MATCH_RESULTS.to_string(), BreakerConfig::new(7, 3, secs(180))),
            ]),
            rate_limits: RateLimitConfig::default(),
            tournament_limits: TournamentLimits::default(),
            gateways: GatewayConfig::default(),
            breaker_state_ttl: secs(3600),
        }
    }
}

impl ResilienceConfig {
    /// Tunables for a named breaker, falling back to the default entry
    #[must_use]
    pub fn breaker(&self, name: &str) -> BreakerConfig {
        self.breakers.get(name).copied().unwrap_or(self.default_breaker)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        self.default_breaker.validate()?;
        for (name, breaker) in &self.breakers {
            breaker.validate().map_err(|e| match e {
                ResilienceError::InvalidConfig { message } => {
                    ResilienceError::invalid_config(format!("breakers.{name}: {message}"))
                }
                other => other,
            })?;
        }

        // Persisted state must outlive the open period, otherwise an open
        // breaker silently expires back to closed.
        let longest = self
            .breakers
            .values()
            .map(|b| b.recovery_timeout)
            .chain(std::iter::once(self.default_breaker.recovery_timeout))
            .max()
            .unwrap_or_default();
        if self.breaker_state_ttl < longest {
            return Err(ResilienceError::invalid_config(format!(
                "breaker_state_ttl ({:?}) is shorter than the longest recovery_timeout ({longest:?})",
                self.breaker_state_ttl
            )));
        }

        self.rate_limits.validate()?;
        if self.tournament_limits.inscriptions_per_minute == 0
            || self.tournament_limits.bracket_generations_per_hour == 0
            || self.tournament_limits.match_results_per_minute == 0
        {
            return Err(ResilienceError::invalid_config(
                "tournament_limits must all be greater than 0",
            ));
        }
        self.gateways.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        ResilienceConfig::default().validate().unwrap();
    }

    #[test]
    fn tournament_presets_match_risk_profile() {
        let config = ResilienceConfig::default();
        let bracket = config.breaker(names::BRACKET_GENERATION);
        assert_eq!(bracket.failure_threshold, 3);
        assert_eq!(bracket.recovery_timeout, Duration::from_secs(600));

        let results = config.breaker(names::MATCH_RESULTS);
        assert_eq!(results.failure_threshold, 7);
        assert_eq!(results.recovery_timeout, Duration::from_secs(180));
    }

    #[test]
    fn unknown_breaker_uses_default_entry() {
        let config = ResilienceConfig::default();
        assert_eq!(config.breaker("mercadopago"), config.default_breaker);
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut config = ResilienceConfig::default();
        config
            .breakers
            .insert("stripe".into(), BreakerConfig::new(0, 3, Duration::from_secs(60)));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("breakers.stripe"));
    }

    #[test]
    fn rejects_state_ttl_shorter_than_recovery() {
        let config = ResilienceConfig {
            breaker_state_ttl: Duration::from_secs(120),
            ..ResilienceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_compatibility_outside_priority() {
        let mut config = ResilienceConfig::default();
        config
            .gateways
            .compatibility
            .insert("card".into(), vec!["adyen".into()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("adyen"));
    }

    #[test]
    fn deserializes_human_readable_durations() {
        let json = r#"{
            "default_breaker": { "failure_threshold": 4, "recovery_timeout": "2m" },
            "breaker_state_ttl": "2h"
        }"#;
        let config: ResilienceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_breaker.failure_threshold, 4);
        assert_eq!(config.default_breaker.success_threshold, 3);
        assert_eq!(config.default_breaker.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.breaker_state_ttl, Duration::from_secs(7200));
        assert_eq!(config.gateways, GatewayConfig::default());
    }
}
