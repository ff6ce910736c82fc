//! Protected tournament operations
//!
//! Each operation runs an external validator and an external repository
//! under a breaker and a per-tournament (or per-match) quota. The guard only
//! decides whether the call may run; what the call does belongs to the
//! validator and the repository.
//!
//! Bracket generation reads registrations while it writes the bracket, so it
//! needs both the `bracket_generation` and the `inscription` subsystems
//! healthy and reports its outcome to both.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Outcome, ResilienceResult, TournamentLimits, names};
use crate::patterns::{RateScope, Window};
use crate::registry::ResilienceRegistry;

/// Bracket layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketFormat {
    /// Losers are out
    SingleElimination,
    /// Losers drop to a second bracket
    DoubleElimination,
    /// Everyone plays everyone
    RoundRobin,
    /// Pairings by running score
    Swiss,
}

impl fmt::Display for BracketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SingleElimination => "single_elimination",
            Self::DoubleElimination => "double_elimination",
            Self::RoundRobin => "round_robin",
            Self::Swiss => "swiss",
        };
        f.write_str(name)
    }
}

/// Payload correctness checks, owned by the tournament service.
///
/// Return [`ResilienceError::Validation`](crate::ResilienceError) for bad
/// payloads; those never count against a breaker.
#[async_trait]
pub trait TournamentValidator: Send + Sync + fmt::Debug {
    /// Check a team registration
    async fn validate_registration(&self, tournament_id: &str, team: &Value) -> ResilienceResult<()>;

    /// Check a bracket request
    async fn validate_bracket(
        &self,
        tournament_id: &str,
        format: BracketFormat,
        team_count: u32,
    ) -> ResilienceResult<()>;

    /// Check a match result
    async fn validate_match_result(&self, match_id: &str, result: &Value, actor: &str) -> ResilienceResult<()>;
}

/// Persistence of tournament data, owned by the tournament service
#[async_trait]
pub trait TournamentRepository: Send + Sync + fmt::Debug {
    /// Store a registration, returning its id
    async fn save_registration(&self, tournament_id: &str, team: &Value) -> ResilienceResult<String>;

    /// Build and store a bracket, returning its id
    async fn save_bracket(
        &self,
        tournament_id: &str,
        format: BracketFormat,
        team_count: u32,
    ) -> ResilienceResult<String>;

    /// Store a match result, returning its id
    async fn save_match_result(&self, match_id: &str, result: &Value, actor: &str) -> ResilienceResult<String>;
}

/// Rate scopes derived from [`TournamentLimits`]
fn inscription_scope(limits: &TournamentLimits) -> RateScope {
    RateScope::new("inscriptions_per_minute", limits.inscriptions_per_minute, Window::Minute)
        .with_retry_after(limits.retry_after)
}

fn bracket_scope(limits: &TournamentLimits) -> RateScope {
    RateScope::new("bracket_generations_per_hour", limits.bracket_generations_per_hour, Window::Hour)
        .with_retry_after(limits.retry_after)
}

fn match_result_scope(limits: &TournamentLimits) -> RateScope {
    RateScope::new("match_results_per_minute", limits.match_results_per_minute, Window::Minute)
        .with_retry_after(limits.retry_after)
}

/// Runs tournament operations under their protections
#[derive(Debug, Clone)]
pub struct TournamentGuard {
    registry: Arc<ResilienceRegistry>,
    validator: Arc<dyn TournamentValidator>,
    repository: Arc<dyn TournamentRepository>,
}

impl TournamentGuard {
    /// Create a guard
    #[must_use]
    pub fn new(
        registry: Arc<ResilienceRegistry>,
        validator: Arc<dyn TournamentValidator>,
        repository: Arc<dyn TournamentRepository>,
    ) -> Self {
        Self {
            registry,
            validator,
            repository,
        }
    }

    fn limits(&self) -> &TournamentLimits {
        &self.registry.config().tournament_limits
    }

    /// Register a team into a tournament
    #[tracing::instrument(skip(self, team))]
    pub async fn register_team(&self, tournament_id: &str, team: &Value) -> Outcome<String> {
        let protection = match self.registry.protect(&[names::INSCRIPTION]) {
            Ok(protection) => protection.with_rate_scope(inscription_scope(self.limits()), tournament_id),
            Err(error) => return Outcome::Failed(error),
        };
        let result = protection
            .call(|| async {
                self.validator.validate_registration(tournament_id, team).await?;
                self.repository.save_registration(tournament_id, team).await
            })
            .await;
        Outcome::from_result(names::INSCRIPTION, result)
    }

    /// Generate the bracket of a tournament
    #[tracing::instrument(skip(self))]
    pub async fn generate_bracket(
        &self,
        tournament_id: &str,
        format: BracketFormat,
        team_count: u32,
    ) -> Outcome<String> {
        let protection = match self
            .registry
            .protect(&[names::BRACKET_GENERATION, names::INSCRIPTION])
        {
            Ok(protection) => protection.with_rate_scope(bracket_scope(self.limits()), tournament_id),
            Err(error) => return Outcome::Failed(error),
        };
        let result = protection
            .call(|| async {
                self.validator
                    .validate_bracket(tournament_id, format, team_count)
                    .await?;
                self.repository
                    .save_bracket(tournament_id, format, team_count)
                    .await
            })
            .await;
        Outcome::from_result(names::BRACKET_GENERATION, result)
    }

    /// Record the result of a match
    #[tracing::instrument(skip(self, result_data))]
    pub async fn process_match_result(&self, match_id: &str, result_data: &Value, actor: &str) -> Outcome<String> {
        let protection = match self.registry.protect(&[names::MATCH_RESULTS]) {
            Ok(protection) => protection.with_rate_scope(match_result_scope(self.limits()), match_id),
            Err(error) => return Outcome::Failed(error),
        };
        let result = protection
            .call(|| async {
                self.validator
                    .validate_match_result(match_id, result_data, actor)
                    .await?;
                self.repository
                    .save_match_result(match_id, result_data, actor)
                    .await
            })
            .await;
        Outcome::from_result(names::MATCH_RESULTS, result)
    }
}
