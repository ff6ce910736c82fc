//! Core types shared by every pattern: errors, results, configuration and time

pub mod clock;
mod config;
mod error;
mod result;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BreakerConfig, GatewayConfig, RateLimitConfig, ResilienceConfig, TournamentLimits, names,
};
pub use error::{ErrorClass, ResilienceError};
pub use result::{Outcome, Rejection, ResilienceResult};
