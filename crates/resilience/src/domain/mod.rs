//! Platform operations built on the resilience patterns

pub mod payments;
pub mod tournament;

pub use payments::{
    GatewayClient, GatewayReceipt, PaymentProcessor, PaymentRequest, PaymentResponse, PaymentStatus,
};
pub use tournament::{BracketFormat, TournamentGuard, TournamentRepository, TournamentValidator};
