//! Observability hooks: operator alerts and read-only health reporting
//!
//! Alerts leave the engine through an [`AlertSink`]. The default sink turns
//! them into `tracing` events; deployments plug a pager or chat sink in
//! behind the same trait.
//!
//! ```rust,ignore
//! use rally_resilience::observability::{Alert, AlertSeverity, AlertSink};
//!
//! sink.send(
//!     Alert::new(AlertSeverity::Critical, "payment queued for manual processing", now)
//!         .with_detail("amount", 125_000),
//! )
//! .await;
//! ```

pub mod alerts;
pub mod health;

pub use alerts::{Alert, AlertSeverity, AlertSink, RecordingAlertSink, TracingAlertSink};
pub use health::{BreakerHealth, HealthReport, SystemStatus};
