//! Operator alerts raised by the engine

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, warn};

/// Alert urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Needs attention soon
    Warning,
    /// Needs attention now
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

/// An operator-facing alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// Urgency
    pub severity: AlertSeverity,
    /// Short summary
    pub title: String,
    /// Structured context
    pub details: BTreeMap<String, String>,
    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert with no details
    pub fn new(severity: AlertSeverity, title: impl Into<String>, raised_at: DateTime<Utc>) -> Self {
        Self {
            severity,
            title: title.into(),
            details: BTreeMap::new(),
            raised_at,
        }
    }

    /// Attach one detail
    #[must_use = "builder methods must be chained or built"]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }
}

/// Destination for alerts.
///
/// Delivery is best effort: a sink absorbs its own failures, so raising an
/// alert never fails the operation that raised it.
#[async_trait]
pub trait AlertSink: Send + Sync + fmt::Debug {
    /// Deliver an alert
    async fn send(&self, alert: Alert);
}

/// Emits alerts as `tracing` events for the log pipeline to route
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send(&self, alert: Alert) {
        let details = serde_json::to_string(&alert.details).unwrap_or_default();
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert = %alert.title,
                severity = %alert.severity,
                %details,
                "Operator alert"
            ),
            AlertSeverity::Warning => warn!(
                alert = %alert.title,
                severity = %alert.severity,
                %details,
                "Operator alert"
            ),
        }
    }
}

/// Keeps every alert in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingAlertSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    /// Number of alerts received
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    /// Whether no alert was received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}
