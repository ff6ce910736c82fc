//! Manual escalation queue
//!
//! When every automated path for a monetary operation fails, the operation is
//! written here for an operator to finish by hand. The engine only appends
//! and reports; draining is an external workflow that calls
//! [`EscalationQueue::mark_processed`].
//!
//! Storage is pluggable through [`ManualQueue`]. A failed write is fatal and
//! propagates as [`ResilienceError::ManualQueueWrite`](crate::ResilienceError):
//! there is nowhere else to put the money.

mod file;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub use file::FileQueue;
pub use memory::InMemoryQueue;

use crate::core::clock::{self, Clock};
use crate::core::ResilienceResult;
use crate::observability::{Alert, AlertSeverity, AlertSink};

/// The operation an operator has to complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Amount in minor currency units
    pub amount: u64,
    /// Payment method
    pub method: String,
    /// Member or staff account that initiated the operation
    pub actor_id: String,
    /// Free-form context (club, invoice, attempted gateways)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Processing status of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for an operator
    Pending,
    /// Completed by an operator
    Processed,
}

/// A queued operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualQueueItem {
    /// Item id
    pub id: Uuid,
    /// The operation
    pub payload: QueuePayload,
    /// When the item was queued
    pub created_at: DateTime<Utc>,
    /// Processing status
    pub status: ItemStatus,
    /// When an operator marked it processed
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ManualQueueItem {
    /// Create a pending item
    #[must_use]
    pub fn pending(payload: QueuePayload, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            created_at,
            status: ItemStatus::Pending,
            processed_at: None,
        }
    }

    /// Whether the item still waits for an operator
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }
}

/// Backlog summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct QueueStatus {
    /// Pending items
    pub queue_length: usize,
    /// Summed amount of pending items, minor units
    pub total_pending_amount: u64,
    /// Age of the oldest pending item
    #[serde(with = "humantime_serde")]
    pub oldest_item_age: Option<Duration>,
}

impl QueueStatus {
    /// Summarize `items` as seen at `now`
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ManualQueueItem>, now: DateTime<Utc>) -> Self {
        let mut status = Self::default();
        let mut oldest: Option<DateTime<Utc>> = None;
        for item in items.into_iter().filter(|item| item.is_pending()) {
            status.queue_length += 1;
            status.total_pending_amount = status.total_pending_amount.saturating_add(item.payload.amount);
            oldest = Some(oldest.map_or(item.created_at, |o| o.min(item.created_at)));
        }
        status.oldest_item_age = oldest.map(|at| clock::elapsed(at, now));
        status
    }
}

/// Durable storage of queue items
#[async_trait]
pub trait ManualQueue: Send + Sync + fmt::Debug {
    /// Append an item
    async fn append(&self, item: ManualQueueItem) -> ResilienceResult<()>;

    /// Every item, in insertion order
    async fn items(&self) -> ResilienceResult<Vec<ManualQueueItem>>;

    /// Mark an item processed. Returns `false` if no pending item has `id`.
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> ResilienceResult<bool>;
}

/// Escalation front end: appends to storage and alerts operators
#[derive(Clone)]
pub struct EscalationQueue {
    storage: Arc<dyn ManualQueue>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EscalationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationQueue")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl EscalationQueue {
    /// Create a queue over `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn ManualQueue>, alerts: Arc<dyn AlertSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            alerts,
            clock,
        }
    }

    /// Queue an operation and alert operators
    #[tracing::instrument(skip(self, payload), fields(amount = payload.amount, method = %payload.method))]
    pub async fn enqueue(&self, payload: QueuePayload) -> ResilienceResult<Uuid> {
        let now = self.clock.now();
        let item = ManualQueueItem::pending(payload, now);
        let id = item.id;
        let alert = Alert::new(AlertSeverity::Critical, "Payment queued for manual processing", now)
            .with_detail("queue_id", id)
            .with_detail("amount", item.payload.amount)
            .with_detail("method", &item.payload.method)
            .with_detail("actor_id", &item.payload.actor_id);

        if let Err(error) = self.storage.append(item).await {
            warn!(%error, "Manual queue write failed");
            return Err(error);
        }
        info!(queue_id = %id, "Operation queued for manual processing");
        self.alerts.send(alert).await;
        Ok(id)
    }

    /// Backlog summary. Reads only.
    pub async fn status(&self) -> ResilienceResult<QueueStatus> {
        let items = self.storage.items().await?;
        Ok(QueueStatus::from_items(&items, self.clock.now()))
    }

    /// Pending items, oldest first
    pub async fn pending(&self) -> ResilienceResult<Vec<ManualQueueItem>> {
        let mut items: Vec<_> = self
            .storage
            .items()
            .await?
            .into_iter()
            .filter(ManualQueueItem::is_pending)
            .collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    /// Record that an operator completed an item
    pub async fn mark_processed(&self, id: Uuid) -> ResilienceResult<bool> {
        let marked = self.storage.mark_processed(id, self.clock.now()).await?;
        if marked {
            info!(queue_id = %id, "Manual queue item processed");
        }
        Ok(marked)
    }
}
