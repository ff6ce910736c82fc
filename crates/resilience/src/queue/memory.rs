//! In-process queue storage

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ItemStatus, ManualQueue, ManualQueueItem};
use crate::core::ResilienceResult;

/// Queue storage held in memory. Not durable across restarts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    items: Arc<RwLock<Vec<ManualQueueItem>>>,
}

impl InMemoryQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManualQueue for InMemoryQueue {
    async fn append(&self, item: ManualQueueItem) -> ResilienceResult<()> {
        self.items.write().push(item);
        Ok(())
    }

    async fn items(&self) -> ResilienceResult<Vec<ManualQueueItem>> {
        Ok(self.items.read().clone())
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> ResilienceResult<bool> {
        let mut items = self.items.write();
        match items.iter_mut().find(|item| item.id == id && item.is_pending()) {
            Some(item) => {
                item.status = ItemStatus::Processed;
                item.processed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
