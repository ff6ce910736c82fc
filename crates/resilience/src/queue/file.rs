//! Durable queue storage as a JSON-lines file

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ItemStatus, ManualQueue, ManualQueueItem};
use crate::core::{ResilienceError, ResilienceResult};

/// One item per line, appended and fsynced on every enqueue.
///
/// Marking an item processed rewrites the file through a temporary sibling
/// and a rename. Writers in one process are serialized; sharing one file
/// between processes is not supported.
#[derive(Debug)]
pub struct FileQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileQueue {
    /// Use the queue file at `path`, creating it on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the queue file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ResilienceResult<Vec<ManualQueueItem>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(ResilienceError::queue_read(
                    format!("reading {}", self.path.display()),
                    error,
                ));
            }
        };

        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|error| {
                    ResilienceError::queue_read(
                        format!("{} line {}", self.path.display(), index + 1),
                        error,
                    )
                })
            })
            .collect()
    }

    fn encode(&self, item: &ManualQueueItem) -> ResilienceResult<String> {
        let mut line = serde_json::to_string(item)
            .map_err(|error| ResilienceError::queue_write("encoding queue item", error))?;
        line.push('\n');
        Ok(line)
    }

    async fn rewrite(&self, items: &[ManualQueueItem]) -> ResilienceResult<()> {
        let mut content = String::new();
        for item in items {
            content.push_str(&self.encode(item)?);
        }

        let temp_path = self.temp_path();
        let result = async {
            self.write_synced(&temp_path, content.as_bytes()).await?;
            fs::rename(&temp_path, &self.path).await.map_err(|error| {
                ResilienceError::queue_write(format!("replacing {}", self.path.display()), error)
            })
        }
        .await;

        if result.is_err() {
            // Best effort; the original file is still intact.
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    async fn write_synced(&self, path: &Path, content: &[u8]) -> ResilienceResult<()> {
        let write_error =
            |error| ResilienceError::queue_write(format!("writing {}", path.display()), error);
        let mut file = fs::File::create(path).await.map_err(write_error)?;
        file.write_all(content).await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)
    }
}

#[async_trait]
impl ManualQueue for FileQueue {
    async fn append(&self, item: ManualQueueItem) -> ResilienceResult<()> {
        let line = self.encode(&item)?;
        let write_error =
            |error| ResilienceError::queue_write(format!("appending to {}", self.path.display()), error);

        let _guard = self.lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_error)?;
        file.write_all(line.as_bytes()).await.map_err(write_error)?;
        file.sync_data().await.map_err(write_error)
    }

    async fn items(&self) -> ResilienceResult<Vec<ManualQueueItem>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> ResilienceResult<bool> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let Some(item) = items.iter_mut().find(|item| item.id == id && item.is_pending()) else {
            return Ok(false);
        };
        item.status = ItemStatus::Processed;
        item.processed_at = Some(at);
        self.rewrite(&items).await?;
        Ok(true)
    }
}
