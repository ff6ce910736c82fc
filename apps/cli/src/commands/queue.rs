use chrono::Utc;
use rally_resilience::queue::QueueStatus;
use rally_resilience::{FileQueue, ManualQueue};
use uuid::Uuid;

pub async fn status(queue: &FileQueue) -> anyhow::Result<()> {
    let items = queue.items().await?;
    let status = QueueStatus::from_items(&items, Utc::now());
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn list(queue: &FileQueue) -> anyhow::Result<()> {
    let mut pending: Vec<_> = queue.items().await?.into_iter().filter(|i| i.is_pending()).collect();
    pending.sort_by_key(|i| i.created_at);
    for item in &pending {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

pub async fn ack(queue: &FileQueue, id: Uuid) -> anyhow::Result<()> {
    if queue.mark_processed(id, Utc::now()).await? {
        println!("marked {id} as processed");
        Ok(())
    } else {
        anyhow::bail!("no pending item with id {id}")
    }
}
