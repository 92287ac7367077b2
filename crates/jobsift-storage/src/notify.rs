use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{io_error, Notification, Notifier, StoreError};

/// Logs one line per notification. Useful for dry runs.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn deliver(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        for (position, note) in notifications.iter().enumerate() {
            tracing::info!(
                position,
                id = %note.id,
                title = %note.title,
                company = %note.company,
                modality = %note.modality,
                score = note.score,
                url = %note.url,
                "notify"
            );
        }
        Ok(notifications.len())
    }
}

/// Appends notifications as JSON lines to an outbox file that a delivery worker drains.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn deliver(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        if notifications.is_empty() {
            return Ok(0);
        }
        let mut buf = Vec::new();
        for note in notifications {
            serde_json::to_writer(&mut buf, note).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error(&self.path))?;
        file.write_all(&buf).await.map_err(io_error(&self.path))?;
        file.flush().await.map_err(io_error(&self.path))?;
        tracing::info!(count = notifications.len(), outbox = %self.path.display(), "queued notifications");
        Ok(notifications.len())
    }
}
