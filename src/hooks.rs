use crate::event::CatalogEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::to_string;
use std::path::Path;
use tokio::fs::{create_dir_all, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait EventHook: Send + Sync {
    async fn on_event(&self, event: &CatalogEvent) -> Result<()>;
}

/// Appends every catalog change to a JSON-lines audit file.
pub struct AuditJsonlHook {
    writer: Mutex<File>,
}

impl AuditJsonlHook {
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating audit log directory {}", parent.display()))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening audit log {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(file),
        })
    }
}

#[async_trait]
impl EventHook for AuditJsonlHook {
    async fn on_event(&self, event: &CatalogEvent) -> Result<()> {
        let serialized = to_string(event).context("serializing audit event")?;
        let mut writer = self.writer.lock().await;
        writer.write_all(serialized.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

pub struct TracingHook;

#[async_trait]
impl EventHook for TracingHook {
    async fn on_event(&self, event: &CatalogEvent) -> Result<()> {
        tracing::info!(
            target: "catalog::events",
            kind = ?event.kind,
            event_id = %event.id,
            payload = %event.payload,
            "catalog changed"
        );
        Ok(())
    }
}
