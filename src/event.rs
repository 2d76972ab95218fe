use crate::entry::CatalogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

impl CatalogEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_string(),
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }

    pub fn created(entry: &CatalogEntry) -> Self {
        Self::new(
            EventKind::Created,
            serde_json::json!({
                "entry_id": entry.id,
                "slug": entry.slug,
                "label": entry.label,
            }),
        )
    }

    pub fn updated(before: &CatalogEntry, after: &CatalogEntry) -> Self {
        Self::new(
            EventKind::Updated,
            serde_json::json!({
                "entry_id": after.id,
                "slug": after.slug,
                "previous_slug": before.slug,
                "slug_changed": before.slug != after.slug,
                "visible": after.visible,
            }),
        )
    }

    pub fn deleted(entry: &CatalogEntry) -> Self {
        Self::new(
            EventKind::Deleted,
            serde_json::json!({
                "entry_id": entry.id,
                "slug": entry.slug,
            }),
        )
    }
}
