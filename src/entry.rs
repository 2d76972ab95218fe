use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_PROPERTY_NATURE: &str = "Residential";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntryId,
    pub label: String,
    pub slug: String,
    /// Normalized source text behind `slug`; empty when a fallback token was used.
    pub slug_base: String,
    pub slug_override: Option<String>,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub property_nature: String,
    pub project_status: Option<String>,
    pub top_pick: bool,
    pub visible: bool,
    /// Bumped by every successful write; a replace must name the revision it read.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Builds an entry with a fresh identity. The slug is left empty for the allocator.
    pub fn from_new(new: NewEntry, slug_base: String) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::generate(),
            label: new.label,
            slug: String::new(),
            slug_base,
            slug_override: clean_override(new.slug_override),
            location: new.location,
            property_type: new.property_type,
            property_nature: new
                .property_nature
                .filter(|nature| !nature.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROPERTY_NATURE.to_string()),
            project_status: new.project_status,
            top_pick: new.top_pick,
            visible: new.visible,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies every non-slug field of the patch and bumps the revision.
    /// Returns the merged copy.
    pub fn patched(&self, patch: &EntryPatch) -> Self {
        let mut next = self.clone();
        if let Some(label) = &patch.label {
            next.label = label.clone();
        }
        if let Some(slug_override) = &patch.slug_override {
            next.slug_override = clean_override(Some(slug_override.clone()));
        }
        if let Some(location) = &patch.location {
            next.location = Some(location.clone());
        }
        if let Some(property_type) = &patch.property_type {
            next.property_type = Some(property_type.clone());
        }
        if let Some(nature) = patch.property_nature.as_ref().filter(|n| !n.trim().is_empty()) {
            next.property_nature = nature.clone();
        }
        if let Some(status) = &patch.project_status {
            next.project_status = Some(status.clone());
        }
        if let Some(top_pick) = patch.top_pick {
            next.top_pick = top_pick;
        }
        if let Some(visible) = patch.visible {
            next.visible = visible;
        }
        next.revision = self.revision + 1;
        next.updated_at = Utc::now();
        next
    }

    pub fn slug_source(&self) -> &str {
        crate::slug::source_text(&self.label, self.slug_override.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEntry {
    pub label: String,
    #[serde(default)]
    pub slug_override: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub property_nature: Option<String>,
    #[serde(default)]
    pub project_status: Option<String>,
    #[serde(default)]
    pub top_pick: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl NewEntry {
    pub fn labeled(label: &str) -> Self {
        Self {
            label: label.to_string(),
            slug_override: None,
            location: None,
            property_type: None,
            property_nature: None,
            project_status: None,
            top_pick: false,
            visible: true,
        }
    }
}

fn default_visible() -> bool {
    true
}

/// Partial update. `None` keeps the stored value; a blank `slug_override` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryPatch {
    pub label: Option<String>,
    pub slug_override: Option<String>,
    pub location: Option<String>,
    pub property_type: Option<String>,
    pub property_nature: Option<String>,
    pub project_status: Option<String>,
    pub top_pick: Option<bool>,
    pub visible: Option<bool>,
}

impl EntryPatch {
    #[cfg(test)]
    pub fn relabel(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.slug_override.is_none()
            && self.location.is_none()
            && self.property_type.is_none()
            && self.property_nature.is_none()
            && self.project_status.is_none()
            && self.top_pick.is_none()
            && self.visible.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub include_hidden: bool,
    pub top_picks_only: bool,
    pub property_nature: Option<String>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn everything() -> Self {
        Self {
            include_hidden: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        if !self.include_hidden && !entry.visible {
            return false;
        }
        if self.top_picks_only && !entry.top_pick {
            return false;
        }
        match &self.property_nature {
            Some(nature) => entry.property_nature == *nature,
            None => true,
        }
    }
}

fn clean_override(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
