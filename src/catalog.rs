use crate::allocator::{Placement, SlugAllocator};
use crate::entry::{CatalogEntry, EntryId, EntryPatch, ListFilter, NewEntry, DEFAULT_PROPERTY_NATURE};
use crate::error::{CatalogError, CatalogResult};
use crate::event::CatalogEvent;
use crate::hooks::EventHook;
use crate::sitemap::SitemapEntry;
use crate::slug;
use crate::store::CatalogStore;
use regex::RegexBuilder;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const TOP_PICKS_LIMIT: usize = 12;
const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Boundary operations over the catalog.
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    allocator: SlugAllocator,
    hooks: Vec<Arc<dyn EventHook>>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>, allocator: SlugAllocator) -> Self {
        Self {
            store,
            allocator,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn EventHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub async fn create_entry(&self, new: NewEntry) -> CatalogResult<CatalogEntry> {
        let base = self
            .allocator
            .base_for(slug::source_text(&new.label, new.slug_override.as_deref()));
        let entry = CatalogEntry::from_new(new, base.normalized.clone());
        let created = self
            .allocator
            .place(self.store.as_ref(), entry, &base, Placement::Create)
            .await?;

        self.emit(CatalogEvent::created(&created)).await;
        Ok(created)
    }

    /// Reallocates the slug only when the normalized source text changed.
    ///
    /// The patch is applied to a fresh read and written back only if nothing
    /// else wrote the entry in between; a lost race re-reads and tries again.
    pub async fn update_entry(&self, id: &EntryId, patch: EntryPatch) -> CatalogResult<CatalogEntry> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self.require(id).await?;
            if patch.is_empty() {
                return Ok(current);
            }

            match self.write_patch(&current, &patch).await {
                Ok(updated) => {
                    self.emit(CatalogEvent::updated(&current, &updated)).await;
                    return Ok(updated);
                }
                Err(CatalogError::Stale(_)) => {
                    tracing::debug!(id = %id, attempt, "entry changed while updating; re-reading");
                }
                Err(other) => return Err(other),
            }
        }

        tracing::warn!(id = %id, attempts = MAX_UPDATE_ATTEMPTS, "update kept losing to concurrent writes");
        Err(CatalogError::Stale(id.clone()))
    }

    async fn write_patch(&self, current: &CatalogEntry, patch: &EntryPatch) -> CatalogResult<CatalogEntry> {
        let next = current.patched(patch);
        let normalized = slug::normalize(next.slug_source());
        if normalized == current.slug_base {
            self.store.replace(&next, current.revision).await?;
            return Ok(next);
        }

        let base = self.allocator.base_for(next.slug_source());
        tracing::debug!(
            id = %current.id,
            from = %current.slug_base,
            to = %base.normalized,
            "slug source changed; reallocating"
        );
        let update = Placement::Update {
            expected_revision: current.revision,
        };
        self.allocator
            .place(self.store.as_ref(), next, &base, update)
            .await
    }

    /// Public read path. The requested slug is normalized before the lookup.
    pub async fn lookup_by_slug(&self, slug: &str) -> CatalogResult<Option<CatalogEntry>> {
        let wanted = slug::normalize(slug);
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self.store.find_by_slug(&wanted).await?)
    }

    pub async fn get_entry(&self, id: &EntryId) -> CatalogResult<Option<CatalogEntry>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn delete_entry(&self, id: &EntryId) -> CatalogResult<()> {
        let current = self.require(id).await?;
        if !self.store.delete(id).await? {
            return Err(CatalogError::NotFound(id.clone()));
        }
        self.emit(CatalogEvent::deleted(&current)).await;
        Ok(())
    }

    pub async fn set_visibility(&self, id: &EntryId, visible: bool) -> CatalogResult<CatalogEntry> {
        self.update_entry(
            id,
            EntryPatch {
                visible: Some(visible),
                ..EntryPatch::default()
            },
        )
        .await
    }

    pub async fn list_entries(&self, include_hidden: bool) -> CatalogResult<Vec<CatalogEntry>> {
        let filter = if include_hidden {
            ListFilter::everything()
        } else {
            ListFilter::visible()
        };
        Ok(self.store.list(&filter).await?)
    }

    /// Case-insensitive match on label, location or property type among visible entries.
    pub async fn search(&self, query: &str) -> CatalogResult<Vec<CatalogEntry>> {
        let entries = self.store.list(&ListFilter::visible()).await?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(entries);
        }

        let pattern = match RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(error) => {
                tracing::warn!(%error, query, "search query could not be compiled");
                return Ok(Vec::new());
            }
        };

        Ok(entries
            .into_iter()
            .filter(|entry| {
                pattern.is_match(&entry.label)
                    || entry.location.as_deref().map_or(false, |l| pattern.is_match(l))
                    || entry
                        .property_type
                        .as_deref()
                        .map_or(false, |t| pattern.is_match(t))
            })
            .collect())
    }

    pub async fn top_picks(&self) -> CatalogResult<Vec<CatalogEntry>> {
        let filter = ListFilter {
            top_picks_only: true,
            limit: Some(TOP_PICKS_LIMIT),
            ..ListFilter::default()
        };
        Ok(self.store.list(&filter).await?)
    }

    /// Sitemap URLs for the index pages and every publicly listed entry.
    pub async fn sitemap_entries(&self) -> CatalogResult<Vec<SitemapEntry>> {
        let entries = self.store.list(&ListFilter::visible()).await?;
        let latest = entries.iter().map(|entry| entry.updated_at).max();
        let mut urls = SitemapEntry::index_pages(latest);
        urls.extend(entries.iter().map(SitemapEntry::project));
        Ok(urls)
    }

    /// Distinct property types within a nature, sorted.
    pub async fn property_types(&self, nature: Option<&str>) -> CatalogResult<Vec<String>> {
        let nature = nature
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PROPERTY_NATURE);
        let filter = ListFilter {
            include_hidden: true,
            property_nature: Some(nature.to_string()),
            ..ListFilter::default()
        };
        let types: BTreeSet<String> = self
            .store
            .list(&filter)
            .await?
            .into_iter()
            .filter_map(|entry| entry.property_type)
            .filter(|t| !t.trim().is_empty())
            .collect();
        Ok(types.into_iter().collect())
    }

    async fn require(&self, id: &EntryId) -> CatalogResult<CatalogEntry> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    async fn emit(&self, event: CatalogEvent) {
        for hook in &self.hooks {
            if let Err(error) = hook.on_event(&event).await {
                tracing::warn!(%error, "catalog event hook failed");
            }
        }
    }
}
