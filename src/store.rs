use crate::entry::{CatalogEntry, EntryId, ListFilter};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persistence capability the catalog depends on.
///
/// `insert` and `replace` must reject a slug held by any other entry; the
/// allocator relies on that rejection, not on `slug_taken`, for uniqueness.
/// `replace` writes only while the stored revision still equals
/// `expected_revision`, otherwise it fails with `Stale`.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn slug_taken(&self, slug: &str, excluding: Option<&EntryId>) -> StoreResult<bool>;
    async fn insert(&self, entry: &CatalogEntry) -> StoreResult<()>;
    async fn replace(&self, entry: &CatalogEntry, expected_revision: i64) -> StoreResult<()>;
    async fn get(&self, id: &EntryId) -> StoreResult<Option<CatalogEntry>>;
    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<CatalogEntry>>;
    async fn delete(&self, id: &EntryId) -> StoreResult<bool>;
    /// Newest first.
    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<CatalogEntry>>;
}

#[derive(Default)]
struct Collection {
    entries: HashMap<EntryId, CatalogEntry>,
    slugs: HashMap<String, EntryId>,
}

impl Collection {
    fn holder(&self, slug: &str) -> Option<&EntryId> {
        self.slugs.get(slug)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    inner: Arc<Mutex<Collection>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn slug_taken(&self, slug: &str, excluding: Option<&EntryId>) -> StoreResult<bool> {
        let collection = self.inner.lock().await;
        Ok(match collection.holder(slug) {
            Some(holder) => Some(holder) != excluding,
            None => false,
        })
    }

    async fn insert(&self, entry: &CatalogEntry) -> StoreResult<()> {
        let mut collection = self.inner.lock().await;
        if collection.holder(&entry.slug).is_some() {
            return Err(StoreError::SlugTaken(entry.slug.clone()));
        }
        collection.slugs.insert(entry.slug.clone(), entry.id.clone());
        collection.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn replace(&self, entry: &CatalogEntry, expected_revision: i64) -> StoreResult<()> {
        let mut collection = self.inner.lock().await;
        let previous_slug = match collection.entries.get(&entry.id) {
            Some(current) if current.revision != expected_revision => {
                return Err(StoreError::Stale(entry.id.clone()))
            }
            Some(current) => current.slug.clone(),
            None => return Err(StoreError::NotFound(entry.id.clone())),
        };
        if let Some(holder) = collection.holder(&entry.slug) {
            if *holder != entry.id {
                return Err(StoreError::SlugTaken(entry.slug.clone()));
            }
        }

        collection.slugs.remove(&previous_slug);
        collection.slugs.insert(entry.slug.clone(), entry.id.clone());
        collection.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, id: &EntryId) -> StoreResult<Option<CatalogEntry>> {
        let collection = self.inner.lock().await;
        Ok(collection.entries.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<CatalogEntry>> {
        let collection = self.inner.lock().await;
        Ok(collection
            .holder(slug)
            .and_then(|id| collection.entries.get(id))
            .cloned())
    }

    async fn delete(&self, id: &EntryId) -> StoreResult<bool> {
        let mut collection = self.inner.lock().await;
        match collection.entries.remove(id) {
            Some(entry) => {
                collection.slugs.remove(&entry.slug);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<CatalogEntry>> {
        let collection = self.inner.lock().await;
        let mut entries: Vec<CatalogEntry> = collection
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.slug.cmp(&b.slug)));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NewEntry;

    fn entry(label: &str, slug: &str) -> CatalogEntry {
        let mut entry = CatalogEntry::from_new(NewEntry::labeled(label), slug.to_string());
        entry.slug = slug.to_string();
        entry
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_slug() {
        let store = InMemoryCatalogStore::new();
        store.insert(&entry("Gaur City", "gaur-city")).await.unwrap();

        let err = store.insert(&entry("Gaur  City", "gaur-city")).await.unwrap_err();
        assert_eq!(err, StoreError::SlugTaken("gaur-city".into()));
        assert_eq!(store.list(&ListFilter::everything()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slug_taken_ignores_excluded_owner() {
        let store = InMemoryCatalogStore::new();
        let first = entry("Gaur City", "gaur-city");
        store.insert(&first).await.unwrap();

        assert!(store.slug_taken("gaur-city", None).await.unwrap());
        assert!(!store.slug_taken("gaur-city", Some(&first.id)).await.unwrap());
        assert!(!store.slug_taken("gaur-city-2", None).await.unwrap());
    }

    #[tokio::test]
    async fn replace_moves_slug_index() {
        let store = InMemoryCatalogStore::new();
        let mut first = entry("Gaur City", "gaur-city");
        store.insert(&first).await.unwrap();

        first.slug = "gaur-city-phase-2".into();
        first.revision = 1;
        store.replace(&first, 0).await.unwrap();

        assert!(store.find_by_slug("gaur-city").await.unwrap().is_none());
        let found = store.find_by_slug("gaur-city-phase-2").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn replace_rejects_slug_of_other_entry() {
        let store = InMemoryCatalogStore::new();
        let first = entry("Gaur City", "gaur-city");
        let mut second = entry("Mahagun", "mahagun");
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        second.slug = "gaur-city".into();
        second.revision = 1;
        let err = store.replace(&second, 0).await.unwrap_err();
        assert_eq!(err, StoreError::SlugTaken("gaur-city".into()));
        assert_eq!(
            store.get(&second.id).await.unwrap().unwrap().slug,
            "mahagun"
        );
    }

    #[tokio::test]
    async fn replace_of_deleted_entry_is_not_found() {
        let store = InMemoryCatalogStore::new();
        let first = entry("Gaur City", "gaur-city");
        store.insert(&first).await.unwrap();
        assert!(store.delete(&first.id).await.unwrap());
        assert!(!store.delete(&first.id).await.unwrap());

        let err = store.replace(&first, 0).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound(first.id.clone()));
        assert!(!store.slug_taken("gaur-city", None).await.unwrap());
    }

    #[tokio::test]
    async fn replace_from_an_old_read_is_stale() {
        let store = InMemoryCatalogStore::new();
        let first = entry("Gaur City", "gaur-city");
        store.insert(&first).await.unwrap();

        let mut hidden = first.clone();
        hidden.visible = false;
        hidden.revision = 1;
        store.replace(&hidden, 0).await.unwrap();

        let mut renamed = first.clone();
        renamed.label = "Gaur Yamuna City".into();
        renamed.slug = "gaur-yamuna-city".into();
        renamed.revision = 1;
        let err = store.replace(&renamed, 0).await.unwrap_err();
        assert_eq!(err, StoreError::Stale(first.id.clone()));

        let stored = store.get(&first.id).await.unwrap().unwrap();
        assert!(!stored.visible);
        assert_eq!(stored.slug, "gaur-city");
        assert_eq!(stored.revision, 1);
        assert!(!store.slug_taken("gaur-yamuna-city", None).await.unwrap());
    }
}
