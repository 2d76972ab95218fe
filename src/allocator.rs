use crate::entry::CatalogEntry;
use crate::error::{CatalogError, CatalogResult, StoreError};
use crate::slug::{self, DEFAULT_FALLBACK_PREFIX};
use crate::store::CatalogStore;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 2000;

/// Normalized source text and the root candidates are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugBase {
    /// Empty when the source had nothing usable in it.
    pub normalized: String,
    pub root: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The entry is new; no existing slug may match.
    Create,
    /// The entry exists; its own slug never counts as a collision. The write
    /// only lands while the stored copy is still at `expected_revision`.
    Update { expected_revision: i64 },
}

/// Finds a free slug and writes it together with the entry.
///
/// Holds no state of its own. The pre-check against the store only skips
/// candidates that are obviously taken; the store's write path is what rejects
/// duplicates, and a rejected write moves on to the next suffix.
#[derive(Debug, Clone)]
pub struct SlugAllocator {
    max_attempts: usize,
    fallback_prefix: String,
}

impl Default for SlugAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_FALLBACK_PREFIX)
    }
}

impl SlugAllocator {
    pub fn new(max_attempts: usize, fallback_prefix: &str) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            fallback_prefix: fallback_prefix.to_string(),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn base_for(&self, source: &str) -> SlugBase {
        let normalized = slug::normalize(source);
        let root = if normalized.is_empty() {
            let fallback = slug::fallback_base(&self.fallback_prefix);
            debug!(source, fallback = %fallback, "slug source normalizes to nothing; using fallback");
            fallback
        } else {
            normalized.clone()
        };
        SlugBase { normalized, root }
    }

    /// Writes `entry` under the first free candidate derived from `base`.
    /// Returns the entry as stored.
    pub async fn place(
        &self,
        store: &dyn CatalogStore,
        mut entry: CatalogEntry,
        base: &SlugBase,
        placement: Placement,
    ) -> CatalogResult<CatalogEntry> {
        let owner = match placement {
            Placement::Create => None,
            Placement::Update { .. } => Some(entry.id.clone()),
        };
        entry.slug_base = base.normalized.clone();

        for attempt in 1..=self.max_attempts {
            let candidate = slug::candidate(&base.root, attempt);
            if store.slug_taken(&candidate, owner.as_ref()).await? {
                debug!(candidate = %candidate, attempt, "slug candidate already in use");
                continue;
            }

            entry.slug = candidate;
            let written = match placement {
                Placement::Create => store.insert(&entry).await,
                Placement::Update { expected_revision } => {
                    store.replace(&entry, expected_revision).await
                }
            };

            match written {
                Ok(()) => {
                    info!(id = %entry.id, slug = %entry.slug, attempt, ?placement, "slug assigned");
                    return Ok(entry);
                }
                Err(StoreError::SlugTaken(slug)) => {
                    warn!(slug = %slug, attempt, "slug claimed by a concurrent write; trying next suffix");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(CatalogError::AllocationExhausted {
            base: base.root.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryPatch, ListFilter, NewEntry};
    use crate::store::testing::{FlakyStore, StaleCheckStore};
    use crate::store::InMemoryCatalogStore;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    async fn create(
        allocator: &SlugAllocator,
        store: &dyn CatalogStore,
        label: &str,
    ) -> CatalogResult<CatalogEntry> {
        let base = allocator.base_for(label);
        let entry = CatalogEntry::from_new(NewEntry::labeled(label), base.normalized.clone());
        allocator.place(store, entry, &base, Placement::Create).await
    }

    #[tokio::test]
    async fn same_label_gets_numbered_suffixes() {
        let allocator = SlugAllocator::default();
        let store = InMemoryCatalogStore::new();

        let first = create(&allocator, &store, "Greater Noida West").await.unwrap();
        let second = create(&allocator, &store, "Greater Noida West").await.unwrap();
        let third = create(&allocator, &store, "greater noida   west!").await.unwrap();

        assert_eq!(first.slug, "greater-noida-west");
        assert_eq!(second.slug, "greater-noida-west-2");
        assert_eq!(third.slug, "greater-noida-west-3");
        assert_eq!(third.slug_base, "greater-noida-west");
    }

    #[tokio::test]
    async fn empty_base_uses_fallback_root() {
        let allocator = SlugAllocator::new(10, "listing");
        let store = InMemoryCatalogStore::new();

        let entry = create(&allocator, &store, "***").await.unwrap();
        assert!(entry.slug.starts_with("listing-"));
        assert!(slug::is_normalized(&entry.slug));
        assert_eq!(entry.slug_base, "");
    }

    #[tokio::test]
    async fn rejected_write_moves_to_next_suffix() {
        let allocator = SlugAllocator::default();
        let store = StaleCheckStore::default();

        let first = create(&allocator, &store, "Greater Noida West").await.unwrap();
        let second = create(&allocator, &store, "Greater Noida West").await.unwrap();

        assert_eq!(first.slug, "greater-noida-west");
        assert_eq!(second.slug, "greater-noida-west-2");
        assert_eq!(store.rejected_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_creations_never_share_a_slug() {
        let allocator = Arc::new(SlugAllocator::default());
        let store = Arc::new(StaleCheckStore::default());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let allocator = Arc::clone(&allocator);
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                create(&allocator, store.as_ref(), "Sector 150 Noida").await
            }));
        }

        let mut slugs = BTreeSet::new();
        for handle in handles {
            let entry = handle.await.unwrap().unwrap();
            assert!(slugs.insert(entry.slug), "duplicate slug handed out");
        }

        let expected: BTreeSet<String> = (1..=20)
            .map(|n| slug::candidate("sector-150-noida", n))
            .collect();
        assert_eq!(slugs, expected);
        assert_eq!(
            store.inner.list(&ListFilter::everything()).await.unwrap().len(),
            20
        );
    }

    #[tokio::test]
    async fn update_may_keep_its_own_slug() {
        let allocator = SlugAllocator::default();
        let store = InMemoryCatalogStore::new();
        let entry = create(&allocator, &store, "DLF Phase 2").await.unwrap();

        let base = allocator.base_for("DLF Phase 2");
        let update = Placement::Update {
            expected_revision: entry.revision,
        };
        let placed = allocator
            .place(&store, entry.patched(&EntryPatch::default()), &base, update)
            .await
            .unwrap();
        assert_eq!(placed.slug, "dlf-phase-2");
        assert_eq!(placed.id, entry.id);
        assert_eq!(placed.revision, entry.revision + 1);
    }

    #[tokio::test]
    async fn update_skips_slugs_of_other_entries() {
        let allocator = SlugAllocator::default();
        let store = InMemoryCatalogStore::new();
        create(&allocator, &store, "DLF Phase 3").await.unwrap();
        let entry = create(&allocator, &store, "DLF Phase 2").await.unwrap();

        let base = allocator.base_for("DLF Phase 3");
        let update = Placement::Update {
            expected_revision: entry.revision,
        };
        let placed = allocator
            .place(&store, entry.patched(&EntryPatch::default()), &base, update)
            .await
            .unwrap();
        assert_eq!(placed.slug, "dlf-phase-3-2");
        assert!(store.find_by_slug("dlf-phase-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let allocator = SlugAllocator::new(3, DEFAULT_FALLBACK_PREFIX);
        let store = InMemoryCatalogStore::new();
        for _ in 0..3 {
            create(&allocator, &store, "Plot").await.unwrap();
        }

        let err = create(&allocator, &store, "Plot").await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::AllocationExhausted {
                base: "plot".into(),
                attempts: 3
            }
        );
        assert_eq!(store.list(&ListFilter::everything()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unreachable_store_writes_nothing() {
        let allocator = SlugAllocator::default();
        let store = FlakyStore::default();
        store.set_down(true);

        let err = create(&allocator, &store, "Jewar Airport Plots").await.unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        store.set_down(false);
        assert!(store.list(&ListFilter::everything()).await.unwrap().is_empty());
        let entry = create(&allocator, &store, "Jewar Airport Plots").await.unwrap();
        assert_eq!(entry.slug, "jewar-airport-plots");
    }

    #[tokio::test]
    async fn stale_update_is_not_written() {
        let allocator = SlugAllocator::default();
        let store = InMemoryCatalogStore::new();
        let entry = create(&allocator, &store, "DLF Phase 2").await.unwrap();

        let mut hidden = entry.patched(&EntryPatch::default());
        hidden.visible = false;
        store.replace(&hidden, entry.revision).await.unwrap();

        let base = allocator.base_for("DLF Phase 5");
        let update = Placement::Update {
            expected_revision: entry.revision,
        };
        let err = allocator
            .place(&store, entry.patched(&EntryPatch::default()), &base, update)
            .await
            .unwrap_err();
        assert_eq!(err, CatalogError::Stale(entry.id.clone()));
        assert!(!store.slug_taken("dlf-phase-5", None).await.unwrap());
        assert_eq!(store.get(&entry.id).await.unwrap().unwrap().slug, "dlf-phase-2");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn sequential_creates_count_up_from_the_base(
            label in "[A-Za-z][A-Za-z0-9 ]{0,20}",
            count in 1usize..12,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime should build");
            let slugs = runtime.block_on(async {
                let allocator = SlugAllocator::default();
                let store = InMemoryCatalogStore::new();
                let mut slugs = Vec::new();
                for _ in 0..count {
                    slugs.push(create(&allocator, &store, &label).await.unwrap().slug);
                }
                slugs
            });

            let base = slug::normalize(&label);
            let expected: Vec<String> = (1..=count).map(|n| slug::candidate(&base, n)).collect();
            prop_assert_eq!(slugs, expected);
        }
    }
}
