use crate::entry::EntryId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("slug '{0}' is already taken")]
    SlugTaken(String),
    #[error("no catalog entry with identity {0}")]
    NotFound(EntryId),
    #[error("catalog entry {0} changed since it was read")]
    Stale(EntryId),
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("could not allocate a unique slug for '{base}' after {attempts} attempts")]
    AllocationExhausted { base: String, attempts: usize },
    #[error("catalog store unavailable, retry the request: {0}")]
    StoreUnavailable(String),
    #[error("catalog entry {0} not found")]
    NotFound(EntryId),
    #[error("slug '{0}' is held by another entry")]
    SlugConflict(String),
    #[error("catalog entry {0} kept changing underneath the update, retry the request")]
    Stale(EntryId),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::StoreUnavailable(_) | CatalogError::Stale(_)
        )
    }
}

impl From<StoreError> for CatalogError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SlugTaken(slug) => CatalogError::SlugConflict(slug),
            StoreError::NotFound(id) => CatalogError::NotFound(id),
            StoreError::Stale(id) => CatalogError::Stale(id),
            StoreError::Unavailable(reason) => CatalogError::StoreUnavailable(reason),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
