use crate::entry::{CatalogEntry, EntryId, ListFilter};
use crate::error::{StoreError, StoreResult};
use crate::store::CatalogStore;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS catalog_entries (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    slug TEXT NOT NULL CHECK (slug <> ''),
    slug_base TEXT NOT NULL,
    slug_override TEXT,
    location TEXT,
    property_type TEXT,
    property_nature TEXT NOT NULL,
    project_status TEXT,
    top_pick INTEGER NOT NULL DEFAULT 0,
    visible INTEGER NOT NULL DEFAULT 1,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS catalog_entries_slug ON catalog_entries (slug);
";

const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

const COLUMNS: &str = "id, label, slug, slug_base, slug_override, location, property_type, \
     property_nature, project_status, top_pick, visible, revision, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCatalogStore {
    pub fn open(path: &Path, pool_size: u32, busy_timeout: Duration) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn| conn.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(busy_timeout.max(MIN_CONNECT_TIMEOUT))
            .build(manager)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let conn = pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_error)?;
        add_revision_column(&conn).map_err(map_sqlite_error)?;
        tracing::debug!(path = %path.display(), pool_size, "opened sqlite catalog store");

        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            op(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

/// Files created before revisions were tracked lack the column.
fn add_revision_column(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(catalog_entries)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if !columns.iter().any(|name| name == "revision") {
        conn.execute_batch(
            "ALTER TABLE catalog_entries ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
        )?;
        tracing::info!("added revision column to catalog_entries");
    }
    Ok(())
}

fn map_sqlite_error(error: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn map_write_error(error: rusqlite::Error, slug: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return StoreError::SlugTaken(slug.to_string());
        }
    }
    map_sqlite_error(error)
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: EntryId::from(row.get::<_, String>(0)?),
        label: row.get(1)?,
        slug: row.get(2)?,
        slug_base: row.get(3)?,
        slug_override: row.get(4)?,
        location: row.get(5)?,
        property_type: row.get(6)?,
        property_nature: row.get(7)?,
        project_status: row.get(8)?,
        top_pick: row.get(9)?,
        visible: row.get(10)?,
        revision: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn slug_taken(&self, slug: &str, excluding: Option<&EntryId>) -> StoreResult<bool> {
        let slug = slug.to_string();
        let excluding = excluding.map(|id| id.as_str().to_string());
        self.with_conn(move |conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM catalog_entries WHERE slug = ?1",
                    params![slug],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sqlite_error)?;
            Ok(match found {
                Some(holder) => Some(holder) != excluding,
                None => false,
            })
        })
        .await
    }

    async fn insert(&self, entry: &CatalogEntry) -> StoreResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO catalog_entries ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    COLUMNS
                ),
                params![
                    entry.id.as_str(),
                    entry.label,
                    entry.slug,
                    entry.slug_base,
                    entry.slug_override,
                    entry.location,
                    entry.property_type,
                    entry.property_nature,
                    entry.project_status,
                    entry.top_pick,
                    entry.visible,
                    entry.revision,
                    entry.created_at,
                    entry.updated_at,
                ],
            )
            .map_err(|e| map_write_error(e, &entry.slug))?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, entry: &CatalogEntry, expected_revision: i64) -> StoreResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE catalog_entries SET label = ?2, slug = ?3, slug_base = ?4, \
                     slug_override = ?5, location = ?6, property_type = ?7, \
                     property_nature = ?8, project_status = ?9, top_pick = ?10, \
                     visible = ?11, revision = ?12, updated_at = ?13 \
                     WHERE id = ?1 AND revision = ?14",
                    params![
                        entry.id.as_str(),
                        entry.label,
                        entry.slug,
                        entry.slug_base,
                        entry.slug_override,
                        entry.location,
                        entry.property_type,
                        entry.property_nature,
                        entry.project_status,
                        entry.top_pick,
                        entry.visible,
                        entry.revision,
                        entry.updated_at,
                        expected_revision,
                    ],
                )
                .map_err(|e| map_write_error(e, &entry.slug))?;
            if changed > 0 {
                return Ok(());
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM catalog_entries WHERE id = ?1",
                    params![entry.id.as_str()],
                    |_| Ok(()),
                )
                .optional()
                .map_err(map_sqlite_error)?
                .is_some();
            if exists {
                Err(StoreError::Stale(entry.id.clone()))
            } else {
                Err(StoreError::NotFound(entry.id.clone()))
            }
        })
        .await
    }

    async fn get(&self, id: &EntryId) -> StoreResult<Option<CatalogEntry>> {
        let id = id.as_str().to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM catalog_entries WHERE id = ?1", COLUMNS),
                params![id],
                read_entry,
            )
            .optional()
            .map_err(map_sqlite_error)
        })
        .await
    }

    async fn find_by_slug(&self, slug: &str) -> StoreResult<Option<CatalogEntry>> {
        let slug = slug.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM catalog_entries WHERE slug = ?1", COLUMNS),
                params![slug],
                read_entry,
            )
            .optional()
            .map_err(map_sqlite_error)
        })
        .await
    }

    async fn delete(&self, id: &EntryId) -> StoreResult<bool> {
        let id = id.as_str().to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute("DELETE FROM catalog_entries WHERE id = ?1", params![id])
                .map_err(map_sqlite_error)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<CatalogEntry>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let limit = filter
                .limit
                .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM catalog_entries \
                     WHERE (?1 OR visible = 1) \
                       AND (NOT ?2 OR top_pick = 1) \
                       AND (?3 IS NULL OR property_nature = ?3) \
                     ORDER BY created_at DESC, slug ASC \
                     LIMIT ?4",
                    COLUMNS
                ))
                .map_err(map_sqlite_error)?;
            let entries = stmt
                .query_map(
                    params![
                        filter.include_hidden,
                        filter.top_picks_only,
                        filter.property_nature,
                        limit
                    ],
                    read_entry,
                )
                .map_err(map_sqlite_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_sqlite_error)?;
            Ok(entries)
        })
        .await
    }
}
