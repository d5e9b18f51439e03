//! SQLite lot store implementation

use async_trait::async_trait;
use everylot_domain::{
    FieldValue, Lot, LotStore, LotWriter, Platform, SEEDED_MARKER, StoreError, UNPOSTED_MARKER,
    marker_from_column,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::path::Path;

const LOTS_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS lots (
        id TEXT PRIMARY KEY,
        address TEXT,
        lat REAL,
        lon REAL,
        posted_twitter TEXT DEFAULT '0',
        posted_bluesky TEXT DEFAULT '0'
    )
"#;

/// SQLite-backed lot store over the `lots` table
pub struct SqliteLotStore {
    pool: SqlitePool,
}

impl SqliteLotStore {
    /// Open an existing database; a missing file or missing `lots` table is an error
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if !db_path.is_file() {
            return Err(StoreError::Open(format!(
                "database not found: {}",
                db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(format!("{}: {}", db_path.display(), e)))?;

        let store = Self { pool };
        store.require_lots_table().await?;

        Ok(store)
    }

    /// Create the database and `lots` table if needed (used by ingestion)
    pub async fn create(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(format!("{}: {}", db_path.display(), e)))?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    /// Drop and recreate the `lots` table
    pub async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query("DROP TABLE IF EXISTS lots")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        self.ensure_schema().await
    }

    /// Total number of lots
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lots")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count.0)
    }

    /// Number of lots posted (or seeded) for a platform
    pub async fn count_posted(&self, platform: Platform) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM lots WHERE {}",
            posted_clause(platform)
        );
        let count: (i64,) = sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count.0)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(LOTS_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(())
    }

    async fn require_lots_table(&self) -> Result<(), StoreError> {
        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'lots'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Open(e.to_string()))?;

        if tables.0 == 0 {
            return Err(StoreError::Open("database has no lots table".to_string()));
        }

        Ok(())
    }

    async fn fetch_lot(&self, sql: &str, binds: &[&str]) -> Result<Option<Lot>, StoreError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(lot_from_row).transpose()
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// NULL markers count as unposted
fn unposted_clause(platform: Platform) -> String {
    format!(
        "COALESCE({}, '{}') = '{}'",
        platform.marker_column(),
        UNPOSTED_MARKER,
        UNPOSTED_MARKER
    )
}

fn posted_clause(platform: Platform) -> String {
    format!(
        "COALESCE({}, '{}') != '{}'",
        platform.marker_column(),
        UNPOSTED_MARKER,
        UNPOSTED_MARKER
    )
}

fn decode_column(row: &SqliteRow, index: usize) -> Result<FieldValue, StoreError> {
    let raw = row.try_get_raw(index).map_err(db_error)?;
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" => FieldValue::Integer(row.try_get::<i64, _>(index).map_err(db_error)?),
        "REAL" => FieldValue::Real(row.try_get::<f64, _>(index).map_err(db_error)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(index).map_err(db_error)?;
            FieldValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => FieldValue::Text(row.try_get::<String, _>(index).map_err(db_error)?),
    };

    Ok(value)
}

/// Read a row with whatever columns the table has; unknown columns land in `extra`
fn lot_from_row(row: &SqliteRow) -> Result<Lot, StoreError> {
    let mut columns = BTreeMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        columns.insert(column.name().to_string(), decode_column(row, index)?);
    }

    let text = |value: Option<FieldValue>| value.map(|v| v.to_string()).unwrap_or_default();
    let real = |value: Option<FieldValue>| value.and_then(|v| v.as_f64()).unwrap_or(0.0);

    let mut lot = Lot::new(
        text(columns.remove("id")),
        text(columns.remove("address")),
        real(columns.remove("lat")),
        real(columns.remove("lon")),
    );

    for platform in Platform::PRIORITY {
        let marker = match columns.remove(platform.marker_column()) {
            None | Some(FieldValue::Null) => None,
            Some(value) => Some(value.to_string()),
        };
        if let Some(post_id) = marker_from_column(marker.as_deref()) {
            lot.posted.insert(platform, post_id);
        }
    }

    lot.extra = columns;
    Ok(lot)
}

#[async_trait]
impl LotStore for SqliteLotStore {
    async fn get(&self, id: &str) -> Result<Option<Lot>, StoreError> {
        self.fetch_lot("SELECT * FROM lots WHERE id = ?", &[id])
            .await
    }

    async fn get_last_posted(&self, platform: Platform) -> Result<Option<Lot>, StoreError> {
        let sql = format!(
            "SELECT * FROM lots WHERE {} ORDER BY id DESC LIMIT 1",
            posted_clause(platform)
        );
        self.fetch_lot(&sql, &[]).await
    }

    async fn get_next_unposted_after(
        &self,
        after: Option<&str>,
        platform: Platform,
    ) -> Result<Option<Lot>, StoreError> {
        match after {
            Some(after) => {
                let sql = format!(
                    "SELECT * FROM lots WHERE id > ? AND {} ORDER BY id ASC LIMIT 1",
                    unposted_clause(platform)
                );
                self.fetch_lot(&sql, &[after]).await
            }
            None => {
                let sql = format!(
                    "SELECT * FROM lots WHERE {} ORDER BY id ASC LIMIT 1",
                    unposted_clause(platform)
                );
                self.fetch_lot(&sql, &[]).await
            }
        }
    }

    async fn mark_posted(
        &self,
        id: &str,
        platform: Platform,
        post_id: &str,
    ) -> Result<(), StoreError> {
        if post_id.trim().is_empty() || post_id == UNPOSTED_MARKER {
            return Err(StoreError::InvalidMarker(post_id.to_string()));
        }

        let sql = format!(
            "UPDATE lots SET {} = ? WHERE id = ? AND {}",
            platform.marker_column(),
            unposted_clause(platform)
        );
        let result = sqlx::query(&sql)
            .bind(post_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get(id).await? {
            None => Err(StoreError::NotFound(id.to_string())),
            Some(_) => Err(StoreError::AlreadyPosted {
                id: id.to_string(),
                platform,
            }),
        }
    }
}

#[async_trait]
impl LotWriter for SqliteLotStore {
    async fn insert_if_absent(&self, lots: &[Lot]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut inserted = 0;

        for lot in lots {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO lots (id, address, lat, lon, posted_twitter, posted_bluesky)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&lot.id)
            .bind(&lot.address)
            .bind(lot.lat)
            .bind(lot.lon)
            .bind(lot.marker(Platform::Twitter))
            .bind(lot.marker(Platform::Bluesky))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(inserted)
    }

    async fn seed_posted_through(
        &self,
        pin: &str,
        platform: Platform,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE lots SET {} = ? WHERE id <= ? AND {}",
            platform.marker_column(),
            unposted_clause(platform)
        );
        let result = sqlx::query(&sql)
            .bind(SEEDED_MARKER)
            .bind(pin)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn seeded_store() -> SqliteLotStore {
        let store = SqliteLotStore::in_memory().await.unwrap();
        store
            .insert_if_absent(&[
                Lot::new("A", "1 First St", 42.1, -73.1),
                Lot::new("B", "2 Second St", 42.2, -73.2),
                Lot::new("C", "3 Third St", 42.3, -73.3),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = SqliteLotStore::in_memory().await.unwrap();

        assert!(store.get("A").await.unwrap().is_none());
        assert!(
            store
                .get_last_posted(Platform::Bluesky)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get_next_unposted_after(None, Platform::Bluesky)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_traversal_follows_id_order() {
        let store = seeded_store().await;

        let first = store
            .get_next_unposted_after(None, Platform::Bluesky)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, "A");
        assert_eq!(first.address, "1 First St");
        assert!(first.posted.is_empty());

        let next = store
            .get_next_unposted_after(Some("A"), Platform::Bluesky)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, "B");

        assert!(
            store
                .get_next_unposted_after(Some("C"), Platform::Bluesky)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_mark_posted_advances_one_platform_only() {
        let store = seeded_store().await;

        store
            .mark_posted("B", Platform::Bluesky, "at://did:plc:abc/app.bsky.feed.post/1")
            .await
            .unwrap();

        let last = store
            .get_last_posted(Platform::Bluesky)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.id, "B");
        assert_eq!(
            last.posted_id(Platform::Bluesky),
            Some("at://did:plc:abc/app.bsky.feed.post/1")
        );
        assert!(!last.is_posted(Platform::Twitter));

        assert!(
            store
                .get_last_posted(Platform::Twitter)
                .await
                .unwrap()
                .is_none()
        );
        let next = store
            .get_next_unposted_after(Some("A"), Platform::Bluesky)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, "C");
        assert_eq!(store.count_posted(Platform::Bluesky).await.unwrap(), 1);
        assert_eq!(store.count_posted(Platform::Twitter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_posted_is_conditional() {
        let store = seeded_store().await;

        store
            .mark_posted("A", Platform::Twitter, "1700000000000000000")
            .await
            .unwrap();

        let again = store
            .mark_posted("A", Platform::Twitter, "1700000000000000001")
            .await;
        assert!(matches!(again, Err(StoreError::AlreadyPosted { .. })));
        assert_eq!(
            store.get("A").await.unwrap().unwrap().posted_id(Platform::Twitter),
            Some("1700000000000000000")
        );

        let missing = store.mark_posted("Z", Platform::Twitter, "1").await;
        assert!(matches!(missing, Err(StoreError::NotFound(id)) if id == "Z"));

        for bad in ["", "0"] {
            let invalid = store.mark_posted("B", Platform::Twitter, bad).await;
            assert!(matches!(invalid, Err(StoreError::InvalidMarker(_))));
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing_rows() {
        let store = seeded_store().await;
        store
            .mark_posted("A", Platform::Bluesky, "post-a")
            .await
            .unwrap();

        let inserted = store
            .insert_if_absent(&[
                Lot::new("A", "changed", 0.0, 0.0),
                Lot::new("D", "4 Fourth St", 42.4, -73.4),
            ])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        let a = store.get("A").await.unwrap().unwrap();
        assert_eq!(a.address, "1 First St");
        assert_eq!(a.posted_id(Platform::Bluesky), Some("post-a"));
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_seed_posted_through() {
        let store = seeded_store().await;
        store
            .mark_posted("A", Platform::Bluesky, "post-a")
            .await
            .unwrap();

        let seeded = store
            .seed_posted_through("B", Platform::Bluesky)
            .await
            .unwrap();

        assert_eq!(seeded, 1);
        assert_eq!(
            store.get("A").await.unwrap().unwrap().posted_id(Platform::Bluesky),
            Some("post-a")
        );
        assert_eq!(
            store.get("B").await.unwrap().unwrap().posted_id(Platform::Bluesky),
            Some(SEEDED_MARKER)
        );
        let next = store
            .get_next_unposted_after(Some("B"), Platform::Bluesky)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, "C");
    }

    #[tokio::test]
    async fn test_null_columns_and_extra_fields() {
        let store = SqliteLotStore::in_memory().await.unwrap();
        sqlx::query("ALTER TABLE lots ADD COLUMN floors INTEGER")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("ALTER TABLE lots ADD COLUMN ward TEXT")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO lots (id, address, lat, lon, posted_twitter, posted_bluesky, floors, ward) \
             VALUES ('X', NULL, NULL, NULL, NULL, NULL, 9, NULL)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let lot = store.get("X").await.unwrap().unwrap();

        assert_eq!(lot.address, "");
        assert_eq!((lot.lat, lot.lon), (0.0, 0.0));
        assert!(lot.posted.is_empty());
        assert_eq!(lot.extra.get("floors"), Some(&FieldValue::Integer(9)));
        assert_eq!(lot.extra.get("ward"), Some(&FieldValue::Null));

        let next = store
            .get_next_unposted_after(None, Platform::Twitter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, "X");
        store
            .mark_posted("X", Platform::Twitter, "tw-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_empties_table() {
        let store = seeded_store().await;
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_requires_existing_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.db");

        let result = SqliteLotStore::open(&path).await;

        assert!(matches!(result, Err(StoreError::Open(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_open_requires_lots_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::write(&path, b"").unwrap();

        let result = SqliteLotStore::open(&path).await;

        assert!(matches!(result, Err(StoreError::Open(_))));
    }

    #[tokio::test]
    async fn test_create_then_open_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("lots.db");

        {
            let store = SqliteLotStore::create(&path).await.unwrap();
            store
                .insert_if_absent(&[Lot::new("A", "1 First St", 42.1, -73.1)])
                .await
                .unwrap();
            store.mark_posted("A", Platform::Bluesky, "p1").await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteLotStore::open(&path).await.unwrap();
        let lot = store.get("A").await.unwrap().unwrap();
        assert_eq!(lot.posted_id(Platform::Bluesky), Some("p1"));
    }
}
