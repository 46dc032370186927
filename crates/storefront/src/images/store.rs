//! Image cache storage trait and `SQLite` implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Errors from the image store.
#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image store lock poisoned")]
    Poisoned,

    #[error("Image store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A cached image body with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub content_type: String,
    pub data: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

/// Key-value store for image bodies with TTL expiry and LRU eviction.
///
/// Calls block; async callers go through `spawn_blocking`. The current time
/// is passed in so expiry is decided by the caller's clock.
pub trait ImageStore: Send + Sync {
    /// Look up an image. Expired entries are deleted and reported as a miss;
    /// hits have their access time refreshed.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CachedImage>, ImageStoreError>;

    /// Insert or replace an image, expiring one TTL after `now`.
    fn put(
        &self,
        key: &str,
        content_type: &str,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), ImageStoreError>;

    /// Delete an entry. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, ImageStoreError>;

    /// Delete every entry expired at `now`. Returns how many went.
    fn clean_expired(&self, now: DateTime<Utc>) -> Result<usize, ImageStoreError>;

    /// Delete least recently accessed entries until at most `max_entries`
    /// remain. Returns how many went.
    fn clean_lru(&self, max_entries: usize) -> Result<usize, ImageStoreError>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize, ImageStoreError>;
}

/// Store used when caching is disabled. Always misses, discards writes.
pub struct NoopImageStore;

impl ImageStore for NoopImageStore {
    fn get(&self, _key: &str, _now: DateTime<Utc>) -> Result<Option<CachedImage>, ImageStoreError> {
        Ok(None) // Always miss
    }

    fn put(
        &self,
        _key: &str,
        _content_type: &str,
        _data: &[u8],
        _now: DateTime<Utc>,
    ) -> Result<(), ImageStoreError> {
        Ok(()) // Discard
    }

    fn remove(&self, _key: &str) -> Result<bool, ImageStoreError> {
        Ok(false)
    }

    fn clean_expired(&self, _now: DateTime<Utc>) -> Result<usize, ImageStoreError> {
        Ok(0)
    }

    fn clean_lru(&self, _max_entries: usize) -> Result<usize, ImageStoreError> {
        Ok(0)
    }

    fn count(&self) -> Result<usize, ImageStoreError> {
        Ok(0)
    }
}

/// `SQLite`-backed image store.
pub struct SqliteImageStore {
    conn: Mutex<Connection>,
    ttl_millis: i64,
}

/// Schema for the image cache.
const IMAGE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS image_cache (
    url TEXT PRIMARY KEY,
    content_type TEXT NOT NULL,
    data BLOB NOT NULL,
    expires_at INTEGER NOT NULL,
    stored_at INTEGER NOT NULL,
    accessed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_image_cache_expires ON image_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_image_cache_accessed ON image_cache(accessed_at);
";

impl SqliteImageStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, ImageStoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?, ttl)
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory(ttl: Duration) -> Result<Self, ImageStoreError> {
        Self::with_connection(Connection::open_in_memory()?, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self, ImageStoreError> {
        conn.execute_batch(IMAGE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_millis: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ImageStoreError> {
        self.conn.lock().map_err(|_| ImageStoreError::Poisoned)
    }
}

impl ImageStore for SqliteImageStore {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CachedImage>, ImageStoreError> {
        let conn = self.lock()?;
        let now_ms = now.timestamp_millis();

        let row = conn
            .query_row(
                "SELECT content_type, data, expires_at, stored_at FROM image_cache WHERE url = ?1",
                params![key],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Vec<u8>>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((content_type, data, expires_at, stored_at)) = row else {
            return Ok(None);
        };

        if expires_at <= now_ms {
            conn.execute("DELETE FROM image_cache WHERE url = ?1", params![key])?;
            return Ok(None);
        }

        conn.execute(
            "UPDATE image_cache SET accessed_at = ?2 WHERE url = ?1",
            params![key, now_ms],
        )?;

        Ok(Some(CachedImage {
            content_type,
            data,
            expires_at: from_millis(expires_at),
            stored_at: from_millis(stored_at),
            accessed_at: now,
        }))
    }

    fn put(
        &self,
        key: &str,
        content_type: &str,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), ImageStoreError> {
        let conn = self.lock()?;
        let now_ms = now.timestamp_millis();
        let expires_at = now_ms.saturating_add(self.ttl_millis);

        conn.execute(
            "INSERT INTO image_cache (url, content_type, data, expires_at, stored_at, accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(url) DO UPDATE SET
                content_type = excluded.content_type,
                data = excluded.data,
                expires_at = excluded.expires_at,
                stored_at = excluded.stored_at,
                accessed_at = excluded.accessed_at",
            params![key, content_type, data, expires_at, now_ms],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, ImageStoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM image_cache WHERE url = ?1", params![key])?;
        Ok(deleted > 0)
    }

    fn clean_expired(&self, now: DateTime<Utc>) -> Result<usize, ImageStoreError> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM image_cache WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?)
    }

    fn clean_lru(&self, max_entries: usize) -> Result<usize, ImageStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM image_cache", [], |r| r.get(0))?;
        let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);
        let excess = count.saturating_sub(keep);
        if excess <= 0 {
            return Ok(0);
        }

        let deleted = tx.execute(
            "DELETE FROM image_cache WHERE url IN (
                SELECT url FROM image_cache ORDER BY accessed_at ASC, rowid ASC LIMIT ?1
             )",
            params![excess],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn count(&self) -> Result<usize, ImageStoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM image_cache", [], |r| r.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> SqliteImageStore {
        SqliteImageStore::open_in_memory(TTL).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn test_put_then_get() {
        let s = store();
        s.put("a.jpg", "image/jpeg", b"jpeg-bytes", at(0)).unwrap();

        let hit = s.get("a.jpg", at(10)).unwrap().unwrap();
        assert_eq!(hit.content_type, "image/jpeg");
        assert_eq!(hit.data, b"jpeg-bytes");
        assert_eq!(hit.expires_at, at(60));
        assert_eq!(hit.accessed_at, at(10));
        assert!(s.get("missing.jpg", at(10)).unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_is_deleted_on_read() {
        let s = store();
        s.put("a.jpg", "image/jpeg", b"x", at(0)).unwrap();
        assert!(s.get("a.jpg", at(60)).unwrap().is_none());
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn test_put_replaces_and_renews_ttl() {
        let s = store();
        s.put("a.jpg", "image/jpeg", b"old", at(0)).unwrap();
        s.put("a.jpg", "image/png", b"new", at(50)).unwrap();

        let hit = s.get("a.jpg", at(100)).unwrap().unwrap();
        assert_eq!(hit.data, b"new");
        assert_eq!(hit.content_type, "image/png");
        assert_eq!(s.count().unwrap(), 1);
    }

    #[test]
    fn test_clean_expired() {
        let s = store();
        s.put("old", "image/jpeg", b"1", at(0)).unwrap();
        s.put("newer", "image/jpeg", b"2", at(30)).unwrap();
        assert_eq!(s.clean_expired(at(61)).unwrap(), 1);
        assert_eq!(s.count().unwrap(), 1);
        assert!(s.get("newer", at(61)).unwrap().is_some());
    }

    #[test]
    fn test_clean_lru_evicts_least_recently_accessed() {
        let s = store();
        s.put("a", "image/jpeg", b"a", at(1)).unwrap();
        s.put("b", "image/jpeg", b"b", at(2)).unwrap();
        s.put("c", "image/jpeg", b"c", at(3)).unwrap();

        // Touch "a" so "b" becomes the oldest.
        s.get("a", at(4)).unwrap();

        assert_eq!(s.clean_lru(2).unwrap(), 1);
        assert!(s.get("b", at(5)).unwrap().is_none());
        assert!(s.get("a", at(5)).unwrap().is_some());
        assert!(s.get("c", at(5)).unwrap().is_some());

        assert_eq!(s.clean_lru(5).unwrap(), 0);
        assert_eq!(s.clean_lru(0).unwrap(), 2);
    }

    #[test]
    fn test_remove() {
        let s = store();
        s.put("a", "image/jpeg", b"a", at(0)).unwrap();
        assert!(s.remove("a").unwrap());
        assert!(!s.remove("a").unwrap());
    }

    #[test]
    fn test_noop_store_always_misses() {
        let s = NoopImageStore;
        s.put("a", "image/jpeg", b"a", at(0)).unwrap();
        assert!(s.get("a", at(0)).unwrap().is_none());
        assert_eq!(s.count().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("myrmeco-img-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("cache.db");
        let s = SqliteImageStore::open(&path, TTL).unwrap();
        s.put("a", "image/jpeg", b"a", at(0)).unwrap();
        assert!(path.exists());
        drop(s);
        let _ = std::fs::remove_dir_all(dir);
    }
}
