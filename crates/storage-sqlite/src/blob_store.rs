//! SQLite implementation of the cache's [`BlobStore`] collaborator.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use marketgate_market_data::{BlobStore, StoreError};

use crate::db;
use crate::errors::Result;

/// String-keyed blobs in a single `blobs` table.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open(path.as_ref())?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_in_memory()?),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Blob store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare("SELECT key FROM blobs ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock_conn()
            .query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.lock_conn().execute(
            "INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        debug!("Blob store: wrote '{}' ({} bytes)", key, value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock_conn()
            .execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        self.read(key).map_err(StoreError::from)
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        self.write(key, value).map_err(StoreError::from)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.remove(key).map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone;
    use marketgate_market_data::{Cache, CacheConfig, CachePayload, Clock, ManualClock, Quote};
    use rust_decimal_macros::dec;

    #[test]
    fn test_set_get_delete() -> anyhow::Result<()> {
        let store = SqliteBlobStore::open_in_memory()?;
        assert_eq!(store.get("k")?, None);

        store.set("k", "v1")?;
        store.set("k", "v2")?;
        assert_eq!(store.get("k")?.as_deref(), Some("v2"));
        assert_eq!(store.keys()?, vec!["k".to_string()]);

        store.delete("k")?;
        store.delete("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn test_values_survive_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("cache.db");

        {
            let store = SqliteBlobStore::open(&path)?;
            store.set("marketDataCache", "[]")?;
        }

        let reopened = SqliteBlobStore::open(&path)?;
        assert_eq!(reopened.get("marketDataCache")?.as_deref(), Some("[]"));
        Ok(())
    }

    #[test]
    fn test_backs_the_market_data_cache() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cache.db");
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        ));
        let config = CacheConfig::default();

        let quote = Quote::new("AAPL", dec!(150.25), "YAHOO", clock.now());
        let cache = Cache::new(&config, clock.clone()).with_store(Arc::new(SqliteBlobStore::open(&path)?));
        cache.set("price_AAPL", CachePayload::Quote(quote.clone()), Duration::from_secs(300));
        cache.set("short", CachePayload::Quote(quote.clone()), Duration::from_secs(10));
        drop(cache);

        clock.advance(Duration::from_secs(60));
        let restored = Cache::new(&config, clock).with_store(Arc::new(SqliteBlobStore::open(&path)?));
        assert_eq!(restored.load(), 1);
        assert_eq!(restored.get("price_AAPL"), Some(CachePayload::Quote(quote)));
        Ok(())
    }
}
