// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Embedded SQL storage adapter (SQLite via `rusqlite` + `r2d2`)
//!
//! Table shape: `(key TEXT PRIMARY KEY, value TEXT, expiry INTEGER)`, per
//! §4.1. `expiry` is a Unix timestamp in seconds, or `NULL` for keys with
//! no TTL. Reads filter `expiry IS NULL OR expiry > strftime('%s','now')`
//! so expired rows never surface without a separate sweep pass.

#![cfg(feature = "storage-sqlite")]

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use super::{Key, StorageAdapter, StorageAdapterExt, StorageError, StorageResult, TtlSecs};

pub struct SqliteStorage {
    pool: Pool<SqliteConnectionManager>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl SqliteStorage {
    pub fn open(path: &str) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager).map_err(|e| StorageError::Backend(e.to_string()))?;
        let storage = SqliteStorage { pool };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let storage = SqliteStorage { pool };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expiry INTEGER
            )",
            [],
        )
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn get_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let joined = key.joined();
        let now = now_secs();
        let result: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1 AND (expiry IS NULL OR expiry > ?2)",
                rusqlite::params![joined, now],
                |row| row.get(0),
            )
            .ok();
        Ok(result)
    }

    async fn set_raw(&self, key: &Key, value: Vec<u8>, ttl: Option<TtlSecs>) -> StorageResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let expiry = ttl.map(|secs| now_secs() + secs as i64);
        conn.execute(
            "INSERT INTO kv (key, value, expiry) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expiry = excluded.expiry",
            rusqlite::params![key.joined(), value, expiry],
        )
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &Key) -> StorageResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key.joined()])
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn take_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let joined = key.joined();
        let now = now_secs();
        // SQLite's DELETE ... RETURNING (3.35+) makes delete-on-read atomic,
        // honoring the "should use it when the backend can" guidance of §5.
        let result: Option<Vec<u8>> = conn
            .query_row(
                "DELETE FROM kv WHERE key = ?1 AND (expiry IS NULL OR expiry > ?2) RETURNING value",
                rusqlite::params![joined, now],
                |row| row.get(0),
            )
            .ok();
        Ok(result)
    }

    async fn scan_raw(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let now = now_secs();
        let joined_prefix = prefix.joined();
        // Matches keys equal to the prefix or beginning with prefix + separator,
        // so a prefix never matches a sibling segment sharing a textual prefix.
        let like_pattern = format!("{}{}%", joined_prefix, super::KEY_SEPARATOR);
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM kv
                 WHERE (key = ?1 OR key LIKE ?2) AND (expiry IS NULL OR expiry > ?3)",
            )
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![joined_prefix, like_pattern, now], |row| {
                let key_str: String = row.get(0)?;
                let value: Vec<u8> = row.get(1)?;
                Ok((key_str, value))
            })
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (key_str, value) = row.map_err(|e| StorageError::Backend(e.to_string()))?;
            let segments: Vec<String> = key_str.split(super::KEY_SEPARATOR).map(String::from).collect();
            out.push((Key::from(segments), value));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let key = Key::of(&["oauth", "code", "abc"]);
        storage.set(&key, &"payload".to_string(), None).await.unwrap();
        let got: Option<String> = storage.get(&key).await.unwrap();
        assert_eq!(got.as_deref(), Some("payload"));
        storage.remove(&key).await.unwrap();
        let got: Option<String> = storage.get(&key).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn take_is_atomic_delete_on_read() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let key = Key::of(&["oauth", "code", "single-use"]);
        storage.set(&key, &1u32, None).await.unwrap();
        let first: Option<u32> = storage.take(&key).await.unwrap();
        let second: Option<u32> = storage.take(&key).await.unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn prefix_scan_is_segment_bounded() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .set(&Key::of(&["oauth", "refresh", "sub1", "r1"]), &1u32, None)
            .await
            .unwrap();
        storage
            .set(&Key::of(&["oauth", "refreshother", "r2"]), &2u32, None)
            .await
            .unwrap();
        let results = storage.scan_raw(&Key::of(&["oauth", "refresh"])).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
