// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! In-memory storage adapter
//!
//! A thread-safe `HashMap` guarded by a `Mutex`, in the same spirit as the
//! teacher's `JwtIssuer(Arc<Mutex<JwtTokenMap>>)` wrapper. Expiry is
//! enforced lazily on every read/scan, with a background sweep task that
//! periodically drops dead entries so long-running processes don't
//! accumulate them between reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::debug;

use super::{Key, StorageAdapter, StorageAdapterExt, StorageResult, TtlSecs};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// An in-memory [`StorageAdapter`], suitable for tests and single-process
/// deployments without external dependencies.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawns a background task that sweeps expired entries every
    /// `interval`. Returns a handle the caller can abort on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = now_secs();
                let mut map = inner.lock().unwrap();
                let before = map.len();
                map.retain(|_, entry| !entry.is_expired(now));
                let swept = before - map.len();
                if swept > 0 {
                    debug!("memory storage sweeper evicted {swept} expired entries");
                }
            }
        })
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let now = now_secs();
        let map = self.inner.lock().unwrap();
        match map.get(&key.joined()) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set_raw(&self, key: &Key, value: Vec<u8>, ttl: Option<TtlSecs>) -> StorageResult<()> {
        let expires_at = ttl.map(|secs| now_secs() + secs);
        let mut map = self.inner.lock().unwrap();
        map.insert(key.joined(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &Key) -> StorageResult<()> {
        let mut map = self.inner.lock().unwrap();
        map.remove(&key.joined());
        Ok(())
    }

    async fn take_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let now = now_secs();
        let mut map = self.inner.lock().unwrap();
        match map.remove(&key.joined()) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    async fn scan_raw(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        let now = now_secs();
        let map = self.inner.lock().unwrap();
        let prefix_joined = prefix.joined();
        let mut out = Vec::new();
        for (joined_key, entry) in map.iter() {
            if entry.is_expired(now) {
                continue;
            }
            if key_str_starts_with(joined_key, &prefix_joined) {
                let segments: Vec<String> =
                    joined_key.split(super::KEY_SEPARATOR).map(String::from).collect();
                out.push((Key::from(segments), entry.value.clone()));
            }
        }
        Ok(out)
    }
}

/// A joined key begins with a joined prefix only on a segment boundary: the
/// byte immediately after the prefix must either be the separator or the
/// end of the string, never a fragment of the next segment's content.
fn key_str_starts_with(joined_key: &str, joined_prefix: &str) -> bool {
    if joined_prefix.is_empty() {
        return true;
    }
    if !joined_key.starts_with(joined_prefix) {
        return false;
    }
    joined_key.len() == joined_prefix.len()
        || joined_key[joined_prefix.len()..].starts_with(super::KEY_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn set_get_round_trip() {
        let storage = MemoryStorage::new();
        let key = Key::of(&["oauth", "code", "abc"]);
        storage.set(&key, &"hello".to_string(), None).await.unwrap();
        let got: Option<String> = storage.get(&key).await.unwrap();
        assert_eq!(got.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let storage = MemoryStorage::new();
        let key = Key::of(&["oauth", "code", "abc"]);
        storage.set_raw(&key, b"x".to_vec(), Some(0)).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(1100)).await;
        assert!(storage.get_raw(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scan_respects_prefix_and_skips_expired() {
        let storage = MemoryStorage::new();
        storage
            .set_raw(&Key::of(&["oauth", "refresh", "sub1", "r1"]), b"a".to_vec(), None)
            .await
            .unwrap();
        storage
            .set_raw(&Key::of(&["oauth", "refresh", "sub1", "r2"]), b"b".to_vec(), None)
            .await
            .unwrap();
        storage
            .set_raw(&Key::of(&["oauth", "refresh", "sub2", "r3"]), b"c".to_vec(), None)
            .await
            .unwrap();
        storage
            .set_raw(&Key::of(&["oauth", "refresh", "sub1", "rexp"]), b"d".to_vec(), Some(0))
            .await
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(1100)).await;

        let results = storage.scan_raw(&Key::of(&["oauth", "refresh", "sub1"])).await.unwrap();
        assert_eq!(results.len(), 2);
        for (key, _) in &results {
            assert!(key.starts_with(&Key::of(&["oauth", "refresh", "sub1"])));
        }
    }

    #[tokio::test]
    async fn take_removes_on_success() {
        let storage = MemoryStorage::new();
        let key = Key::of(&["oauth", "code", "single-use"]);
        storage.set(&key, &42u32, None).await.unwrap();
        let first: Option<u32> = storage.take(&key).await.unwrap();
        let second: Option<u32> = storage.take(&key).await.unwrap();
        assert_eq!(first, Some(42));
        assert_eq!(second, None);
    }
}
