// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Storage Adapter
//!
//! A hierarchical, TTL-aware key-value interface that every flow and every
//! credential in the issuer uses. Keys are sequences of string segments;
//! adapters must preserve prefix-scan semantics so that, for example,
//! `scan(["oauth", "refresh", subject_id])` yields every refresh token
//! belonging to a subject regardless of backend.
//!
//! Grounded on the teacher's `JwtIssuer`/`JwtTokenMap` pair
//! (`Arc<Mutex<...>>` wrapper implementing a trait), generalized from a
//! single in-memory map to a pluggable backend behind an `async_trait`.

pub mod dynamodb;
pub mod memory;
pub mod redis_backend;
pub mod sqlite;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// The control character used to join key segments.
///
/// A non-printable ASCII control character (Start of Heading) is vanishingly
/// unlikely to appear in legitimate segment content (client IDs, emails,
/// UUIDs, authorization codes), so joining segments with it and splitting on
/// it is unambiguous in the common case. Per §3.1, a segment that does
/// contain the separator has it silently stripped on write rather than
/// rejected, so a malicious segment can never smuggle extra path components
/// into the joined key.
pub const KEY_SEPARATOR: char = '\u{1}';

/// A hierarchical storage key: an ordered sequence of string segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Key(Vec<String>);

impl Key {
    pub fn new() -> Self {
        Key(Vec::new())
    }

    pub fn of(segments: &[&str]) -> Self {
        let mut key = Key::new();
        for s in segments {
            key.push_mut(s);
        }
        key
    }

    /// Appends a segment, stripping any embedded key separator.
    pub fn push(mut self, segment: impl AsRef<str>) -> Self {
        self.push_mut(segment);
        self
    }

    pub fn push_mut(&mut self, segment: impl AsRef<str>) {
        let cleaned: String = segment
            .as_ref()
            .chars()
            .filter(|c| *c != KEY_SEPARATOR)
            .collect();
        self.0.push(cleaned);
    }

    /// Joins segments with [`KEY_SEPARATOR`] into the adapter-facing string key.
    pub fn joined(&self) -> String {
        self.0.join(&KEY_SEPARATOR.to_string())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self`'s joined form begins with `prefix`'s joined form,
    /// on a segment boundary (never a partial-segment match).
    pub fn starts_with(&self, prefix: &Key) -> bool {
        if prefix.0.len() > self.0.len() {
            return false;
        }
        self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl From<Vec<String>> for Key {
    fn from(segments: Vec<String>) -> Self {
        Key(segments)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend I/O error: {0}")]
    Backend(String),

    #[error("value failed to (de)serialize: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("this backend cannot scan by prefix shorter than its partition key")]
    PrefixScanUnsupported,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A TTL, expressed in seconds relative to the time of the `set` call.
pub type TtlSecs = u64;

/// The hierarchical, TTL-aware key-value contract every issuer subsystem
/// storage adapter implements.
///
/// Implementations must be safe under concurrent callers within one
/// process. Cross-key atomicity is never required: the issuer's protocol
/// design (reuse-interval read-repair, best-effort single-use codes)
/// tolerates races at the storage layer, per §5.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Raw get by joined key. Returns `Ok(None)` for absent or expired keys.
    async fn get_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>>;

    /// Raw set with an optional TTL in seconds.
    async fn set_raw(&self, key: &Key, value: Vec<u8>, ttl: Option<TtlSecs>) -> StorageResult<()>;

    /// Removes a key; no error if absent.
    async fn remove(&self, key: &Key) -> StorageResult<()>;

    /// Removes a key and returns its prior value in one step, when the
    /// backend can do so atomically (SQL `DELETE ... RETURNING`, Redis
    /// `GETDEL`). Adapters that cannot offer atomic delete-on-read fall back
    /// to get-then-remove and document the race per §5.
    async fn take_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let value = self.get_raw(key).await?;
        if value.is_some() {
            self.remove(key).await?;
        }
        Ok(value)
    }

    /// Lists every (key, raw value) pair whose joined key begins with
    /// `prefix`'s joined key. Expired entries must never be yielded.
    async fn scan_raw(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>>;

    /// Whether this backend can honor [`StorageAdapter::scan_raw`] for
    /// arbitrary prefixes. The DynamoDB adapter returns `false` for this
    /// unless its partition-key width matches the queried prefix; callers
    /// that require prefix scanning should check this at construction time
    /// rather than discovering it mid-flow.
    fn supports_prefix_scan(&self) -> bool {
        true
    }
}

/// Typed convenience methods layered over [`StorageAdapter`]'s raw
/// byte-oriented methods.
///
/// These are generic over the (de)serialized value type, which would make
/// `StorageAdapter` itself dyn-incompatible if declared there directly.
/// Pulling them into a separate blanket-implemented trait keeps
/// `dyn StorageAdapter` usable while preserving the same call syntax
/// (`storage.get(...)`, `storage.set(...)`, ...) at every call site.
#[async_trait]
pub trait StorageAdapterExt: StorageAdapter {
    async fn get<T: DeserializeOwned + Send>(&self, key: &Key) -> StorageResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(
        &self,
        key: &Key,
        value: &T,
        ttl: Option<TtlSecs>,
    ) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set_raw(key, bytes, ttl).await
    }

    async fn take<T: DeserializeOwned + Send>(&self, key: &Key) -> StorageResult<Option<T>> {
        match self.take_raw(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn scan<T: DeserializeOwned + Send>(&self, prefix: &Key) -> StorageResult<Vec<(Key, T)>> {
        let raw = self.scan_raw(prefix).await?;
        raw.into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_slice(&v)?)))
            .collect()
    }
}

impl<T: StorageAdapter + ?Sized> StorageAdapterExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strips_separator_from_segments() {
        let k = Key::new().push(format!("evil{}injected", KEY_SEPARATOR));
        assert_eq!(k.segments(), &["evilinjected"]);
    }

    #[test]
    fn starts_with_is_segment_bounded() {
        let a = Key::of(&["oauth", "refresh", "abc"]);
        let prefix = Key::of(&["oauth", "refresh"]);
        let not_prefix = Key::of(&["oauth", "ref"]);
        assert!(a.starts_with(&prefix));
        assert!(!a.starts_with(&not_prefix));
    }

    #[test]
    fn joined_round_trips_through_separator() {
        let k = Key::of(&["oauth", "code", "XYZ"]);
        assert_eq!(k.joined(), format!("oauth{0}code{0}XYZ", KEY_SEPARATOR));
    }
}
