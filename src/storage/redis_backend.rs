// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Redis storage adapter
//!
//! TTLs map directly onto `SET ... EX`/`EXPIREAT`; prefix scans use
//! `SCAN MATCH <prefix><sep>*` cursor iteration rather than `KEYS`, so a
//! large keyspace never blocks the server. Uses the teacher's pinned
//! `redis` crate and its async multiplexed connection.

#![cfg(feature = "storage-redis")]

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{Key, StorageAdapter, StorageError, StorageResult, TtlSecs};

pub struct RedisStorage {
    client: redis::Client,
}

impl RedisStorage {
    pub fn new(url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(RedisStorage { client })
    }

    async fn conn(&self) -> StorageResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl StorageAdapter for RedisStorage {
    async fn get_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn
            .get(key.joined())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn set_raw(&self, key: &Key, value: Vec<u8>, ttl: Option<TtlSecs>) -> StorageResult<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(secs) => {
                let _: () = conn
                    .set_ex(key.joined(), value, secs)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            None => {
                let _: () = conn
                    .set(key.joined(), value)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &Key) -> StorageResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(key.joined())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn take_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        // GETDEL (Redis 6.2+) keeps read-and-remove atomic, unlike the
        // get-then-remove fallback the default trait method uses.
        let value: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(key.joined())
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn scan_raw(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        let mut conn = self.conn().await?;
        let joined_prefix = prefix.joined();
        let pattern = format!("{}{}*", joined_prefix, super::KEY_SEPARATOR);

        let mut out = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            for raw_key in &batch {
                if let Some(value) = conn
                    .get::<_, Option<Vec<u8>>>(raw_key)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                {
                    let segments: Vec<String> =
                        raw_key.split(super::KEY_SEPARATOR).map(String::from).collect();
                    out.push((Key::from(segments), value));
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // Exact match on the prefix itself also qualifies, matching the
        // semantics of the other adapters' scan_raw.
        if let Some(exact) = self.get_raw(prefix).await? {
            out.push((prefix.clone(), exact));
        }

        Ok(out)
    }
}
