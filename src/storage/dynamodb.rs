// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! DynamoDB storage adapter
//!
//! The first two key segments form the partition key (joined with
//! [`super::KEY_SEPARATOR`]); any remaining segments form the sort key.
//! This lets one table serve every subsystem (`oauth#code`, `oauth#refresh`,
//! `subject#default`, ...) while still supporting `begins_with` scans
//! within a partition.
//!
//! Because the partition key is fixed at two segments, [`DynamoDbStorage`]
//! can only honor [`StorageAdapter::scan_raw`] for prefixes of at least two
//! segments; shorter prefixes would require a table scan across
//! partitions, which this adapter refuses to do. Callers that need
//! cross-partition prefix scans should pick a different backend — see the
//! Open Questions note on this tradeoff.

#![cfg(feature = "storage-dynamodb")]

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;

use super::{Key, StorageAdapter, StorageError, StorageResult, TtlSecs};

const PK_ATTR: &str = "pk";
const SK_ATTR: &str = "sk";
const VALUE_ATTR: &str = "value";
const EXPIRY_ATTR: &str = "expiry";

pub struct DynamoDbStorage {
    client: Client,
    table_name: String,
}

impl DynamoDbStorage {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        DynamoDbStorage {
            client,
            table_name: table_name.into(),
        }
    }

    pub async fn from_env(table_name: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        let client = Client::new(&config);
        DynamoDbStorage::new(client, table_name)
    }

    fn split(key: &Key) -> (String, String) {
        let segments = key.segments();
        let pk_len = segments.len().min(2);
        let pk = segments[..pk_len].join(&super::KEY_SEPARATOR.to_string());
        let sk = segments[pk_len..].join(&super::KEY_SEPARATOR.to_string());
        (pk, sk)
    }

    fn now_secs() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

#[async_trait]
impl StorageAdapter for DynamoDbStorage {
    async fn get_raw(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        let (pk, sk) = Self::split(key);
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PK_ATTR, AttributeValue::S(pk))
            .key(SK_ATTR, AttributeValue::S(sk))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(item) = output.item else {
            return Ok(None);
        };

        if let Some(AttributeValue::N(expiry)) = item.get(EXPIRY_ATTR) {
            let expiry: i64 = expiry.parse().unwrap_or(i64::MAX);
            if expiry <= Self::now_secs() {
                return Ok(None);
            }
        }

        match item.get(VALUE_ATTR) {
            Some(AttributeValue::B(blob)) => Ok(Some(blob.clone().into_inner())),
            _ => Ok(None),
        }
    }

    async fn set_raw(&self, key: &Key, value: Vec<u8>, ttl: Option<TtlSecs>) -> StorageResult<()> {
        let (pk, sk) = Self::split(key);
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(PK_ATTR, AttributeValue::S(pk))
            .item(SK_ATTR, AttributeValue::S(sk))
            .item(VALUE_ATTR, AttributeValue::B(value.into()));

        if let Some(secs) = ttl {
            let expiry = Self::now_secs() + secs as i64;
            request = request.item(EXPIRY_ATTR, AttributeValue::N(expiry.to_string()));
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &Key) -> StorageResult<()> {
        let (pk, sk) = Self::split(key);
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(PK_ATTR, AttributeValue::S(pk))
            .key(SK_ATTR, AttributeValue::S(sk))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn scan_raw(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        if prefix.segments().len() < 2 {
            return Err(StorageError::PrefixScanUnsupported);
        }
        let (pk, sk_prefix) = Self::split(prefix);

        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("#pk = :pk AND begins_with(#sk, :sk)")
            .expression_attribute_names("#pk", PK_ATTR)
            .expression_attribute_names("#sk", SK_ATTR)
            .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
            .expression_attribute_values(":sk", AttributeValue::S(sk_prefix))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let now = Self::now_secs();
        let mut out = Vec::new();
        for item in output.items.unwrap_or_default() {
            if let Some(AttributeValue::N(expiry)) = item.get(EXPIRY_ATTR) {
                let expiry: i64 = expiry.parse().unwrap_or(i64::MAX);
                if expiry <= now {
                    continue;
                }
            }
            let Some(AttributeValue::S(sk)) = item.get(SK_ATTR) else {
                continue;
            };
            let Some(AttributeValue::B(blob)) = item.get(VALUE_ATTR) else {
                continue;
            };
            let mut segments: Vec<String> = pk.split(super::KEY_SEPARATOR).map(String::from).collect();
            if !sk.is_empty() {
                segments.extend(sk.split(super::KEY_SEPARATOR).map(String::from));
            }
            out.push((Key::from(segments), blob.clone().into_inner()));
        }
        Ok(out)
    }

    fn supports_prefix_scan(&self) -> bool {
        // Only prefixes of at least two segments map onto a single
        // partition key; shorter prefixes are rejected by scan_raw.
        false
    }
}
