// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Configuration
//!
//! A layered `Config` struct loaded from YAML (`serde` + `serde_yml`) and
//! overridable by CLI flags (`clap`), mirroring the teacher's
//! `Config::from_file` / `Args` pair.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_base_path() -> String {
    String::new()
}

fn default_storage_backend() -> StorageBackendKind {
    StorageBackendKind::Memory
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Sqlite,
    Redis,
    Dynamodb,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SqliteConfig {
    #[serde(default = "default_sqlite_path")]
    pub path: String,
}

fn default_sqlite_path() -> String {
    "openauth.sqlite3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DynamoDbConfig {
    pub table: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackendKind,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub dynamodb: DynamoDbConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_storage_backend(),
            sqlite: SqliteConfig::default(),
            redis: RedisConfig::default(),
            dynamodb: DynamoDbConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BindConfig {
    #[serde(default = "default_bind_address")]
    pub address: String,
    #[serde(default = "default_bind_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_access_ttl")]
    pub access: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh: i64,
    #[serde(default = "default_reuse_ttl")]
    pub reuse: i64,
    #[serde(default)]
    pub retention: i64,
}

fn default_access_ttl() -> i64 {
    30
}
fn default_refresh_ttl() -> i64 {
    30 * 24 * 3600
}
fn default_reuse_ttl() -> i64 {
    60
}

impl Default for TtlConfig {
    fn default() -> Self {
        TtlConfig {
            access: default_access_ttl(),
            refresh: default_refresh_ttl(),
            reuse: default_reuse_ttl(),
            retention: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeysConfig {
    #[serde(default = "default_key_cache_refresh_secs")]
    pub cache_refresh_secs: u64,
}

fn default_key_cache_refresh_secs() -> u64 {
    3600
}

/// The issuer's fully resolved configuration, per §6's recognized options
/// plus the ambient bind/TLS/logging/storage additions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub issuer: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bind: BindConfig,
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub keys: KeysConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file `{}`", path.display()))?;
        let config: Config = serde_yml::from_str(&contents)
            .with_context(|| format!("failed to parse config file `{}`", path.display()))?;
        Ok(config)
    }

    /// Joins `base_path` with `path`, used when advertising metadata URLs
    /// and mounting routes behind a reverse-proxy prefix, per §4.4's
    /// `.well-known` note and §8 scenario 5.
    pub fn external_path(&self, path: &str) -> String {
        format!("{}{}", self.base_path.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_file_parses_minimal_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "issuer: https://issuer.example\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.issuer, "https://issuer.example");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.ttl.access, 30);
    }

    #[test]
    fn external_path_joins_base_path_and_path() {
        let mut config = minimal_config();
        config.base_path = "/superbasepath".to_string();
        assert_eq!(config.external_path("/authorize"), "/superbasepath/authorize");
    }

    fn minimal_config() -> Config {
        Config {
            issuer: "https://issuer.example".to_string(),
            base_path: String::new(),
            log_level: default_log_level(),
            bind: BindConfig::default(),
            tls: None,
            storage: StorageConfig::default(),
            ttl: TtlConfig::default(),
            keys: KeysConfig::default(),
        }
    }
}
