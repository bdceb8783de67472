// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Composition root: parses CLI flags, loads the YAML config, wires a
//! default set of identity providers, and launches the Rocket application.
//!
//! This binary is a reference deployment. Embedders who need custom
//! providers or a custom [`openauth_issuer::http::SuccessMapper`] are
//! expected to depend on the library crate directly and write their own
//! composition root, per §4.5's provider-registration model.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use log::info;

use openauth_issuer::build_info;
use openauth_issuer::config::{Config, StorageBackendKind};
use openauth_issuer::error::ProviderError;
use openauth_issuer::http::{self, AllowAll, IssuerState, SuccessMapper};
use openauth_issuer::keys::KeyManager;
use openauth_issuer::provider::email_code::{EmailCodeProvider, EmailSender};
use openauth_issuer::provider::password::{PasswordProvider, ScryptHasher};
use openauth_issuer::provider::{ProviderRegistry, ProviderValue};
use openauth_issuer::storage::memory::MemoryStorage;
use openauth_issuer::storage::StorageAdapter;
use openauth_issuer::subject::{default_subject_id, OpenSchema, Subject, SubjectRegistry};
use openauth_issuer::token::{TokenService, TokenServiceConfig};

#[derive(Debug, Parser)]
#[command(author, version, about = "Self-hosted OAuth 2.1 / OpenID-Connect identity issuer", long_about = None)]
struct Args {
    /// Path to the configuration file (YAML format).
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print version information and exit.
    #[arg(long)]
    show_version: bool,

    /// Print detailed build information and exit.
    #[arg(long)]
    build_info: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Logs the verification code instead of sending an email, for the
/// reference deployment's default `email_code` provider.
struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, email: &str, code: &str) -> Result<(), ProviderError> {
        info!("verification code for {email}: {code}");
        Ok(())
    }
}

/// Maps any provider's success value directly onto a `user` subject,
/// trusting that every bundled provider already shapes its `value` as the
/// desired subject properties. Embedders with heterogeneous providers will
/// typically discriminate on `value.provider` instead, per §4.4.
struct DefaultSuccessMapper;

#[async_trait]
impl SuccessMapper for DefaultSuccessMapper {
    async fn map(&self, value: &ProviderValue) -> Result<Subject, ProviderError> {
        let properties = value
            .value
            .get("claims")
            .cloned()
            .unwrap_or_else(|| value.value.clone());
        let id = default_subject_id(&properties);
        Ok(Subject {
            type_: "user".to_string(),
            id,
            properties,
        })
    }
}

fn build_storage(config: &Config) -> Result<Arc<dyn StorageAdapter>> {
    match config.storage.backend {
        StorageBackendKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackendKind::Sqlite => {
            #[cfg(feature = "storage-sqlite")]
            {
                let storage = openauth_issuer::storage::sqlite::SqliteStorage::open(&config.storage.sqlite.path)?;
                Ok(Arc::new(storage))
            }
            #[cfg(not(feature = "storage-sqlite"))]
            {
                Err(anyhow::anyhow!("sqlite storage requested but the `storage-sqlite` feature is disabled"))
            }
        }
        StorageBackendKind::Redis => {
            #[cfg(feature = "storage-redis")]
            {
                let storage = openauth_issuer::storage::redis_backend::RedisStorage::new(&config.storage.redis.url)?;
                Ok(Arc::new(storage))
            }
            #[cfg(not(feature = "storage-redis"))]
            {
                Err(anyhow::anyhow!("redis storage requested but the `storage-redis` feature is disabled"))
            }
        }
        StorageBackendKind::Dynamodb => {
            Err(anyhow::anyhow!(
                "dynamodb storage requires async client construction; build it in a custom composition root"
            ))
        }
    }
}

#[rocket::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.show_version {
        println!("{}", build_info::BuildInfo::get().version_string());
        return Ok(());
    }
    if args.build_info {
        println!("{}", build_info::BuildInfo::get().full_info());
        return Ok(());
    }

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env().filter_level(log_level).init();

    let config = Config::from_file(&args.config)?;
    info!("loaded configuration for issuer `{}`", config.issuer);

    let storage = build_storage(&config)?;
    let keys = Arc::new(KeyManager::new(storage.clone(), Duration::from_secs(config.keys.cache_refresh_secs)));
    keys.load().await?;
    keys.rotate_if_due().await?;

    let mut subjects = SubjectRegistry::new();
    subjects.register("user", Arc::new(OpenSchema));
    let subjects = Arc::new(subjects);

    let token_config = TokenServiceConfig {
        issuer: config.issuer.clone(),
        access_ttl_secs: config.ttl.access,
        refresh_ttl_secs: config.ttl.refresh,
        reuse_interval_secs: config.ttl.reuse,
        retention_secs: config.ttl.retention,
        code_ttl_secs: 60,
    };
    let tokens = Arc::new(TokenService::new(storage.clone(), keys.clone(), subjects.clone(), token_config));

    let mut providers = ProviderRegistry::new();
    providers.register(
        "password",
        Arc::new(PasswordProvider::new(Arc::new(ScryptHasher), 6, Arc::new(LoggingEmailSender))),
    );
    providers.register(
        "email",
        Arc::new(EmailCodeProvider::new(6, Arc::new(LoggingEmailSender))),
    );

    let state = IssuerState {
        config: config.clone(),
        storage,
        keys,
        tokens,
        subjects,
        providers: Arc::new(providers),
        success: Arc::new(DefaultSuccessMapper),
        allow: Arc::new(AllowAll),
    };

    info!("binding on {}:{}", config.bind.address, config.bind.port);
    http::build(state)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("rocket failed to launch: {e}"))?;

    Ok(())
}
