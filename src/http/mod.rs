// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Issuer State Machine
//!
//! The HTTP surface of §4.4: `/.well-known/*`, `/authorize`, provider
//! sub-routes, `/token`, `/userinfo`, `/jwks`, and `/introspect`.
//!
//! Grounded on the teacher's Rocket builder (`rocket::build().manage(...)
//! .mount(...).attach(cors)`), generalized from a fixed photoacoustic API
//! surface to the OAuth endpoint table.

pub mod authorize;
pub mod errors;
pub mod guards;
pub mod jwks;
pub mod provider_route;
pub mod token_endpoint;
pub mod userinfo;
pub mod well_known;

use std::sync::Arc;

use async_trait::async_trait;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};

use crate::config::Config;
use crate::error::ProviderError;
use crate::keys::KeyManager;
use crate::provider::{ProviderRegistry, ProviderValue};
use crate::storage::StorageAdapter;
use crate::subject::{Subject, SubjectRegistry};
use crate::token::TokenService;

/// Maps a normalized provider result to a subject, per §4.4's
/// `success(ctx, providerValue)` callback. The issuer never interprets
/// `providerValue` itself; only this user-supplied mapping does.
#[async_trait]
pub trait SuccessMapper: Send + Sync {
    async fn map(&self, value: &ProviderValue) -> Result<Subject, ProviderError>;
}

/// Authorizes a `(client_id, redirect_uri)` pair, per §6's `allow` option.
pub trait AllowGuard: Send + Sync {
    fn allow(&self, client_id: &str, redirect_uri: &str) -> bool;
}

/// An `allow` guard that accepts any redirect URI, suitable only for
/// development configurations.
pub struct AllowAll;

impl AllowGuard for AllowAll {
    fn allow(&self, _client_id: &str, _redirect_uri: &str) -> bool {
        true
    }
}

/// The shared, read-mostly state every route handler draws on, matching
/// §5's "no global mutable state except read-mostly caches" concurrency
/// model: everything here is either immutable after construction or
/// internally synchronized (the storage adapter, the key manager).
pub struct IssuerState {
    pub config: Config,
    pub storage: Arc<dyn StorageAdapter>,
    pub keys: Arc<KeyManager>,
    pub tokens: Arc<TokenService>,
    pub subjects: Arc<SubjectRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub success: Arc<dyn SuccessMapper>,
    pub allow: Arc<dyn AllowGuard>,
}

/// Builds the Rocket instance per the teacher's builder pattern: state
/// injected via `.manage()`, routes mounted under the configured base
/// path, and a permissive-by-default CORS fairing narrowed by
/// configuration in production deployments.
pub fn build(state: IssuerState) -> Rocket<Build> {
    let base_path = state.config.base_path.clone();
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .to_cors()
        .expect("CORS configuration must be valid");

    rocket::build()
        .manage(state)
        .mount(
            format!("{base_path}/"),
            rocket::routes![
                well_known::oauth_authorization_server,
                well_known::openid_configuration,
                jwks::jwks_json,
                authorize::authorize,
                provider_route::provider_route_post,
                provider_route::provider_route_get,
                token_endpoint::token,
                token_endpoint::introspect,
                userinfo::userinfo,
            ],
        )
        .attach(cors)
}
