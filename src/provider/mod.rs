// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Provider Protocol
//!
//! The contract every identity provider implements, and the registry that
//! wires provider routes into the issuer's router, per §4.5.
//!
//! Grounded on the teacher's guard/state pair (`OxideState` holding shared
//! issuer resources, request guards reading cookies), generalized from a
//! single OAuth2 flow into a registry of named, independently-mounted
//! provider conversations.

pub mod email_code;
pub mod magic_link;
pub mod oauth2;
pub mod oidc;
pub mod password;
#[cfg(feature = "provider-saml")]
pub mod saml;
#[cfg(feature = "provider-siwe")]
pub mod siwe;
pub mod webauthn;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::storage::{Key, StorageAdapter, StorageAdapterExt, TtlSecs};

/// The normalized result a provider hands back to the issuer on a
/// successful conversation. The issuer never interprets `value` itself —
/// only the user-supplied `success` callback does, discriminating on
/// `provider`, per §4.5's closing paragraph.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderValue {
    pub provider: String,
    pub value: Value,
}

/// What a completed provider conversation asks the issuer to do next.
pub enum ProviderOutcome {
    /// The conversation succeeded; `ctx.success` should run.
    Success(ProviderValue),
    /// The conversation isn't finished; render this body without ending it
    /// (`ctx.forward`).
    Forward(String),
}

/// Per-request conversation context handed to a provider, replacing the
/// source's closures-over-request-state with an explicit value per §9's
/// "Closures-over-context in providers" design note.
pub struct ProviderContext {
    pub request_id: String,
    storage: Arc<dyn StorageAdapter>,
}

impl ProviderContext {
    pub fn new(request_id: String, storage: Arc<dyn StorageAdapter>) -> Self {
        ProviderContext { request_id, storage }
    }

    fn slot_key(&self, slot: &str) -> Key {
        Key::of(&["oauth", "provider"]).push(&self.request_id).push(slot)
    }

    /// Per-conversation scratch storage, per §4.5's `ctx.set`.
    pub async fn set<T: Serialize + Sync>(
        &self,
        slot: &str,
        ttl_secs: TtlSecs,
        value: &T,
    ) -> Result<(), ProviderError> {
        self.storage
            .set(&self.slot_key(slot), value, Some(ttl_secs))
            .await
            .map_err(ProviderError::from)
    }

    pub async fn get<T: DeserializeOwned + Send>(&self, slot: &str) -> Result<Option<T>, ProviderError> {
        self.storage
            .get(&self.slot_key(slot))
            .await
            .map_err(ProviderError::from)
    }

    pub async fn unset(&self, slot: &str) -> Result<(), ProviderError> {
        self.storage.remove(&self.slot_key(slot)).await.map_err(ProviderError::from)
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }
}

/// Parameters passed to a provider's `client(...)` callback for the
/// `client_credentials` grant, per §4.4's `/token` handling.
pub struct ClientCredentialsParams {
    pub client_id: String,
    pub client_secret: String,
    pub params: HashMap<String, String>,
}

/// The contract a provider implements: `init` mounts its routes onto the
/// issuer's router (modeled here as registering itself, since Rust routers
/// are declared at compile time rather than dynamically); `client`
/// optionally supports the `client_credentials` grant.
#[async_trait]
pub trait Provider: Send + Sync {
    fn type_name(&self) -> &str;

    /// Drives one step of the provider's conversation for its mount point.
    /// `path` is the sub-path under `/<providerName>/`, `body` is the
    /// request's form/JSON payload already parsed into a JSON value.
    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError>;

    /// Supports the `client_credentials` grant when `Some`; providers that
    /// don't (passkey, SAML, ...) leave the default `None`.
    async fn client(&self, _params: ClientCredentialsParams) -> Option<Result<ProviderValue, ProviderError>> {
        None
    }
}

/// Wires named provider instances into one lookup table, mirroring the
/// teacher's `routes![...]` mounting but keyed at runtime by provider name
/// so providers can be added from configuration rather than compiled in.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Default TTL for provider conversation scratch slots absent an explicit
/// override, per §3.1's "short" TTL for the provider-conversation family.
pub const DEFAULT_CONVERSATION_TTL: Duration = Duration::from_secs(600);
