// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Caches JWKS and `.well-known` responses keyed by issuer URL, per §4.6's
//! closing sentence and §5's "read-mostly caches (JWKS, .well-known)".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ClientError;
use crate::transport::Transport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    pub kid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
}

/// Per-issuer-URL cache of `.well-known` metadata and JWKS, invalidated
/// only by explicit refresh (entries are immutable after insert, per §5).
#[derive(Default)]
pub struct JwksCache {
    metadata: RwLock<HashMap<String, IssuerMetadata>>,
    jwks: RwLock<HashMap<String, JwkSet>>,
}

impl JwksCache {
    pub fn new() -> Self {
        JwksCache::default()
    }

    pub async fn metadata(
        &self,
        issuer: &str,
        transport: &dyn Transport,
    ) -> Result<IssuerMetadata, ClientError> {
        if let Some(cached) = self.metadata.read().await.get(issuer) {
            return Ok(cached.clone());
        }
        let url = format!("{}/.well-known/oauth-authorization-server", issuer.trim_end_matches('/'));
        let value = transport.get_json(&url).await?;
        let metadata: IssuerMetadata =
            serde_json::from_value(value).map_err(|_| ClientError::Discovery("malformed metadata document"))?;
        self.metadata.write().await.insert(issuer.to_string(), metadata.clone());
        Ok(metadata)
    }

    pub async fn jwks(&self, issuer: &str, jwks_uri: &str, transport: &dyn Transport) -> Result<JwkSet, ClientError> {
        if let Some(cached) = self.jwks.read().await.get(issuer) {
            return Ok(cached.clone());
        }
        let value = transport.get_json(jwks_uri).await?;
        let jwks: JwkSet = serde_json::from_value(value).map_err(|_| ClientError::Discovery("malformed JWKS document"))?;
        self.jwks.write().await.insert(issuer.to_string(), jwks.clone());
        Ok(jwks)
    }
}
