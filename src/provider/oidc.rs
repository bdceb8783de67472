// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Generic OIDC provider, per §4.5: like [`super::oauth2`], but fetches the
//! upstream `/.well-known/openid-configuration`, verifies `id_token`
//! against the upstream JWKS with nonce and audience bound, and supports
//! both the implicit (`id_token`) and authorization-code flows with
//! `client_secret_post`/`client_secret_basic` token-endpoint
//! authentication.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;
use crate::keys::JwkSet;

const CONVERSATION_SLOT: &str = "oidc_conversation";
const CONVERSATION_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingConversation {
    state: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEndpointAuth {
    ClientSecretPost,
    ClientSecretBasic,
}

pub struct OidcProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub discovery_url: String,
    pub redirect_uri: String,
    pub scope: String,
    pub token_endpoint_auth: TokenEndpointAuth,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    aud: String,
    exp: i64,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

pub struct OidcProvider {
    config: OidcProviderConfig,
    http: reqwest::Client,
    discovery_cache: RwLock<Option<DiscoveryDocument>>,
    jwks_cache: RwLock<Option<JwkSet>>,
}

impl OidcProvider {
    pub fn new(config: OidcProviderConfig) -> Self {
        OidcProvider {
            config,
            http: reqwest::Client::new(),
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
        }
    }

    async fn discovery(&self) -> Result<DiscoveryDocument, ProviderError> {
        if let Some(doc) = self.discovery_cache.read().unwrap().as_ref() {
            return Ok(DiscoveryDocument {
                authorization_endpoint: doc.authorization_endpoint.clone(),
                token_endpoint: doc.token_endpoint.clone(),
                jwks_uri: doc.jwks_uri.clone(),
            });
        }
        let doc: DiscoveryDocument = self
            .http
            .get(&self.config.discovery_url)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        let clone = DiscoveryDocument {
            authorization_endpoint: doc.authorization_endpoint.clone(),
            token_endpoint: doc.token_endpoint.clone(),
            jwks_uri: doc.jwks_uri.clone(),
        };
        *self.discovery_cache.write().unwrap() = Some(doc);
        Ok(clone)
    }

    async fn jwks(&self, jwks_uri: &str) -> Result<JwkSet, ProviderError> {
        if let Some(set) = self.jwks_cache.read().unwrap().as_ref() {
            return Ok(set.clone());
        }
        let set: JwkSet = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        *self.jwks_cache.write().unwrap() = Some(set.clone());
        Ok(set)
    }

    async fn verify_id_token(&self, id_token: &str, nonce: &str, jwks_uri: &str) -> Result<Value, ProviderError> {
        let header = decode_header(id_token).map_err(|_| ProviderError::InvalidCredentials)?;
        let kid = header.kid.ok_or(ProviderError::InvalidCredentials)?;
        let jwks = self.jwks(jwks_uri).await?;
        let jwk = jwks.keys.iter().find(|k| k.kid == kid).ok_or(ProviderError::InvalidCredentials)?;

        let x = URL_SAFE_NO_PAD.decode(&jwk.x).map_err(|_| ProviderError::InvalidCredentials)?;
        let y = URL_SAFE_NO_PAD.decode(&jwk.y).map_err(|_| ProviderError::InvalidCredentials)?;
        let mut point = vec![0x04u8];
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        let decoding_key = DecodingKey::from_ec_der(&point);

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[self.config.client_id.clone()]);
        let data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|_| ProviderError::InvalidCredentials)?;

        if data.claims.nonce.as_deref() != Some(nonce) {
            return Err(ProviderError::InvalidCredentials);
        }

        Ok(serde_json::to_value(&data.claims.extra).unwrap_or(Value::Null))
    }

    fn generate_token(len: usize) -> String {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[async_trait]
impl Provider for OidcProvider {
    fn type_name(&self) -> &str {
        "oidc"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "authorize" => {
                let discovery = self.discovery().await?;
                let state = Self::generate_token(16);
                let nonce = Self::generate_token(16);
                ctx.set(
                    CONVERSATION_SLOT,
                    CONVERSATION_TTL_SECS,
                    &PendingConversation { state: state.clone(), nonce: nonce.clone() },
                )
                .await?;

                let mut url = url::Url::parse(&discovery.authorization_endpoint)
                    .map_err(|e| ProviderError::Upstream(e.to_string()))?;
                url.query_pairs_mut()
                    .append_pair("response_type", "code")
                    .append_pair("client_id", &self.config.client_id)
                    .append_pair("redirect_uri", &self.config.redirect_uri)
                    .append_pair("scope", &self.config.scope)
                    .append_pair("state", &state)
                    .append_pair("nonce", &nonce);

                Ok(ProviderOutcome::Forward(serde_json::json!({ "redirect": url.to_string() }).to_string()))
            }
            "callback" => {
                let code = body.get("code").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let submitted_state =
                    body.get("state").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let pending: PendingConversation =
                    ctx.get(CONVERSATION_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;
                if submitted_state != pending.state {
                    return Err(ProviderError::InvalidCredentials);
                }

                let discovery = self.discovery().await?;
                let mut form = HashMap::new();
                form.insert("grant_type", "authorization_code");
                form.insert("code", code);
                form.insert("redirect_uri", &self.config.redirect_uri);

                let mut request = self.http.post(&discovery.token_endpoint);
                request = match self.config.token_endpoint_auth {
                    TokenEndpointAuth::ClientSecretPost => {
                        form.insert("client_id", &self.config.client_id);
                        form.insert("client_secret", &self.config.client_secret);
                        request
                    }
                    TokenEndpointAuth::ClientSecretBasic => {
                        request.basic_auth(&self.config.client_id, Some(&self.config.client_secret))
                    }
                };

                let response = request
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| ProviderError::Upstream(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(ProviderError::Upstream(format!("token endpoint returned {}", response.status())));
                }
                let token_response: Value =
                    response.json().await.map_err(|e| ProviderError::Upstream(e.to_string()))?;
                let id_token = token_response
                    .get("id_token")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;

                let claims = self.verify_id_token(id_token, &pending.nonce, &discovery.jwks_uri).await?;
                ctx.unset(CONVERSATION_SLOT).await?;

                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({
                        "tokenset": token_response,
                        "claims": claims,
                        "clientID": self.config.client_id,
                    }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown oidc route `{path}`"))),
        }
    }
}
