// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Client Library
//!
//! Paired with the issuer, per §4.6: `authorize`, `exchange`, `refresh`,
//! `verify`, and `decode`, against a pluggable [`Transport`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;
use crate::jwks_cache::{Jwk, JwksCache};
use crate::pkce::{self, Pkce};
use crate::transport::Transport;

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub mode: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub properties: Value,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Subject {
    pub type_: String,
    pub id: String,
    pub properties: Value,
}

/// Mirrors the issuer's `SubjectSchema` so a relying party can re-validate
/// a subject's `properties` independently, per §3.2's "decodes and
/// re-validates them" clause.
pub trait SubjectSchema: Send + Sync {
    fn validate(&self, properties: &Value) -> Result<Value, String>;
}

pub struct OpenSchema;

impl SubjectSchema for OpenSchema {
    fn validate(&self, properties: &Value) -> Result<Value, String> {
        if properties.is_object() {
            Ok(properties.clone())
        } else {
            Err("subject properties must be a JSON object".to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizeUrl {
    pub url: String,
    pub challenge: Option<Pkce>,
}

#[derive(Debug, Default, Clone)]
pub struct AuthorizeOptions<'a> {
    pub state: Option<&'a str>,
    pub scope: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub pkce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Default, Clone)]
pub struct RefreshOptions<'a> {
    pub access: Option<&'a str>,
}

#[derive(Debug, Default, Clone)]
pub struct VerifyOptions<'a> {
    pub refresh: Option<&'a str>,
    pub audience: Option<&'a str>,
}

/// Skips ahead of an access token's expiry by this margin when deciding
/// whether `refresh` can short-circuit, matching §4.6's "still valid for
/// > 30 s" rule.
const REFRESH_SHORT_CIRCUIT_MARGIN_SECS: i64 = 30;

pub struct Client {
    issuer: String,
    client_id: String,
    transport: Box<dyn Transport>,
    cache: JwksCache,
}

impl Client {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Client {
            issuer: issuer.into(),
            client_id: client_id.into(),
            transport,
            cache: JwksCache::new(),
        }
    }

    #[cfg(feature = "reqwest-transport")]
    pub fn with_reqwest(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Client::new(issuer, client_id, Box::new(crate::transport::ReqwestTransport::new()))
    }

    /// Builds the `/authorize` URL, optionally generating a PKCE
    /// verifier+challenge pair, per §4.6.
    pub async fn authorize(
        &self,
        redirect_uri: &str,
        response_type: &str,
        opts: AuthorizeOptions<'_>,
    ) -> Result<AuthorizeUrl, ClientError> {
        let metadata = self.cache.metadata(&self.issuer, self.transport.as_ref()).await?;
        let mut url = url::Url::parse(&metadata.authorization_endpoint)
            .map_err(|_| ClientError::Discovery("authorization_endpoint is not a valid URL"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_type", response_type);
            if let Some(state) = opts.state {
                query.append_pair("state", state);
            }
            if let Some(scope) = opts.scope {
                query.append_pair("scope", scope);
            }
            if let Some(provider) = opts.provider {
                query.append_pair("provider", provider);
            }
        }

        let challenge = if opts.pkce {
            let pkce = pkce::generate();
            url.query_pairs_mut()
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", pkce.method);
            Some(pkce)
        } else {
            None
        };

        Ok(AuthorizeUrl {
            url: url.into(),
            challenge,
        })
    }

    /// Exchanges an authorization code for a token set, per §4.6.
    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: Option<&str>,
    ) -> Result<TokenSet, ClientError> {
        let metadata = self.cache.metadata(&self.issuer, self.transport.as_ref()).await?;
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", redirect_uri);
        form.insert("client_id", self.client_id.as_str());
        if let Some(verifier) = verifier {
            form.insert("code_verifier", verifier);
        }
        let body = self.transport.post_form(&metadata.token_endpoint, &form).await?;
        serde_json::from_value(body).map_err(|e| ClientError::MalformedToken(e.to_string()))
    }

    /// Rotates a refresh token for a fresh pair, short-circuiting if the
    /// supplied access token is still valid for more than 30 seconds, per
    /// §4.6's `refresh(refreshToken, {access?})`.
    pub async fn refresh(&self, refresh_token: &str, opts: RefreshOptions<'_>) -> Result<TokenSet, ClientError> {
        if let Some(access) = opts.access {
            if let Ok(claims) = self.decode_unverified(access) {
                if claims.exp - now() > REFRESH_SHORT_CIRCUIT_MARGIN_SECS {
                    return Ok(TokenSet {
                        access_token: access.to_string(),
                        refresh_token: Some(refresh_token.to_string()),
                        token_type: "Bearer".to_string(),
                        expires_in: claims.exp - now(),
                    });
                }
            }
        }

        let metadata = self.cache.metadata(&self.issuer, self.transport.as_ref()).await?;
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", self.client_id.as_str());
        let body = self.transport.post_form(&metadata.token_endpoint, &form).await?;
        serde_json::from_value(body).map_err(|e| ClientError::MalformedToken(e.to_string()))
    }

    /// Verifies an access token's signature, claims, and subject schema,
    /// auto-refreshing on expiry when a refresh token is supplied, per
    /// §4.6.
    pub async fn verify(
        &self,
        schema: &dyn SubjectSchema,
        access_token: &str,
        opts: VerifyOptions<'_>,
    ) -> Result<Subject, ClientError> {
        match self.verify_signed(access_token, opts.audience).await {
            Ok(subject) => {
                let validated = schema
                    .validate(&subject.properties)
                    .map_err(ClientError::InvalidSubject)?;
                Ok(Subject {
                    properties: validated,
                    ..subject
                })
            }
            Err(ClientError::Expired) if opts.refresh.is_some() => {
                let refresh_token = opts.refresh.unwrap();
                let refreshed = self.refresh(refresh_token, RefreshOptions::default()).await?;
                let subject = self.verify_signed(&refreshed.access_token, opts.audience).await?;
                let validated = schema
                    .validate(&subject.properties)
                    .map_err(ClientError::InvalidSubject)?;
                Ok(Subject {
                    properties: validated,
                    ..subject
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn verify_signed(&self, token: &str, audience: Option<&str>) -> Result<Subject, ClientError> {
        let header = decode_header(token).map_err(|e| ClientError::MalformedToken(e.to_string()))?;
        let kid = header.kid.ok_or_else(|| ClientError::MalformedToken("missing kid".to_string()))?;

        let metadata = self.cache.metadata(&self.issuer, self.transport.as_ref()).await?;
        let jwks = self
            .cache
            .jwks(&self.issuer, &metadata.jwks_uri, self.transport.as_ref())
            .await?;
        let jwk = jwks.find(&kid).ok_or(ClientError::UnknownKey)?;
        let decoding_key = decoding_key_from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[metadata.issuer.clone()]);
        if let Some(aud) = audience {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }

        let data = decode::<AccessTokenClaims>(token, &decoding_key, &validation)
            .map_err(|_| ClientError::Expired)?;
        let claims = data.claims;
        if claims.mode != "access" || claims.exp <= now() {
            return Err(ClientError::Expired);
        }

        Ok(Subject {
            type_: claims.type_,
            id: claims.sub,
            properties: claims.properties,
        })
    }

    /// Decodes a subject from an access token without verifying its
    /// signature, for trusted ingress (e.g. a reverse proxy that already
    /// terminated the TLS/auth boundary), per §4.6's `decode`.
    pub fn decode(&self, access_token: &str) -> Result<Subject, ClientError> {
        let claims = self.decode_unverified(access_token)?;
        Ok(Subject {
            type_: claims.type_,
            id: claims.sub,
            properties: claims.properties,
        })
    }

    fn decode_unverified(&self, access_token: &str) -> Result<AccessTokenClaims, ClientError> {
        let mut parts = access_token.split('.');
        let _header = parts.next().ok_or_else(|| ClientError::MalformedToken("missing header".to_string()))?;
        let payload = parts
            .next()
            .ok_or_else(|| ClientError::MalformedToken("missing payload".to_string()))?;
        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| ClientError::MalformedToken(e.to_string()))?;
        serde_json::from_slice(&decoded).map_err(|e| ClientError::MalformedToken(e.to_string()))
    }
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey, ClientError> {
    if jwk.kty != "EC" || jwk.crv != "P-256" {
        return Err(ClientError::UnknownKey);
    }
    DecodingKey::from_ec_components(&jwk.x, &jwk.y).map_err(|_| ClientError::UnknownKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_unverified_extracts_claims_without_signature_check() {
        // A token with an arbitrary (invalid) signature segment; `decode`
        // never inspects it.
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","kid":"k1"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            br#"{"iss":"https://issuer.example","sub":"user-1","aud":"client-x","iat":0,"exp":9999999999,"mode":"access","type":"user","properties":{"userID":"123"}}"#,
        );
        let token = format!("{header}.{payload}.sig");

        let client = Client::new("https://issuer.example", "client-x", Box::new(NullTransport));
        let subject = client.decode(&token).unwrap();
        assert_eq!(subject.id, "user-1");
        assert_eq!(subject.properties, serde_json::json!({"userID": "123"}));
    }

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn get_json(&self, _url: &str) -> Result<Value, ClientError> {
            Err(ClientError::Transport("not implemented".to_string()))
        }

        async fn post_form(&self, _url: &str, _form: &HashMap<&str, &str>) -> Result<Value, ClientError> {
            Err(ClientError::Transport("not implemented".to_string()))
        }
    }
}
