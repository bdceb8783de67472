// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Token Service implementation.
//!
//! Grounded on the teacher's `JwtIssuer` (mint/verify against a shared
//! key map), generalized with a pluggable [`StorageAdapter`], refresh-token
//! rotation, and the reuse-interval/reuse-detection state machine of §3.4.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::TokenError;
use crate::keys::KeyManager;
use crate::storage::{Key, StorageAdapter, StorageAdapterExt};
use crate::subject::{Subject, SubjectRegistry};

use super::claims::{
    AccessTokenClaims, AuthorizationCodeRecord, ParsedRefreshToken, RefreshTokenRecord, TokenPair,
};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn random_secret() -> String {
    let mut bytes = [0u8; 24]; // 192 bits, well over the required 128-bit floor
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_code() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    pub issuer: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub reuse_interval_secs: i64,
    pub retention_secs: i64,
    pub code_ttl_secs: u64,
}

impl Default for TokenServiceConfig {
    fn default() -> Self {
        TokenServiceConfig {
            issuer: "https://issuer.example".to_string(),
            access_ttl_secs: 30,
            refresh_ttl_secs: 30 * 24 * 3600,
            reuse_interval_secs: 60,
            retention_secs: 0,
            code_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

pub struct TokenService {
    storage: Arc<dyn StorageAdapter>,
    keys: Arc<KeyManager>,
    subjects: Arc<SubjectRegistry>,
    config: TokenServiceConfig,
}

fn refresh_key(subject_id: &str, refresh_id: &str) -> Key {
    Key::of(&["oauth", "refresh"]).push(subject_id).push(refresh_id)
}

fn code_key(code: &str) -> Key {
    Key::of(&["oauth", "code"]).push(code)
}

impl TokenService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        keys: Arc<KeyManager>,
        subjects: Arc<SubjectRegistry>,
        config: TokenServiceConfig,
    ) -> Self {
        TokenService {
            storage,
            keys,
            subjects,
            config,
        }
    }

    /// Mints a signed access token for `subject`, intersecting `scopes`
    /// with the caller-authorized scopes having already happened upstream
    /// (the Scope Validator narrows before this is called), per §4.3.
    pub fn mint_access(
        &self,
        client_id: &str,
        subject: &Subject,
        scopes: Option<Vec<String>>,
    ) -> Result<String, TokenError> {
        let (kid, encoding_key) = self.keys.encoding_key()?;
        let issued_at = now();
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            sub: subject.id.clone(),
            aud: client_id.to_string(),
            iat: issued_at,
            exp: issued_at + self.config.access_ttl_secs,
            mode: AccessTokenClaims::MODE.to_string(),
            type_: subject.type_.clone(),
            properties: subject.properties.clone(),
            scopes,
        };
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(kid);
        encode(&header, &claims, &encoding_key).map_err(|_| TokenError::InvalidAccessToken)
    }

    /// Mints and stores a fresh opaque refresh token for `subject`, per
    /// §4.3's "Mint refresh token."
    pub async fn mint_refresh(
        &self,
        client_id: &str,
        subject: &Subject,
        scopes: Option<Vec<String>>,
    ) -> Result<String, TokenError> {
        let refresh_id = Uuid::new_v4().to_string();
        let secret = random_secret();
        let record = RefreshTokenRecord {
            subject_type: subject.type_.clone(),
            properties: subject.properties.clone(),
            client_id: client_id.to_string(),
            secret: secret.clone(),
            scopes,
            next_token: None,
            time_used: None,
            issued_access_token: None,
        };
        self.storage
            .set(
                &refresh_key(&subject.id, &refresh_id),
                &record,
                Some(self.config.refresh_ttl_secs as u64),
            )
            .await?;
        Ok(ParsedRefreshToken::format(&subject.id, &refresh_id, &secret))
    }

    /// Mints a full access+refresh pair for `subject`, per §4.3 and used by
    /// the code-flow and client-credentials handlers in §4.4.
    pub async fn mint_pair(
        &self,
        client_id: &str,
        subject: &Subject,
        scopes: Option<Vec<String>>,
    ) -> Result<TokenPair, TokenError> {
        let access_token = self.mint_access(client_id, subject, scopes.clone())?;
        let refresh_token = self.mint_refresh(client_id, subject, scopes).await?;
        Ok(TokenPair {
            access_token,
            refresh_token: Some(refresh_token),
            expires_in: self.config.access_ttl_secs,
        })
    }

    /// Issues a single-use authorization code per §4.4's provider-success
    /// handler, TTL-bounded per §3.1 (≤ 60 s).
    pub async fn mint_authorization_code(
        &self,
        record: AuthorizationCodeRecord,
    ) -> Result<String, TokenError> {
        let code = random_code();
        self.storage
            .set(&code_key(&code), &record, Some(self.config.code_ttl_secs))
            .await?;
        Ok(code)
    }

    /// Consumes (fetches and deletes) an authorization code. Reuse of an
    /// already-consumed or unknown code returns `InvalidAuthorizationCode`,
    /// per §3.5's single-use invariant.
    pub async fn consume_authorization_code(
        &self,
        code: &str,
    ) -> Result<AuthorizationCodeRecord, TokenError> {
        self.storage
            .take::<AuthorizationCodeRecord>(&code_key(code))
            .await?
            .ok_or(TokenError::InvalidAuthorizationCode)
    }

    /// Implements the full refresh-consumption state machine of §4.3.
    pub async fn consume_refresh(&self, token: &str) -> Result<TokenPair, TokenError> {
        let parsed = ParsedRefreshToken::parse(token).ok_or(TokenError::InvalidRefreshToken)?;
        let key = refresh_key(&parsed.subject_id, &parsed.refresh_id);
        let record: RefreshTokenRecord = self
            .storage
            .get(&key)
            .await?
            .ok_or(TokenError::InvalidRefreshToken)?;

        if !constant_time_eq(record.secret.as_bytes(), parsed.secret.as_bytes()) {
            return Err(TokenError::InvalidRefreshToken);
        }

        if let (Some(next_token), Some(time_used)) = (&record.next_token, record.time_used) {
            if now() - time_used <= self.config.reuse_interval_secs {
                // Idempotent replay: return the exact pair minted at
                // rotation time, not a freshly minted access token — a
                // re-mint would carry a later `iat`/`exp` than the
                // original A1, breaking the "payload of A1' equals payload
                // of A1" invariant.
                let access_token = record
                    .issued_access_token
                    .clone()
                    .ok_or(TokenError::InvalidRefreshToken)?;
                return Ok(TokenPair {
                    access_token,
                    refresh_token: Some(next_token.clone()),
                    expires_in: self.config.access_ttl_secs,
                });
            } else {
                // Reuse detected: the window has closed and this token has
                // already been exchanged once. Delete the whole descendant
                // chain and invalidate the subject's session silently.
                self.delete_chain(&parsed.subject_id, &parsed.refresh_id).await?;
                return Err(TokenError::InvalidRefreshToken);
            }
        }

        // First-time consumption: mint a fresh pair and record the rotation.
        let subject = Subject {
            type_: record.subject_type.clone(),
            id: parsed.subject_id.clone(),
            properties: record.properties.clone(),
        };
        let new_pair = self
            .mint_pair(&record.client_id, &subject, record.scopes.clone())
            .await?;

        let mut updated = record;
        updated.next_token = new_pair.refresh_token.clone();
        updated.time_used = Some(now());
        updated.issued_access_token = Some(new_pair.access_token.clone());
        // The consumed record must outlive the reuse window itself or the
        // idempotent-replay check in step 4 above could never observe it;
        // `retention` is the extra time beyond that window during which a
        // stale presentation still reaches the explicit reuse-detection
        // chain walk rather than just finding an absent record.
        let consumed_ttl = (self.config.reuse_interval_secs.max(0) + self.config.retention_secs.max(0)) as u64;
        self.storage.set(&key, &updated, Some(consumed_ttl)).await?;

        Ok(new_pair)
    }

    /// Walks `nextToken` forward from `(subject_id, refresh_id)`, deleting
    /// every node, per §3.4's reuse-detection chain walk.
    async fn delete_chain(&self, subject_id: &str, refresh_id: &str) -> Result<(), TokenError> {
        let mut current_subject = subject_id.to_string();
        let mut current_refresh = refresh_id.to_string();
        loop {
            let key = refresh_key(&current_subject, &current_refresh);
            let record: Option<RefreshTokenRecord> = self.storage.get(&key).await?;
            self.storage.remove(&key).await?;
            match record.and_then(|r| r.next_token) {
                Some(next_token) => match ParsedRefreshToken::parse(&next_token) {
                    Some(parsed) => {
                        current_subject = parsed.subject_id;
                        current_refresh = parsed.refresh_id;
                    }
                    None => break,
                },
                None => break,
            }
        }
        Ok(())
    }

    /// Drops every refresh token for a subject, per the Provider Protocol's
    /// `ctx.invalidate(subjectID)` contract (§4.5).
    pub async fn invalidate_subject(&self, subject_id: &str) -> Result<(), TokenError> {
        let prefix = Key::of(&["oauth", "refresh"]).push(subject_id);
        if !self.storage.supports_prefix_scan() {
            return Err(TokenError::MissingParameter("prefix-scan-capable storage"));
        }
        let records: Vec<(Key, RefreshTokenRecord)> = self.storage.scan(&prefix).await?;
        for (key, _) in records {
            self.storage.remove(&key).await?;
        }
        Ok(())
    }

    /// Verifies a bearer access token per §4.3's "Verify access token"
    /// sequence: signature, issuer, audience, expiry, mode, and a
    /// subject-schema re-validation.
    pub fn verify_access(&self, token: &str, audience: Option<&str>) -> Result<Subject, TokenError> {
        self.verify_access_claims(token, audience).map(|(subject, _)| subject)
    }

    /// Like [`Self::verify_access`] but also returns the token's scopes,
    /// for callers that need to gate on a specific scope (e.g. a
    /// route-protection macro) rather than just on authentication.
    pub fn verify_access_claims(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> Result<(Subject, Vec<String>), TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::InvalidAccessToken)?;
        let kid = header.kid.ok_or(TokenError::InvalidAccessToken)?;
        let decoding_key: DecodingKey = self.keys.decoding_key(&kid)?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        if let Some(aud) = audience {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }

        let data = decode::<AccessTokenClaims>(token, &decoding_key, &validation)
            .map_err(|_| TokenError::InvalidAccessToken)?;
        let claims = data.claims;

        if !claims.is_access_mode() {
            return Err(TokenError::InvalidAccessToken);
        }
        if claims.exp <= now() {
            return Err(TokenError::InvalidAccessToken);
        }

        let scopes = claims.scopes.clone().unwrap_or_default();
        let subject = Subject {
            type_: claims.type_,
            id: claims.sub,
            properties: claims.properties,
        };
        self.subjects
            .revalidate(&subject)
            .map_err(TokenError::InvalidSubject)?;
        Ok((subject, scopes))
    }

    /// RFC 7662-shaped introspection, added per §4.3's supplemental note.
    pub fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.verify_access(token, None) {
            Ok(subject) => {
                let header = jsonwebtoken::decode_header(token).ok();
                let kid = header.and_then(|h| h.kid);
                let decoding_key = kid.as_deref().and_then(|k| self.keys.decoding_key(k).ok());
                let mut validation = Validation::new(Algorithm::ES256);
                validation.validate_aud = false;
                let claims = decoding_key
                    .and_then(|dk| decode::<AccessTokenClaims>(token, &dk, &validation).ok())
                    .map(|d| d.claims);
                IntrospectionResponse {
                    active: true,
                    scope: claims
                        .as_ref()
                        .and_then(|c| c.scopes.as_ref())
                        .map(|s| s.join(" ")),
                    client_id: claims.as_ref().map(|c| c.aud.clone()),
                    exp: claims.as_ref().map(|c| c.exp),
                    sub: Some(subject.id),
                }
            }
            Err(_) => IntrospectionResponse {
                active: false,
                scope: None,
                client_id: None,
                exp: None,
                sub: None,
            },
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyManager;
    use crate::storage::memory::MemoryStorage;
    use crate::subject::{OpenSchema, SubjectRegistry};
    use serde_json::json;
    use std::time::Duration;

    async fn build_service() -> TokenService {
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        let keys = Arc::new(KeyManager::new(storage.clone(), Duration::from_secs(3600)));
        keys.rotate().await.unwrap();
        let mut registry = SubjectRegistry::new();
        registry.register("user", Arc::new(OpenSchema));
        TokenService::new(storage, keys, Arc::new(registry), TokenServiceConfig::default())
    }

    fn sample_subject() -> Subject {
        Subject {
            type_: "user".to_string(),
            id: "user-1".to_string(),
            properties: json!({"userID": "123"}),
        }
    }

    #[tokio::test]
    async fn mint_and_verify_access_round_trips() {
        let service = build_service().await;
        let token = service.mint_access("client-x", &sample_subject(), None).unwrap();
        let subject = service.verify_access(&token, Some("client-x")).unwrap();
        assert_eq!(subject.id, "user-1");
        assert_eq!(subject.properties, json!({"userID": "123"}));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_audience() {
        let service = build_service().await;
        let token = service.mint_access("client-x", &sample_subject(), None).unwrap();
        assert!(service.verify_access(&token, Some("other-client")).is_err());
    }

    #[tokio::test]
    async fn first_consume_rotates_and_second_within_window_replays() {
        let service = build_service().await;
        let pair0 = service.mint_pair("client-x", &sample_subject(), None).await.unwrap();
        let refresh0 = pair0.refresh_token.unwrap();

        let pair1 = service.consume_refresh(&refresh0).await.unwrap();
        let replay = service.consume_refresh(&refresh0).await.unwrap();

        assert_eq!(pair1.refresh_token, replay.refresh_token);
        assert_eq!(pair1.access_token, replay.access_token);
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let service = build_service().await;
        assert!(service.consume_refresh("not-a-valid-token").await.is_err());
    }

    #[tokio::test]
    async fn authorization_code_is_single_use() {
        let service = build_service().await;
        let record = AuthorizationCodeRecord {
            subject_type: "user".to_string(),
            subject_id: "user-1".to_string(),
            properties: json!({"userID": "123"}),
            client_id: "client-x".to_string(),
            redirect_uri: "https://client.example/cb".to_string(),
            code_challenge: None,
            code_challenge_method: None,
            scopes: None,
        };
        let code = service.mint_authorization_code(record).await.unwrap();
        assert!(service.consume_authorization_code(&code).await.is_ok());
        assert!(service.consume_authorization_code(&code).await.is_err());
    }
}
