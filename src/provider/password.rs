// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Password provider: login, register, code, and change conversations
//! behind a pluggable hasher, per §4.5.
//!
//! Open Question (b) from §9 is resolved here: the `change` conversation's
//! `update` transition is gated strictly on a prior successful `code`
//! verification stored in the conversation (`code_verified` slot), never on
//! a loosely matched provider-type string. `register` similarly never
//! activates an account directly — it persists the hash pending a `code`
//! verification that proves control of the email address, the same
//! constant-time verify pattern `email_code` uses.

use async_trait::async_trait;
use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use pbkdf2::Pbkdf2;
use scrypt::Scrypt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::email_code::{generate_code, EmailSender};
use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;
use crate::storage::{Key, StorageAdapterExt};

const CODE_VERIFIED_SLOT: &str = "code_verified";
const PENDING_CODE_SLOT: &str = "pending_code";
const PENDING_REGISTRATION_SLOT: &str = "pending_registration";
const CODE_TTL_SECS: u64 = 600;

/// A pluggable password-hashing strategy. Implementations must verify in
/// constant time (the `password-hash` crate's `verify_password` already
/// does this internally for both backing algorithms).
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, ProviderError>;
    fn verify(&self, password: &str, stored_hash: &str) -> bool;
}

pub struct ScryptHasher;

impl PasswordHasher for ScryptHasher {
    fn hash(&self, password: &str) -> Result<String, ProviderError> {
        let salt = SaltString::generate(&mut OsRng);
        Scrypt
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ProviderError::Other(e.to_string()))
    }

    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Scrypt.verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

pub struct Pbkdf2Hasher;

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String, ProviderError> {
        let salt = SaltString::generate(&mut OsRng);
        Pbkdf2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ProviderError::Other(e.to_string()))
    }

    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

fn email_key(email: &str) -> Key {
    Key::of(&["email"]).push(email).push("password")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPassword {
    hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingCode {
    code: String,
    email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRegistration {
    email: String,
    hash: String,
}

pub struct PasswordProvider {
    hasher: std::sync::Arc<dyn PasswordHasher>,
    code_digits: usize,
    sender: std::sync::Arc<dyn EmailSender>,
}

impl PasswordProvider {
    pub fn new(
        hasher: std::sync::Arc<dyn PasswordHasher>,
        code_digits: usize,
        sender: std::sync::Arc<dyn EmailSender>,
    ) -> Self {
        PasswordProvider {
            hasher,
            code_digits,
            sender,
        }
    }

    async fn send_code(&self, ctx: &ProviderContext, email: &str) -> Result<(), ProviderError> {
        let code = generate_code(self.code_digits);
        ctx.set(
            PENDING_CODE_SLOT,
            CODE_TTL_SECS,
            &PendingCode {
                code: code.clone(),
                email: email.to_string(),
            },
        )
        .await?;
        self.sender.send(email, &code).await
    }
}

#[async_trait]
impl Provider for PasswordProvider {
    fn type_name(&self) -> &str {
        "password"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "login" => {
                let email = body.get("email").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let password = body
                    .get("password")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let stored: StoredPassword = ctx
                    .storage()
                    .get(&email_key(email))
                    .await?
                    .ok_or(ProviderError::InvalidCredentials)?;
                if !self.hasher.verify(password, &stored.hash) {
                    return Err(ProviderError::InvalidCredentials);
                }
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": { "email": email } }),
                }))
            }
            "register" => {
                let email = body.get("email").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let password = body
                    .get("password")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let hash = self.hasher.hash(password)?;
                ctx.set(
                    PENDING_REGISTRATION_SLOT,
                    CODE_TTL_SECS,
                    &PendingRegistration {
                        email: email.to_string(),
                        hash,
                    },
                )
                .await?;
                self.send_code(ctx, email).await?;
                Ok(ProviderOutcome::Forward("registration code sent".to_string()))
            }
            "code" => {
                let submitted = body
                    .get("code")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::CodeInvalid)?;
                let pending: PendingCode = ctx.get(PENDING_CODE_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;
                let matches = submitted.len() == pending.code.len()
                    && bool::from(submitted.as_bytes().ct_eq(pending.code.as_bytes()));
                if !matches {
                    return Err(ProviderError::CodeInvalid);
                }
                ctx.unset(PENDING_CODE_SLOT).await?;

                if let Some(registration) = ctx.get::<PendingRegistration>(PENDING_REGISTRATION_SLOT).await? {
                    ctx.unset(PENDING_REGISTRATION_SLOT).await?;
                    ctx.storage()
                        .set(&email_key(&registration.email), &StoredPassword { hash: registration.hash }, None)
                        .await?;
                    return Ok(ProviderOutcome::Success(ProviderValue {
                        provider: self.type_name().to_string(),
                        value: serde_json::json!({ "claims": { "email": registration.email } }),
                    }));
                }

                ctx.set(CODE_VERIFIED_SLOT, CODE_TTL_SECS, &true).await?;
                Ok(ProviderOutcome::Forward("code verified".to_string()))
            }
            "change" => {
                let verified: Option<bool> = ctx.get(CODE_VERIFIED_SLOT).await?;
                if verified != Some(true) {
                    return Err(ProviderError::InvalidCredentials);
                }
                let email = body.get("email").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let new_password = body
                    .get("password")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let hash = self.hasher.hash(new_password)?;
                ctx.storage().set(&email_key(email), &StoredPassword { hash }, None).await?;
                ctx.unset(CODE_VERIFIED_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": { "email": email } }),
                }))
            }
            "change/request" => {
                let email = body.get("email").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                self.send_code(ctx, email).await?;
                Ok(ProviderOutcome::Forward("code sent".to_string()))
            }
            _ => Err(ProviderError::Other(format!("unknown password route `{path}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::storage::memory::MemoryStorage;

    struct CapturingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl CapturingSender {
        fn new() -> Self {
            CapturingSender { sent: Mutex::new(Vec::new()) }
        }

        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl EmailSender for CapturingSender {
        async fn send(&self, email: &str, code: &str) -> Result<(), ProviderError> {
            self.sent.lock().unwrap().push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    fn build_provider() -> (PasswordProvider, Arc<CapturingSender>) {
        let sender = Arc::new(CapturingSender::new());
        let provider = PasswordProvider::new(Arc::new(ScryptHasher), 6, sender.clone());
        (provider, sender)
    }

    fn build_ctx() -> ProviderContext {
        ProviderContext::new("conversation-1".to_string(), Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn register_requires_code_verification_before_login_succeeds() {
        let (provider, sender) = build_provider();
        let ctx = build_ctx();

        let register = provider
            .handle(&ctx, "register", serde_json::json!({"email": "a@b.com", "password": "hunter2"}))
            .await
            .unwrap();
        assert!(matches!(register, ProviderOutcome::Forward(_)));

        // Login before verifying the code fails: the account was never activated.
        let early_login = provider
            .handle(&ctx, "login", serde_json::json!({"email": "a@b.com", "password": "hunter2"}))
            .await;
        assert!(early_login.is_err());

        let code = sender.last_code();
        let verify = provider
            .handle(&ctx, "code", serde_json::json!({"code": code}))
            .await
            .unwrap();
        assert!(matches!(verify, ProviderOutcome::Success(_)));

        let login = provider
            .handle(&ctx, "login", serde_json::json!({"email": "a@b.com", "password": "hunter2"}))
            .await
            .unwrap();
        assert!(matches!(login, ProviderOutcome::Success(_)));
    }

    #[tokio::test]
    async fn change_is_unreachable_until_code_is_verified() {
        let (provider, sender) = build_provider();
        let ctx = build_ctx();

        let change_before = provider
            .handle(&ctx, "change", serde_json::json!({"email": "a@b.com", "password": "newpass"}))
            .await;
        assert!(matches!(change_before, Err(ProviderError::InvalidCredentials)));

        provider
            .handle(&ctx, "change/request", serde_json::json!({"email": "a@b.com"}))
            .await
            .unwrap();
        let code = sender.last_code();
        let verified = provider.handle(&ctx, "code", serde_json::json!({"code": code})).await.unwrap();
        assert!(matches!(verified, ProviderOutcome::Forward(_)));

        let change_after = provider
            .handle(&ctx, "change", serde_json::json!({"email": "a@b.com", "password": "newpass"}))
            .await
            .unwrap();
        assert!(matches!(change_after, ProviderOutcome::Success(_)));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let (provider, _sender) = build_provider();
        let ctx = build_ctx();
        provider
            .handle(&ctx, "register", serde_json::json!({"email": "a@b.com", "password": "hunter2"}))
            .await
            .unwrap();

        let result = provider.handle(&ctx, "code", serde_json::json!({"code": "000000"})).await;
        assert!(matches!(result, Err(ProviderError::CodeInvalid)));
    }
}
