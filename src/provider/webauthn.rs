// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! WebAuthn (passkey) provider.
//!
//! Per §4.5, the issuer verifies the signed assertion directly against a
//! caller-supplied public key (ECDSA-over-P-256) rather than delegating to
//! a full relying-party library: it generates a 32-digit random challenge,
//! checks `rpIdHash`, the user-present/user-verified flags, origin, and
//! (where present) `crossOrigin`.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const CHALLENGE_SLOT: &str = "webauthn_challenge";
const CHALLENGE_TTL_SECS: u64 = 300;

/// Flags from `authenticatorData`'s flag byte (WebAuthn §6.1).
const FLAG_USER_PRESENT: u8 = 0b0000_0001;
const FLAG_USER_VERIFIED: u8 = 0b0000_0100;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingChallenge {
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct ClientDataJson {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
    #[serde(default, rename = "crossOrigin")]
    cross_origin: Option<bool>,
}

pub struct WebAuthnProvider {
    pub relying_party_id: String,
    pub expected_origin: String,
}

impl WebAuthnProvider {
    pub fn new(relying_party_id: impl Into<String>, expected_origin: impl Into<String>) -> Self {
        WebAuthnProvider {
            relying_party_id: relying_party_id.into(),
            expected_origin: expected_origin.into(),
        }
    }

    fn generate_challenge() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        // 32 random bytes rendered as 32 decimal digits per §4.5's "32-digit
        // random challenge," distinct from the byte length.
        bytes.iter().map(|b| (b % 10).to_string()).collect()
    }

    fn verify_assertion(&self, challenge: &str, body: &Value) -> Result<(), ProviderError> {
        let public_key_bytes = body
            .get("publicKey")
            .and_then(Value::as_str)
            .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
            .ok_or(ProviderError::InvalidCredentials)?;
        let authenticator_data = body
            .get("authenticatorData")
            .and_then(Value::as_str)
            .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
            .ok_or(ProviderError::InvalidCredentials)?;
        let client_data_json = body
            .get("clientDataJSON")
            .and_then(Value::as_str)
            .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
            .ok_or(ProviderError::InvalidCredentials)?;
        let signature_bytes = body
            .get("signature")
            .and_then(Value::as_str)
            .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
            .ok_or(ProviderError::InvalidCredentials)?;

        let client_data: ClientDataJson =
            serde_json::from_slice(&client_data_json).map_err(|_| ProviderError::InvalidCredentials)?;

        if client_data.type_ != "webauthn.get" {
            return Err(ProviderError::InvalidCredentials);
        }
        let challenge_matches = client_data.challenge.len() == challenge.len()
            && bool::from(client_data.challenge.as_bytes().ct_eq(challenge.as_bytes()));
        if !challenge_matches {
            return Err(ProviderError::InvalidCredentials);
        }
        if client_data.origin != self.expected_origin {
            return Err(ProviderError::InvalidCredentials);
        }
        if client_data.cross_origin == Some(true) {
            return Err(ProviderError::InvalidCredentials);
        }

        if authenticator_data.len() < 37 {
            return Err(ProviderError::InvalidCredentials);
        }
        let rp_id_hash = &authenticator_data[0..32];
        let expected_rp_id_hash = Sha256::digest(self.relying_party_id.as_bytes());
        if rp_id_hash != expected_rp_id_hash.as_slice() {
            return Err(ProviderError::InvalidCredentials);
        }
        let flags = authenticator_data[32];
        if flags & FLAG_USER_PRESENT == 0 || flags & FLAG_USER_VERIFIED == 0 {
            return Err(ProviderError::InvalidCredentials);
        }

        let verifying_key =
            VerifyingKey::from_sec1_bytes(&public_key_bytes).map_err(|_| ProviderError::InvalidCredentials)?;
        let signature = Signature::from_der(&signature_bytes)
            .or_else(|_| Signature::from_slice(&signature_bytes))
            .map_err(|_| ProviderError::InvalidCredentials)?;

        let client_data_hash = Sha256::digest(&client_data_json);
        let mut signed_data = authenticator_data.clone();
        signed_data.extend_from_slice(&client_data_hash);

        verifying_key
            .verify(&signed_data, &signature)
            .map_err(|_| ProviderError::InvalidCredentials)
    }
}

#[async_trait]
impl Provider for WebAuthnProvider {
    fn type_name(&self) -> &str {
        "webauthn"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "challenge" => {
                let challenge = Self::generate_challenge();
                ctx.set(CHALLENGE_SLOT, CHALLENGE_TTL_SECS, &PendingChallenge { challenge: challenge.clone() })
                    .await?;
                Ok(ProviderOutcome::Forward(serde_json::json!({ "challenge": challenge }).to_string()))
            }
            "verify" => {
                let pending: PendingChallenge = ctx.get(CHALLENGE_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;
                self.verify_assertion(&pending.challenge, &body)?;
                ctx.unset(CHALLENGE_SLOT).await?;
                let user_handle = body.get("userHandle").cloned().unwrap_or(Value::Null);
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": { "userHandle": user_handle } }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown webauthn route `{path}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_challenge_is_32_digits() {
        let challenge = WebAuthnProvider::generate_challenge();
        assert_eq!(challenge.len(), 32);
        assert!(challenge.chars().all(|c| c.is_ascii_digit()));
    }
}
