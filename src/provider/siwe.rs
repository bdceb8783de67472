// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! SIWE (Sign-In-With-Ethereum) provider, per §4.5.
//!
//! EIP-4361 message parsing is hand-rolled — it is a small fixed text
//! grammar — while signature recovery uses `ethers`, matching the
//! retrieval pack's `MystenLabs-sui` use of the same crate for Ethereum
//! primitives.

#![cfg(feature = "provider-siwe")]

use async_trait::async_trait;
use ethers::types::{Address, Signature as EthSignature};
use ethers::utils::hex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const NONCE_SLOT: &str = "siwe_nonce";
const NONCE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingNonce {
    nonce: String,
}

/// The fields this provider extracts from an EIP-4361 plaintext message.
/// Full grammar parsing (statement, resources, chain-id) is intentionally
/// narrow: only the fields the issuer must validate are pulled out.
struct SiweMessage {
    domain: String,
    address: String,
    uri: String,
    nonce: String,
}

fn parse_siwe_message(message: &str) -> Option<SiweMessage> {
    let mut lines = message.lines();
    let first_line = lines.next()?;
    let domain = first_line.strip_suffix(" wants you to sign in with your Ethereum account:")?.to_string();
    let address = lines.next()?.trim().to_string();

    let mut uri = None;
    let mut nonce = None;
    for line in lines {
        if let Some(value) = line.strip_prefix("URI: ") {
            uri = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Nonce: ") {
            nonce = Some(value.trim().to_string());
        }
    }

    Some(SiweMessage {
        domain,
        address,
        uri: uri?,
        nonce: nonce?,
    })
}

pub struct SiweProvider {
    pub expected_domain: String,
    pub expected_uri: String,
}

impl SiweProvider {
    pub fn new(expected_domain: impl Into<String>, expected_uri: impl Into<String>) -> Self {
        SiweProvider {
            expected_domain: expected_domain.into(),
            expected_uri: expected_uri.into(),
        }
    }

    fn generate_nonce() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[async_trait]
impl Provider for SiweProvider {
    fn type_name(&self) -> &str {
        "siwe"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "nonce" => {
                let nonce = Self::generate_nonce();
                ctx.set(NONCE_SLOT, NONCE_TTL_SECS, &PendingNonce { nonce: nonce.clone() }).await?;
                Ok(ProviderOutcome::Forward(serde_json::json!({ "nonce": nonce }).to_string()))
            }
            "verify" => {
                let raw_message = body.get("message").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let raw_signature = body
                    .get("signature")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;

                let parsed = parse_siwe_message(raw_message).ok_or(ProviderError::InvalidCredentials)?;
                let pending: PendingNonce = ctx.get(NONCE_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;

                if parsed.domain != self.expected_domain
                    || parsed.uri != self.expected_uri
                    || parsed.nonce != pending.nonce
                {
                    return Err(ProviderError::InvalidCredentials);
                }

                let signature: EthSignature =
                    raw_signature.parse().map_err(|_| ProviderError::InvalidCredentials)?;
                let claimed_address: Address =
                    parsed.address.parse().map_err(|_| ProviderError::InvalidCredentials)?;
                signature
                    .verify(raw_message, claimed_address)
                    .map_err(|_| ProviderError::InvalidCredentials)?;

                ctx.unset(NONCE_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": { "address": parsed.address } }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown siwe route `{path}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domain_address_uri_and_nonce() {
        let message = "example.com wants you to sign in with your Ethereum account:\n\
0x1234567890123456789012345678901234567890\n\
\n\
Sign in\n\
\n\
URI: https://example.com\n\
Version: 1\n\
Chain ID: 1\n\
Nonce: abc123\n\
Issued At: 2026-01-01T00:00:00Z";
        let parsed = parse_siwe_message(message).unwrap();
        assert_eq!(parsed.domain, "example.com");
        assert_eq!(parsed.uri, "https://example.com");
        assert_eq!(parsed.nonce, "abc123");
    }
}
