// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! JWT claim shapes minted and verified by the Token Service, per §3.3.

use serde::{Deserialize, Serialize};
use serde_json::Value;

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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl AccessTokenClaims {
    pub const MODE: &'static str = "access";

    pub fn is_access_mode(&self) -> bool {
        self.mode == Self::MODE
    }
}

/// The record stored under `oauth:code/<code>`, per §3.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCodeRecord {
    pub subject_type: String,
    pub subject_id: String,
    pub properties: Value,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scopes: Option<Vec<String>>,
}

/// The record stored under `oauth:refresh/<subjectID>/<refreshID>`, per §3.1
/// and the rotation chain described in §3.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub subject_type: String,
    pub properties: Value,
    pub client_id: String,
    pub secret: String,
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_used: Option<i64>,
    /// The access token minted alongside `next_token` at rotation time, so
    /// a replay within the reuse interval can return the exact same token
    /// (same `iat`/`exp`) rather than minting a fresh one with a later
    /// `iat`, per §8 scenario 2's "the payload of A1′ equals the payload
    /// of A1."
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_access_token: Option<String>,
}

/// A minted access+refresh pair as returned across `/token` and the Token
/// Service's public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// The opaque refresh-token wire format `<subjectID>:<refreshID>:<secret>`.
pub struct ParsedRefreshToken {
    pub subject_id: String,
    pub refresh_id: String,
    pub secret: String,
}

impl ParsedRefreshToken {
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.splitn(3, ':');
        let subject_id = parts.next()?.to_string();
        let refresh_id = parts.next()?.to_string();
        let secret = parts.next()?.to_string();
        if subject_id.is_empty() || refresh_id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(ParsedRefreshToken {
            subject_id,
            refresh_id,
            secret,
        })
    }

    pub fn format(subject_id: &str, refresh_id: &str, secret: &str) -> String {
        format!("{subject_id}:{refresh_id}:{secret}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_refresh_token_round_trips() {
        let token = ParsedRefreshToken::format("sub1", "ref1", "secretvalue");
        let parsed = ParsedRefreshToken::parse(&token).unwrap();
        assert_eq!(parsed.subject_id, "sub1");
        assert_eq!(parsed.refresh_id, "ref1");
        assert_eq!(parsed.secret, "secretvalue");
    }

    #[test]
    fn parsed_refresh_token_rejects_malformed_input() {
        assert!(ParsedRefreshToken::parse("not-enough-parts").is_none());
        assert!(ParsedRefreshToken::parse("::").is_none());
    }
}
