// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Generic OAuth2 provider: drives the `code` grant against an upstream
//! authorization server, per §4.5.
//!
//! Supports the standard `query` redirect response and the `form_post`
//! response mode (a `POST /callback` carrying `code`/`state` as form
//! fields). Verifies `state`, exchanges `code` for upstream tokens, and
//! delivers `{tokenset, clientID}` to the issuer's `success` callback.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const STATE_SLOT: &str = "oauth2_state";
const STATE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingState {
    state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamTokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

pub struct OAuth2ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

pub struct OAuth2Provider {
    config: OAuth2ProviderConfig,
    http: reqwest::Client,
}

impl OAuth2Provider {
    pub fn new(config: OAuth2ProviderConfig) -> Self {
        OAuth2Provider {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn generate_state() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    fn authorize_url(&self, state: &str) -> String {
        let mut url = url::Url::parse(&self.config.authorize_url).expect("configured authorize_url must be valid");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state);
        url.into()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<UpstreamTokenSet, ProviderError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", &self.config.redirect_uri);
        form.insert("client_id", &self.config.client_id);
        form.insert("client_secret", &self.config.client_secret);

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<UpstreamTokenSet>()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))
    }
}

#[async_trait]
impl Provider for OAuth2Provider {
    fn type_name(&self) -> &str {
        "oauth2"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "authorize" => {
                let state = Self::generate_state();
                ctx.set(STATE_SLOT, STATE_TTL_SECS, &PendingState { state: state.clone() }).await?;
                Ok(ProviderOutcome::Forward(
                    serde_json::json!({ "redirect": self.authorize_url(&state) }).to_string(),
                ))
            }
            "callback" => {
                let code = body.get("code").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let submitted_state =
                    body.get("state").and_then(Value::as_str).ok_or(ProviderError::InvalidCredentials)?;
                let pending: PendingState = ctx.get(STATE_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;
                if submitted_state != pending.state {
                    return Err(ProviderError::InvalidCredentials);
                }
                let tokenset = self.exchange_code(code).await?;
                ctx.unset(STATE_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({
                        "tokenset": tokenset,
                        "clientID": self.config.client_id,
                    }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown oauth2 route `{path}`"))),
        }
    }
}
