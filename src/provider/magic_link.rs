// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Magic-link provider: like [`super::email_code`], but the code is
//! emailed embedded in a URL and verified by a GET callback, per §4.5.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const TOKEN_SLOT: &str = "magic_link_token";
const TOKEN_TTL_SECS: u64 = 900;

#[async_trait]
pub trait MagicLinkSender: Send + Sync {
    async fn send(&self, email: &str, link_token: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingLink {
    token: String,
    claims: Value,
}

pub struct MagicLinkProvider {
    sender: std::sync::Arc<dyn MagicLinkSender>,
}

impl MagicLinkProvider {
    pub fn new(sender: std::sync::Arc<dyn MagicLinkSender>) -> Self {
        MagicLinkProvider { sender }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl Provider for MagicLinkProvider {
    fn type_name(&self) -> &str {
        "magic-link"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "request" => {
                let email = body
                    .get("email")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let token = generate_token();
                let claims = serde_json::json!({ "email": email });
                ctx.set(
                    TOKEN_SLOT,
                    TOKEN_TTL_SECS,
                    &PendingLink { token: token.clone(), claims },
                )
                .await?;
                self.sender.send(email, &token).await?;
                Ok(ProviderOutcome::Forward("magic link sent".to_string()))
            }
            "callback" => {
                let submitted = body
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::CodeInvalid)?;
                let pending: PendingLink = ctx
                    .get(TOKEN_SLOT)
                    .await?
                    .ok_or(ProviderError::CodeInvalid)?;
                let matches = submitted.len() == pending.token.len()
                    && bool::from(submitted.as_bytes().ct_eq(pending.token.as_bytes()));
                if !matches {
                    return Err(ProviderError::CodeInvalid);
                }
                ctx.unset(TOKEN_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": pending.claims }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown magic-link route `{path}`"))),
        }
    }
}
