// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Email-code provider: a two-step conversation that emails an N-digit
//! code and verifies it on submission, per §4.5.

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const CODE_SLOT: &str = "email_code";
const CODE_TTL_SECS: u64 = 600;

/// Sends an N-digit numeric code to an email address. The caller supplies
/// the actual send mechanism; this provider owns code generation, storage,
/// and constant-time verification only.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &str, code: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingCode {
    code: String,
    claims: Value,
}

pub struct EmailCodeProvider {
    digits: usize,
    sender: std::sync::Arc<dyn EmailSender>,
}

impl EmailCodeProvider {
    pub fn new(digits: usize, sender: std::sync::Arc<dyn EmailSender>) -> Self {
        EmailCodeProvider { digits, sender }
    }
}

/// Generates an unbiased N-digit decimal code using rejection sampling:
/// bytes ≥ 250 are discarded so `byte % 10` is uniform over the retained
/// range (250 is the largest multiple of 10 that fits in a byte).
pub(crate) fn generate_code(digits: usize) -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(digits);
    let mut byte = [0u8; 1];
    while out.len() < digits {
        rng.fill_bytes(&mut byte);
        if byte[0] < 250 {
            out.push((b'0' + (byte[0] % 10)) as char);
        }
    }
    out
}

#[async_trait]
impl Provider for EmailCodeProvider {
    fn type_name(&self) -> &str {
        "code"
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
                let code = generate_code(self.digits);
                let claims = serde_json::json!({ "email": email });
                ctx.set(CODE_SLOT, CODE_TTL_SECS, &PendingCode { code: code.clone(), claims })
                    .await?;
                self.sender.send(email, &code).await?;
                Ok(ProviderOutcome::Forward("code sent".to_string()))
            }
            "verify" => {
                let submitted = body
                    .get("code")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let pending: PendingCode = ctx
                    .get(CODE_SLOT)
                    .await?
                    .ok_or(ProviderError::CodeInvalid)?;
                let matches = submitted.len() == pending.code.len()
                    && bool::from(submitted.as_bytes().ct_eq(pending.code.as_bytes()));
                if !matches {
                    return Err(ProviderError::CodeInvalid);
                }
                ctx.unset(CODE_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": pending.claims }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown email-code route `{path}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_code_has_requested_length_and_is_numeric() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
