// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! SAML provider, per §4.5: renders the IdP sign-on redirect with a
//! RelayState nonce, validates the returned POST assertion, and extracts
//! `nameID` and attributes.
//!
//! Uses `samael` for assertion parsing/validation and `flate2` for the
//! deflate-encoded `SAMLRequest` query parameter, matching the retrieval
//! pack's `ScriptSmith-hadrian` SAML dependency choice.

#![cfg(feature = "provider-saml")]

use std::io::Write;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rand::RngCore;
use samael::schema::Response as SamlResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Provider, ProviderContext, ProviderOutcome, ProviderValue};
use crate::error::ProviderError;

const RELAY_STATE_SLOT: &str = "saml_relay_state";
const RELAY_STATE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRelayState {
    relay_state: String,
}

pub struct SamlProvider {
    pub idp_sso_url: String,
    pub sp_entity_id: String,
}

impl SamlProvider {
    pub fn new(idp_sso_url: impl Into<String>, sp_entity_id: impl Into<String>) -> Self {
        SamlProvider {
            idp_sso_url: idp_sso_url.into(),
            sp_entity_id: sp_entity_id.into(),
        }
    }

    fn generate_relay_state() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    fn build_authn_request_url(&self, relay_state: &str) -> Result<String, ProviderError> {
        let request_xml = format!(
            "<samlp:AuthnRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\" \
             Destination=\"{}\" Issuer=\"{}\"/>",
            self.idp_sso_url, self.sp_entity_id
        );
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(request_xml.as_bytes())
            .map_err(|e| ProviderError::Other(e.to_string()))?;
        let compressed = encoder.finish().map_err(|e| ProviderError::Other(e.to_string()))?;
        let encoded = STANDARD.encode(compressed);
        Ok(format!(
            "{}?SAMLRequest={}&RelayState={}",
            self.idp_sso_url,
            urlencoding_encode(&encoded),
            urlencoding_encode(relay_state)
        ))
    }
}

fn urlencoding_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl Provider for SamlProvider {
    fn type_name(&self) -> &str {
        "saml"
    }

    async fn handle(
        &self,
        ctx: &ProviderContext,
        path: &str,
        body: Value,
    ) -> Result<ProviderOutcome, ProviderError> {
        match path {
            "login" => {
                let relay_state = Self::generate_relay_state();
                ctx.set(
                    RELAY_STATE_SLOT,
                    RELAY_STATE_TTL_SECS,
                    &PendingRelayState { relay_state: relay_state.clone() },
                )
                .await?;
                let url = self.build_authn_request_url(&relay_state)?;
                Ok(ProviderOutcome::Forward(serde_json::json!({ "redirect": url }).to_string()))
            }
            "acs" => {
                let saml_response_b64 = body
                    .get("SAMLResponse")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;
                let submitted_relay_state = body
                    .get("RelayState")
                    .and_then(Value::as_str)
                    .ok_or(ProviderError::InvalidCredentials)?;

                let pending: PendingRelayState =
                    ctx.get(RELAY_STATE_SLOT).await?.ok_or(ProviderError::CodeInvalid)?;
                if submitted_relay_state != pending.relay_state {
                    return Err(ProviderError::InvalidCredentials);
                }

                let xml = STANDARD
                    .decode(saml_response_b64)
                    .map_err(|_| ProviderError::InvalidCredentials)?;
                let xml = String::from_utf8(xml).map_err(|_| ProviderError::InvalidCredentials)?;
                let response: SamlResponse = xml.parse().map_err(|_| ProviderError::InvalidCredentials)?;

                let assertion = response
                    .assertions
                    .as_ref()
                    .and_then(|assertions| assertions.first())
                    .ok_or(ProviderError::InvalidCredentials)?;
                let name_id = assertion
                    .subject
                    .as_ref()
                    .and_then(|subject| subject.name_id.as_ref())
                    .map(|n| n.value.clone())
                    .ok_or(ProviderError::InvalidCredentials)?;

                ctx.unset(RELAY_STATE_SLOT).await?;
                Ok(ProviderOutcome::Success(ProviderValue {
                    provider: self.type_name().to_string(),
                    value: serde_json::json!({ "claims": { "nameID": name_id } }),
                }))
            }
            _ => Err(ProviderError::Other(format!("unknown saml route `{path}`"))),
        }
    }
}

