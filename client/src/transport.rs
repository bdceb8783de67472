// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Pluggable HTTP transport, so embedders without `reqwest` (e.g.
//! constrained or already-on-another-HTTP-stack environments) can supply
//! their own implementation, per §4.6's "pluggable transport" requirement.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientError;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value, ClientError>;

    async fn post_form(&self, url: &str, form: &HashMap<&str, &str>) -> Result<Value, ClientError>;
}

#[cfg(feature = "reqwest-transport")]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

#[cfg(feature = "reqwest-transport")]
impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            http: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "reqwest-transport")]
impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "reqwest-transport")]
#[async_trait]
impl Transport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn post_form(&self, url: &str, form: &HashMap<&str, &str>) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !status.is_success() {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("server_error")
                .to_string();
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(ClientError::IssuerError { error, description });
        }
        Ok(body)
    }
}
