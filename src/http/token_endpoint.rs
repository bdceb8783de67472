// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! `POST /token` and `POST /introspect`, per §4.4 and §4.3's supplemental
//! introspection note.

use std::collections::HashMap;

use rocket::form::Form;
use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

use super::errors::OAuthErrorResponse;
use super::guards::ClientCredentials;
use super::IssuerState;
use crate::error::OAuthErrorCode;
use crate::provider::ClientCredentialsParams;
use crate::scope::parse_scopes;
use crate::subject::Subject;
use crate::token::TokenPair;

#[derive(Debug, rocket::FromForm)]
pub struct TokenRequest<'r> {
    pub grant_type: &'r str,
    pub code: Option<&'r str>,
    pub redirect_uri: Option<&'r str>,
    pub code_verifier: Option<&'r str>,
    pub refresh_token: Option<&'r str>,
    pub client_id: Option<&'r str>,
    pub client_secret: Option<&'r str>,
    pub scope: Option<&'r str>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer",
            expires_in: pair.expires_in,
        }
    }
}

fn verify_pkce(verifier: &str, challenge: &str, method: Option<&str>) -> bool {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use sha2::{Digest, Sha256};

    match method.unwrap_or("S256") {
        "S256" => {
            let digest = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(digest) == challenge
        }
        "plain" => verifier == challenge,
        _ => false,
    }
}

#[rocket::post("/token", data = "<request>")]
pub async fn token(
    request: Form<TokenRequest<'_>>,
    state: &State<IssuerState>,
) -> Result<Json<TokenResponse>, OAuthErrorResponse> {
    match request.grant_type {
        "authorization_code" => {
            let code = request
                .code
                .filter(|c| !c.is_empty())
                .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidRequest, "missing code"))?;
            let record = state.tokens.consume_authorization_code(code).await?;

            let redirect_uri = request.redirect_uri.unwrap_or_default();
            if redirect_uri != record.redirect_uri {
                return Err(OAuthErrorResponse::new(OAuthErrorCode::InvalidGrant, "redirect_uri mismatch"));
            }
            if let Some(client_id) = request.client_id {
                if client_id != record.client_id {
                    return Err(OAuthErrorResponse::new(OAuthErrorCode::InvalidGrant, "client_id mismatch"));
                }
            }

            if let Some(challenge) = &record.code_challenge {
                let verifier = request
                    .code_verifier
                    .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidGrant, "missing code_verifier"))?;
                if !verify_pkce(verifier, challenge, record.code_challenge_method.as_deref()) {
                    return Err(OAuthErrorResponse::new(OAuthErrorCode::InvalidGrant, "PKCE verification failed"));
                }
            }

            let subject = Subject {
                type_: record.subject_type,
                id: record.subject_id,
                properties: record.properties,
            };
            let pair = state.tokens.mint_pair(&record.client_id, &subject, record.scopes).await?;
            Ok(Json(pair.into()))
        }
        "refresh_token" => {
            let refresh_token = request
                .refresh_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidRequest, "missing refresh_token"))?;
            let pair = state.tokens.consume_refresh(refresh_token).await?;
            Ok(Json(pair.into()))
        }
        "client_credentials" => {
            let client_id = request
                .client_id
                .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidClient, "missing client_id"))?;
            let client_secret = request
                .client_secret
                .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidClient, "missing client_secret"))?;

            let mut found = false;
            for name in state.providers.names() {
                let Some(provider) = state.providers.get(name) else { continue };
                let params = ClientCredentialsParams {
                    client_id: client_id.to_string(),
                    client_secret: client_secret.to_string(),
                    params: HashMap::new(),
                };
                if let Some(result) = provider.client(params).await {
                    found = true;
                    let provider_value =
                        result.map_err(|e| OAuthErrorResponse::new(OAuthErrorCode::InvalidClient, e.to_string()))?;
                    let subject = state
                        .success
                        .map(&provider_value)
                        .await
                        .map_err(|e| OAuthErrorResponse::new(OAuthErrorCode::ServerError, e.to_string()))?;
                    let scopes = request.scope.map(parse_scopes);
                    let access_token = state.tokens.mint_access(client_id, &subject, scopes)?;
                    return Ok(Json(TokenResponse {
                        access_token,
                        refresh_token: None,
                        token_type: "Bearer",
                        expires_in: 30,
                    }));
                }
            }
            if !found {
                return Err(OAuthErrorResponse::new(
                    OAuthErrorCode::UnauthorizedClient,
                    "no provider supports client_credentials for this client",
                ));
            }
            Err(OAuthErrorResponse::new(OAuthErrorCode::InvalidClient, "invalid client credentials"))
        }
        other => Err(OAuthErrorResponse::new(
            OAuthErrorCode::UnsupportedGrantType,
            format!("unsupported grant_type `{other}`"),
        )),
    }
}

#[derive(Debug, rocket::FromForm)]
pub struct IntrospectRequest<'r> {
    pub token: &'r str,
}

#[rocket::post("/introspect", data = "<request>")]
pub fn introspect(
    request: Form<IntrospectRequest<'_>>,
    _client: ClientCredentials,
    state: &State<IssuerState>,
) -> Json<crate::token::IntrospectionResponse> {
    Json(state.tokens.introspect(request.token))
}
