// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! `/.well-known/oauth-authorization-server` and
//! `/.well-known/openid-configuration`, per §4.4.

use rocket::serde::json::Json;
use rocket::State;
use serde::Serialize;

use super::IssuerState;

#[derive(Debug, Serialize)]
pub struct IssuerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub userinfo_endpoint: String,
    pub introspection_endpoint: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

fn metadata(state: &IssuerState) -> IssuerMetadata {
    IssuerMetadata {
        issuer: state.config.issuer.clone(),
        authorization_endpoint: format!("{}{}", state.config.issuer, state.config.external_path("/authorize")),
        token_endpoint: format!("{}{}", state.config.issuer, state.config.external_path("/token")),
        jwks_uri: format!(
            "{}{}",
            state.config.issuer,
            state.config.external_path("/.well-known/jwks.json")
        ),
        userinfo_endpoint: format!("{}{}", state.config.issuer, state.config.external_path("/userinfo")),
        introspection_endpoint: format!("{}{}", state.config.issuer, state.config.external_path("/introspect")),
        response_types_supported: vec!["code", "token"],
        grant_types_supported: vec!["authorization_code", "refresh_token", "client_credentials"],
        code_challenge_methods_supported: vec!["S256"],
    }
}

#[rocket::get("/.well-known/oauth-authorization-server")]
pub fn oauth_authorization_server(state: &State<IssuerState>) -> Json<IssuerMetadata> {
    Json(metadata(state))
}

#[rocket::get("/.well-known/openid-configuration")]
pub fn openid_configuration(state: &State<IssuerState>) -> Json<IssuerMetadata> {
    Json(metadata(state))
}
