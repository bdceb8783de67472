// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! `GET /userinfo`, per §4.4: verifies the bearer access token and returns
//! its subject's `properties`.

use rocket::serde::json::Json;
use rocket::State;

use super::errors::OAuthErrorResponse;
use super::guards::BearerToken;
use super::IssuerState;
use crate::error::OAuthErrorCode;

#[rocket::get("/userinfo")]
pub fn userinfo(
    token: BearerToken,
    state: &State<IssuerState>,
) -> Result<Json<serde_json::Value>, OAuthErrorResponse> {
    let subject = state
        .tokens
        .verify_access(&token.0, None)
        .map_err(|_| OAuthErrorResponse::new(OAuthErrorCode::InvalidRequest, "invalid or expired access token"))?;
    Ok(Json(subject.properties))
}
