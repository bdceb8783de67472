// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! `/.well-known/jwks.json`, per §4.4.

use rocket::serde::json::Json;
use rocket::State;

use super::IssuerState;
use crate::keys::JwkSet;

#[rocket::get("/.well-known/jwks.json")]
pub fn jwks_json(state: &State<IssuerState>) -> Json<JwkSet> {
    Json(state.keys.jwks())
}
