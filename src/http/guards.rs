// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Request guards: the bearer-token guard for `/userinfo` and
//! `/introspect`, and the conversation-cookie guard binding the browser to
//! its provider conversation, per §6's `openauth_state` cookie.
//!
//! Grounded on the teacher's `ApiKey`/bearer `FromRequest` guards.

use base64::Engine;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};

use super::IssuerState;
use crate::subject::Subject;

pub const CONVERSATION_COOKIE: &str = "openauth_state";

/// A bearer token extracted from the `Authorization` header.
pub struct BearerToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header = request.headers().get_one("Authorization");
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if !token.is_empty() => Outcome::Success(BearerToken(token.to_string())),
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

/// The server-generated conversation ID bound to the browser via the
/// `openauth_state` cookie, per §4.4's `/authorize` handler.
pub struct ConversationId(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ConversationId {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.cookies().get_private(CONVERSATION_COOKIE) {
            Some(cookie) => Outcome::Success(ConversationId(cookie.value().to_string())),
            None => Outcome::Error((Status::BadRequest, ())),
        }
    }
}

/// A bearer token already verified against the issuer's signing keys, with
/// its scopes extracted, for routes that gate on a specific scope rather
/// than mere authentication. Used by the `protect_get` macro.
pub struct ScopedBearer {
    pub subject: Subject,
    pub scopes: Vec<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ScopedBearer {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let bearer = match BearerToken::from_request(request).await {
            Outcome::Success(b) => b,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };
        let state = match request.guard::<&State<IssuerState>>().await {
            Outcome::Success(s) => s,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };
        match state.tokens.verify_access_claims(&bearer.0, None) {
            Ok((subject, scopes)) => Outcome::Success(ScopedBearer { subject, scopes }),
            Err(_) => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

impl ScopedBearer {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// HTTP Basic client-credential guard used by `/introspect`, restricted to
/// confidential clients per RFC 7662.
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientCredentials {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header = request.headers().get_one("Authorization");
        let Some(encoded) = header.and_then(|h| h.strip_prefix("Basic ")) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        match decoded.split_once(':') {
            Some((client_id, client_secret)) => Outcome::Success(ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            }),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}
