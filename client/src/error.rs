// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Client-library errors, kept distinct from the issuer's `TokenError`
//! per §7's "Client-library token errors are structured error values".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("issuer returned an error response: {error} ({description})")]
    IssuerError { error: String, description: String },

    #[error("malformed JWT: {0}")]
    MalformedToken(String),

    #[error("access token is missing or expired and no refresh token was supplied")]
    Expired,

    #[error("subject failed schema validation: {0}")]
    InvalidSubject(String),

    #[error("no signing key in JWKS matches this token's `kid`")]
    UnknownKey,

    #[error("discovery document is missing a required field: {0}")]
    Discovery(&'static str),
}
