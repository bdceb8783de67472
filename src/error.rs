// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Error taxonomy for the issuer
//!
//! Every subsystem (storage, keys, tokens, providers) defines its own
//! `thiserror` error enum at its boundary; this module defines the
//! OAuth-layer and token-layer error kinds that those errors collapse
//! into once they reach the HTTP surface, per the error handling design.

use thiserror::Error;

/// RFC 6749 §5.2 / §4.1.2.1 error codes returned on `/token` and in
/// `/authorize` redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidGrant,
    InvalidClient,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::InvalidClient => "invalid_client",
            OAuthErrorCode::UnauthorizedClient => "unauthorized_client",
            OAuthErrorCode::AccessDenied => "access_denied",
            OAuthErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorCode::UnsupportedResponseType => "unsupported_response_type",
            OAuthErrorCode::InvalidScope => "invalid_scope",
            OAuthErrorCode::ServerError => "server_error",
            OAuthErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

/// Internal token-layer errors, distinct from the OAuth wire taxonomy.
///
/// These are the errors the Token Service and Key Manager raise; the HTTP
/// layer maps them onto [`OAuthErrorCode`] (almost always `invalid_grant`)
/// before they reach a client, per §7's propagation policy.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("access token is invalid or expired")]
    InvalidAccessToken,

    #[error("refresh token is invalid, expired, or reused")]
    InvalidRefreshToken,

    #[error("authorization code is invalid, expired, or already used")]
    InvalidAuthorizationCode,

    #[error("subject properties failed schema validation: {0}")]
    InvalidSubject(String),

    #[error("PKCE verifier did not match the recorded challenge")]
    PkceMismatch,

    #[error("no conversation found for the given request id")]
    UnknownState,

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("client `{client_id}` is not authorized to use redirect_uri `{redirect_uri}`")]
    UnauthorizedClient {
        client_id: String,
        redirect_uri: String,
    },

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Key(#[from] crate::keys::KeyError),
}

impl TokenError {
    /// Maps an internal token error onto the RFC 6749 wire error code used
    /// in `/token` JSON responses and `/authorize` redirect query params.
    pub fn oauth_code(&self) -> OAuthErrorCode {
        match self {
            TokenError::InvalidAccessToken
            | TokenError::InvalidRefreshToken
            | TokenError::InvalidAuthorizationCode
            | TokenError::PkceMismatch => OAuthErrorCode::InvalidGrant,
            TokenError::InvalidSubject(_) => OAuthErrorCode::ServerError,
            TokenError::UnknownState => OAuthErrorCode::InvalidRequest,
            TokenError::MissingParameter(_) => OAuthErrorCode::InvalidRequest,
            TokenError::UnauthorizedClient { .. } => OAuthErrorCode::UnauthorizedClient,
            TokenError::Storage(_) | TokenError::Key(_) => OAuthErrorCode::ServerError,
        }
    }
}

/// Errors surfaced by a provider's own conversation.
///
/// Provider errors are rendered back into the provider's UI (so the user
/// can retry) and never bubble up to `/token` directly — see §7.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("the code has expired or was already used")]
    CodeInvalid,

    #[error("upstream provider returned an error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{0}")]
    Other(String),
}
