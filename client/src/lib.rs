// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Client library for the openauth_issuer, implementing §4.6: authorize-URL
//! construction (with optional PKCE), code exchange, refresh with a
//! short-circuit for still-valid access tokens, signature verification
//! against a cached JWKS, and unverified decode for trusted ingress.

pub mod client;
pub mod error;
pub mod jwks_cache;
pub mod pkce;
pub mod transport;

pub use client::{
    AccessTokenClaims, AuthorizeOptions, AuthorizeUrl, Client, OpenSchema, RefreshOptions, Subject, SubjectSchema,
    TokenSet, VerifyOptions,
};
pub use error::ClientError;
pub use pkce::Pkce;
pub use transport::Transport;

#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;
