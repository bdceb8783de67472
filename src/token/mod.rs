// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Token Service
//!
//! Mints and verifies access/refresh JWTs, owns authorization-code
//! issuance and consumption, and implements refresh-token rotation with
//! reuse-interval replay and reuse detection, per §4.3.

pub mod claims;
pub mod service;

pub use claims::{AccessTokenClaims, AuthorizationCodeRecord, RefreshTokenRecord, TokenPair};
pub use service::{IntrospectionResponse, TokenService, TokenServiceConfig};
