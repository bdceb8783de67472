// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Self-hosted OAuth 2.1 / OpenID-Connect identity issuer with pluggable
//! identity providers.
//!
//! The issuer is assembled from independently testable components: a
//! hierarchical [`storage`] adapter, rotating ES256 signing [`keys`], a
//! [`token`] service implementing the refresh-token rotation state machine,
//! a [`subject`] schema registry, a [`provider`] protocol for identity
//! conversations, and an [`http`] layer wiring all of it into a Rocket
//! application. See `DESIGN.md` for the grounding of each module.

pub mod build_info;
pub mod config;
pub mod error;
pub mod http;
pub mod keys;
pub mod provider;
pub mod scope;
pub mod storage;
pub mod subject;
pub mod token;
