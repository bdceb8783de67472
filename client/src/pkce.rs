// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! PKCE verifier/challenge generation, mirroring the issuer's S256 check in
//! `token_endpoint::verify_pkce`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

/// Generates a fresh PKCE verifier (43 base64url characters from 32 random
/// bytes) and its S256 challenge.
pub fn generate() -> Pkce {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    Pkce {
        verifier,
        challenge,
        method: "S256",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_challenge_matches_verifier() {
        let pkce = generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
        assert_eq!(pkce.method, "S256");
    }

    #[test]
    fn generated_verifiers_are_distinct() {
        assert_ne!(generate().verifier, generate().verifier);
    }
}
