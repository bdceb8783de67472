// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! JWK / JWKS representation and RFC 7638 thumbprints
//!
//! The teacher computed `kid` values from an RSA modulus; this generalizes
//! the same idea to EC P-256 keys: the thumbprint is the base64url-encoded
//! SHA-256 digest of the canonical JSON `{"crv":...,"kty":"EC","x":...,"y":...}`
//! member ordering RFC 7638 §3.2 requires.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::VerifyingKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

fn coordinates(key: &VerifyingKey) -> (String, String) {
    let point = key.to_encoded_point(false);
    let x = URL_SAFE_NO_PAD.encode(point.x().expect("uncompressed point has x"));
    let y = URL_SAFE_NO_PAD.encode(point.y().expect("uncompressed point has y"));
    (x, y)
}

/// Computes the RFC 7638 thumbprint of a P-256 public key, used as `kid`.
pub fn thumbprint(key: &VerifyingKey) -> Result<String, serde_json::Error> {
    let (x, y) = coordinates(key);
    // Member order is part of the spec: crv, kty, x, y, lexicographically.
    let canonical = serde_json::json!({
        "crv": "P-256",
        "kty": "EC",
        "x": x,
        "y": y,
    });
    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

impl Jwk {
    pub fn from_verifying_key(kid: &str, key: &VerifyingKey) -> Result<Self, serde_json::Error> {
        let (x, y) = coordinates(key);
        Ok(Jwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x,
            y,
            use_: "sig".to_string(),
            alg: "ES256".to_string(),
            kid: kid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;

    #[test]
    fn thumbprint_is_stable_for_the_same_key() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        let a = thumbprint(&verifying_key).unwrap();
        let b = thumbprint(&verifying_key).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_have_different_thumbprints() {
        let k1 = *SigningKey::random(&mut OsRng).verifying_key();
        let k2 = *SigningKey::random(&mut OsRng).verifying_key();
        assert_ne!(thumbprint(&k1).unwrap(), thumbprint(&k2).unwrap());
    }

    #[test]
    fn jwk_serializes_expected_fields() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        let kid = thumbprint(&verifying_key).unwrap();
        let jwk = Jwk::from_verifying_key(&kid, &verifying_key).unwrap();
        let value = serde_json::to_value(&jwk).unwrap();
        assert_eq!(value["kty"], "EC");
        assert_eq!(value["alg"], "ES256");
        assert_eq!(value["use"], "sig");
    }
}
