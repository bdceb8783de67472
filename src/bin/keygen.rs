// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # ES256 Key Generator
//!
//! Generates a P-256 key pair for JWT signing in ES256 format and writes the
//! private and public halves as separate PEM files, plus the public key's
//! RFC 7638 thumbprint so it can be cross-checked against a running issuer's
//! `/.well-known/jwks.json`.
//!
//! ## Usage
//!
//! ```text
//! openauth-keygen [OPTIONS]
//! ```
//!
//! - `--out-private-key <PATH>`: private key PEM output path (default: "./private.pem")
//! - `--out-pub-key <PATH>`: public key PEM output path (default: "./public.pem")
//!
//! The issuer itself generates and rotates its own signing keys at startup
//! (see [`openauth_issuer::keys::KeyManager`]); this binary is for operators
//! who need a key pair outside the issuer process, e.g. to pre-provision a
//! client's expected `kid` or to inspect a key offline.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use openauth_issuer::keys::jwk::thumbprint;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Generate a P-256 key pair for ES256 JWT signing")]
struct Args {
    /// Output path for the private key PEM file (PKCS#8).
    #[clap(long, default_value = "./private.pem")]
    out_private_key: PathBuf,

    /// Output path for the public key PEM file (SubjectPublicKeyInfo).
    #[clap(long, default_value = "./public.pem")]
    out_pub_key: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = *signing_key.verifying_key();

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key to PEM")?;
    let public_pem = verifying_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to encode public key to PEM")?;

    fs::write(&args.out_private_key, private_pem.as_bytes())
        .with_context(|| format!("failed to write private key to {:?}", args.out_private_key))?;
    fs::write(&args.out_pub_key, public_pem.as_bytes())
        .with_context(|| format!("failed to write public key to {:?}", args.out_pub_key))?;

    let kid = thumbprint(&verifying_key).context("failed to compute JWK thumbprint")?;

    println!("Private key written to: {:?}", args.out_private_key);
    println!("Public key written to: {:?}", args.out_pub_key);
    println!("JWK thumbprint (kid): {kid}");

    Ok(())
}
