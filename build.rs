// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Stamps `build_info::BuildInfo` fields into `env!()` constants, trimmed
//! from the teacher's build script to just the Git/compiler/target metadata
//! it needs (no OpenAPI codegen, no certificate generation).

use std::env;
use std::process::Command;

use anyhow::{Context, Result};

fn get_git_info() -> Result<(String, String, String)> {
    let commit_hash_short = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .context("failed to execute git rev-parse --short HEAD")?;
    if !commit_hash_short.status.success() {
        return Err(anyhow::anyhow!("git rev-parse --short HEAD failed"));
    }

    let commit_hash_full = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .context("failed to execute git rev-parse HEAD")?;
    if !commit_hash_full.status.success() {
        return Err(anyhow::anyhow!("git rev-parse HEAD failed"));
    }

    let commit_date = Command::new("git")
        .args(["log", "-1", "--format=%ci"])
        .output()
        .context("failed to execute git log for commit date")?;
    if !commit_date.status.success() {
        return Err(anyhow::anyhow!("git log failed"));
    }

    let git_status = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .context("failed to execute git status")?;
    let is_dirty = !git_status.stdout.is_empty();

    let short_hash = String::from_utf8_lossy(&commit_hash_short.stdout).trim().to_string();
    let full_hash = String::from_utf8_lossy(&commit_hash_full.stdout).trim().to_string();
    let date = String::from_utf8_lossy(&commit_date.stdout).trim().to_string();

    let final_short_hash = if is_dirty { format!("{short_hash}-dirty") } else { short_hash };
    let final_full_hash = if is_dirty { format!("{full_hash}-dirty") } else { full_hash };

    Ok((final_short_hash, final_full_hash, date))
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    match get_git_info() {
        Ok((short_hash, full_hash, commit_date)) => {
            println!("cargo:rustc-env=GIT_COMMIT_HASH_SHORT={short_hash}");
            println!("cargo:rustc-env=GIT_COMMIT_HASH_FULL={full_hash}");
            println!("cargo:rustc-env=GIT_COMMIT_DATE={commit_date}");
        }
        Err(e) => {
            println!("cargo:warning=failed to get Git information: {e}");
            println!("cargo:rustc-env=GIT_COMMIT_HASH_SHORT=unknown");
            println!("cargo:rustc-env=GIT_COMMIT_HASH_FULL=unknown");
            println!("cargo:rustc-env=GIT_COMMIT_DATE=unknown");
        }
    }

    let build_timestamp = chrono_lite_now();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={build_timestamp}");

    let rustc_version = env::var("RUSTC_VERSION").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_RUSTC_VERSION={rustc_version}");

    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_TARGET={target}");
}

/// Formats the build timestamp without depending on `chrono` from the
/// build-script side (build scripts compile separately from the crate and
/// pulling in a full dependency for one timestamp isn't worth it); `date -u`
/// is available on every platform this crate targets.
fn chrono_lite_now() -> String {
    Command::new("date")
        .args(["-u", "+%Y-%m-%d %H:%M:%S UTC"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
