// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Build and version information, stamped at compile time by `build.rs`.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit_short: &'static str,
    pub git_commit_full: &'static str,
    pub git_commit_date: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
    pub target_triple: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn get() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit_short: env!("GIT_COMMIT_HASH_SHORT"),
            git_commit_full: env!("GIT_COMMIT_HASH_FULL"),
            git_commit_date: env!("GIT_COMMIT_DATE"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("BUILD_RUSTC_VERSION"),
            target_triple: env!("BUILD_TARGET"),
            profile: if cfg!(debug_assertions) { "debug" } else { "release" },
        }
    }

    /// Example: "0.1.0-a1b2c3d (2025-06-27 14:30:00 UTC)"
    pub fn version_string(&self) -> String {
        format!("{}-{} ({})", self.version, self.git_commit_short, self.git_commit_date)
    }

    pub fn full_info(&self) -> String {
        format!(
            "Version: {}\nHash: {} ({})\nBuild Time: {}\nRust Version: {}\nTarget: {}\nProfile: {}",
            self.version,
            self.git_commit_short,
            self.git_commit_date,
            self.build_timestamp,
            self.rustc_version,
            self.target_triple,
            self.profile
        )
    }

    pub fn is_dirty_build(&self) -> bool {
        self.git_commit_short.ends_with("-dirty") || self.git_commit_full.ends_with("-dirty")
    }

    pub fn clean_commit_hash(&self) -> &str {
        if self.is_dirty_build() {
            &self.git_commit_short[..self.git_commit_short.len() - 6]
        } else {
            self.git_commit_short
        }
    }

    pub fn commit_datetime(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_str(self.git_commit_date, "%Y-%m-%d %H:%M:%S %z").map(|dt| dt.with_timezone(&Utc))
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_is_populated() {
        let info = BuildInfo::get();
        assert!(!info.version.is_empty());
        assert!(!info.git_commit_short.is_empty());
        assert!(info.git_commit_short.len() <= info.git_commit_full.len());
    }

    #[test]
    fn version_string_contains_version_and_hash() {
        let info = BuildInfo::get();
        let version_str = info.version_string();
        assert!(version_str.contains(info.version));
        assert!(version_str.contains(info.clean_commit_hash()));
    }
}
