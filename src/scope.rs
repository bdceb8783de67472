// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Scope Validator
//!
//! Scopes are opaque space-delimited strings intersected by a fixed rule:
//! no enforcement of a particular scope ontology, per §1's Non-goals.

/// Splits a space-delimited scope string into its component tokens,
/// dropping empty tokens produced by repeated whitespace.
pub fn parse_scopes(scopes: &str) -> Vec<String> {
    scopes
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Narrows `requested` scopes against `authorized` scopes per §8 scenario 6:
///
/// - `requested = None` returns every authorized scope unchanged.
/// - `requested = Some(s)` returns the intersection of `s`'s tokens with
///   `authorized`, preserving `requested`'s order.
/// - `authorized = None` means "no restriction configured"; the function
///   returns `None` regardless of `requested`.
pub fn validate_scopes(requested: Option<&str>, authorized: Option<&[String]>) -> Option<Vec<String>> {
    let authorized = authorized?;
    match requested {
        None => Some(authorized.to_vec()),
        Some(raw) => {
            let requested_tokens = parse_scopes(raw);
            Some(
                requested_tokens
                    .into_iter()
                    .filter(|t| authorized.contains(t))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scopes_splits_on_whitespace() {
        assert_eq!(parse_scopes("foo bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn parse_scopes_collapses_repeated_whitespace() {
        assert_eq!(parse_scopes("foo   bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn validate_scopes_intersects_requested_with_authorized() {
        let authorized = vec!["foo".to_string()];
        assert_eq!(
            validate_scopes(Some("foo bar"), Some(&authorized)),
            Some(vec!["foo".to_string()])
        );
    }

    #[test]
    fn validate_scopes_empty_intersection() {
        let authorized = vec!["foo".to_string()];
        assert_eq!(validate_scopes(Some("bar"), Some(&authorized)), Some(vec![]));
    }

    #[test]
    fn validate_scopes_none_requested_returns_authorized() {
        let authorized = vec!["foo".to_string()];
        assert_eq!(validate_scopes(None, Some(&authorized)), Some(authorized));
    }

    #[test]
    fn validate_scopes_no_authorization_configured_returns_none() {
        assert_eq!(validate_scopes(Some("foo"), None), None);
    }
}
