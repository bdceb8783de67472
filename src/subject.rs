// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! # Subject Registry
//!
//! A subject is a tagged record `{type, id?, properties}`. Each subject
//! `type` has a registered schema that validates the untyped `properties`
//! value at both encode (mint) and decode (verify) time, so a property the
//! issuer stops emitting still parses on clients until they upgrade.
//!
//! Grounded on the teacher's JWT claims struct (fixed fields, validated on
//! decode), generalized from one claims shape to a registry of
//! caller-supplied schemas keyed by a `type` discriminator.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A fully resolved subject: its schema type, stable identifier, and the
/// schema-validated properties payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    pub properties: Value,
}

/// A subject-schema validator: accepts an untyped JSON value and either
/// returns the (possibly normalized) validated value or an error message.
///
/// Schemas are standard-schema-compatible in spirit: they own the shape of
/// `properties` for one subject `type` and are re-run on both mint and
/// verify, per §3.2.
pub trait SubjectSchema: Send + Sync {
    fn validate(&self, properties: &Value) -> Result<Value, String>;
}

/// A schema that accepts any JSON object without further validation.
/// Useful for prototyping and for subject types whose shape is enforced
/// entirely by the provider that produces them.
pub struct OpenSchema;

impl SubjectSchema for OpenSchema {
    fn validate(&self, properties: &Value) -> Result<Value, String> {
        if properties.is_object() {
            Ok(properties.clone())
        } else {
            Err("properties must be a JSON object".to_string())
        }
    }
}

/// The registry of subject-type schemas an issuer instance is configured
/// with. Unknown `type`s fail validation rather than falling back to
/// [`OpenSchema`], so misconfigured subject minting is caught early.
#[derive(Clone, Default)]
pub struct SubjectRegistry {
    schemas: HashMap<String, Arc<dyn SubjectSchema>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        SubjectRegistry {
            schemas: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: impl Into<String>, schema: Arc<dyn SubjectSchema>) {
        self.schemas.insert(type_name.into(), schema);
    }

    /// Validates `properties` against the schema registered for `type_name`
    /// and builds a [`Subject`], defaulting `id` per §3.2 when absent.
    pub fn resolve(
        &self,
        type_name: &str,
        id: Option<String>,
        properties: Value,
    ) -> Result<Subject, String> {
        let schema = self
            .schemas
            .get(type_name)
            .ok_or_else(|| format!("no schema registered for subject type `{type_name}`"))?;
        let validated = schema.validate(&properties)?;
        let id = id.unwrap_or_else(|| default_subject_id(&validated));
        Ok(Subject {
            type_: type_name.to_string(),
            id,
            properties: validated,
        })
    }

    /// Re-validates a subject's properties against its registered schema,
    /// used on token verification per §4.3.
    pub fn revalidate(&self, subject: &Subject) -> Result<(), String> {
        let schema = self
            .schemas
            .get(&subject.type_)
            .ok_or_else(|| format!("no schema registered for subject type `{}`", subject.type_))?;
        schema.validate(&subject.properties).map(|_| ())
    }
}

/// Deterministic subject ID: SHA-256 over the canonical (sorted-key) JSON
/// encoding of `properties`, base64url-encoded and truncated to 22
/// characters, per the §3 data-model supplement.
pub fn default_subject_id(properties: &Value) -> String {
    let canonical = canonicalize(properties);
    let digest = Sha256::digest(canonical.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.chars().take(22).collect()
}

/// Serializes a JSON value with object keys sorted, so semantically
/// identical properties always hash to the same subject ID regardless of
/// field insertion order.
fn canonicalize(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted = serde_json::Map::new();
                for (k, v) in entries {
                    sorted.insert(k.clone(), sort(v));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_subject_id_is_order_independent() {
        let a = json!({"userID": "123", "email": "a@b.com"});
        let b = json!({"email": "a@b.com", "userID": "123"});
        assert_eq!(default_subject_id(&a), default_subject_id(&b));
    }

    #[test]
    fn default_subject_id_differs_for_different_properties() {
        let a = json!({"userID": "123"});
        let b = json!({"userID": "456"});
        assert_ne!(default_subject_id(&a), default_subject_id(&b));
    }

    #[test]
    fn resolve_uses_explicit_id_when_given() {
        let mut registry = SubjectRegistry::new();
        registry.register("user", Arc::new(OpenSchema));
        let subject = registry
            .resolve("user", Some("explicit-id".to_string()), json!({"userID": "123"}))
            .unwrap();
        assert_eq!(subject.id, "explicit-id");
    }

    #[test]
    fn resolve_rejects_unknown_type() {
        let registry = SubjectRegistry::new();
        let result = registry.resolve("user", None, json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn open_schema_rejects_non_object_properties() {
        let schema = OpenSchema;
        assert!(schema.validate(&json!("not an object")).is_err());
    }
}
