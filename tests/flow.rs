// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! End-to-end coverage of the six concrete scenarios: code flow success,
//! refresh-token reuse interval and reuse detection, a missing refresh
//! token, an expired access token with no refresh option, base-path
//! routing, and scope narrowing.
//!
//! Grounded on the teacher's `rocket::local::asynchronous::Client`-driven
//! flow tests, generalized from a fixed RS256/consent-page flow to this
//! issuer's JSON provider-conversation dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rocket::http::{ContentType, Status};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use openauth_issuer::config::{BindConfig, Config, KeysConfig, StorageBackendKind, StorageConfig, TtlConfig};
use openauth_issuer::error::ProviderError;
use openauth_issuer::http::{self, AllowAll, IssuerState, SuccessMapper};
use openauth_issuer::keys::KeyManager;
use openauth_issuer::provider::{Provider, ProviderContext, ProviderOutcome, ProviderRegistry, ProviderValue};
use openauth_issuer::scope::{parse_scopes, validate_scopes};
use openauth_issuer::storage::memory::MemoryStorage;
use openauth_issuer::storage::StorageAdapter;
use openauth_issuer::subject::{default_subject_id, OpenSchema, Subject, SubjectRegistry};
use openauth_issuer::token::{TokenService, TokenServiceConfig};

/// A provider that completes its conversation on the first step, the way
/// §8 scenario 1's "dummy" provider calls `ctx.success` immediately.
struct DummyProvider;

#[async_trait]
impl Provider for DummyProvider {
    fn type_name(&self) -> &str {
        "dummy"
    }

    async fn handle(&self, _ctx: &ProviderContext, _path: &str, _body: Value) -> Result<ProviderOutcome, ProviderError> {
        Ok(ProviderOutcome::Success(ProviderValue {
            provider: "dummy".to_string(),
            value: json!({"claims": {"email": "a@b.com", "userID": "123"}}),
        }))
    }
}

struct TestSuccessMapper;

#[async_trait]
impl SuccessMapper for TestSuccessMapper {
    async fn map(&self, value: &ProviderValue) -> Result<Subject, ProviderError> {
        let properties = value.value.get("claims").cloned().unwrap_or_else(|| value.value.clone());
        let id = default_subject_id(&properties);
        Ok(Subject {
            type_: "user".to_string(),
            id,
            properties,
        })
    }
}

fn minimal_config(base_path: &str) -> Config {
    Config {
        issuer: "https://issuer.example".to_string(),
        base_path: base_path.to_string(),
        log_level: "info".to_string(),
        bind: BindConfig::default(),
        tls: None,
        storage: StorageConfig {
            backend: StorageBackendKind::Memory,
            ..StorageConfig::default()
        },
        ttl: TtlConfig {
            access: 30,
            refresh: 3600,
            reuse: 1,
            retention: 3,
        },
        keys: KeysConfig::default(),
    }
}

/// Builds a ready-to-dispatch app plus the `TokenService` handle the test
/// uses to mint tokens directly, bypassing HTTP where a scenario needs
/// precise timing control.
async fn build_app(config: Config) -> (rocket::Rocket<rocket::Build>, Arc<TokenService>) {
    let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
    let keys = Arc::new(KeyManager::new(storage.clone(), Duration::from_secs(3600)));
    keys.rotate().await.unwrap();

    let mut registry = SubjectRegistry::new();
    registry.register("user", Arc::new(OpenSchema));
    let subjects = Arc::new(registry);

    let token_config = TokenServiceConfig {
        issuer: config.issuer.clone(),
        access_ttl_secs: config.ttl.access,
        refresh_ttl_secs: config.ttl.refresh,
        reuse_interval_secs: config.ttl.reuse,
        retention_secs: config.ttl.retention,
        code_ttl_secs: 60,
    };
    let tokens = Arc::new(TokenService::new(storage.clone(), keys.clone(), subjects.clone(), token_config));

    let mut providers = ProviderRegistry::new();
    providers.register("dummy", Arc::new(DummyProvider));

    let state = IssuerState {
        config,
        storage,
        keys,
        tokens: tokens.clone(),
        subjects,
        providers: Arc::new(providers),
        success: Arc::new(TestSuccessMapper),
        allow: Arc::new(AllowAll),
    };

    (http::build(state), tokens)
}

fn pkce_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn extract_query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

#[rocket::async_test]
async fn scenario_1_code_flow_success() {
    let (rocket, _tokens) = build_app(minimal_config("")).await;
    let client = rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance");

    let verifier = "a-fixed-test-code-verifier-that-is-long-enough";
    let challenge = pkce_s256(verifier);

    let authorize_url = format!(
        "/authorize?client_id=client-x&redirect_uri=https://client.example/cb&response_type=code&code_challenge={challenge}&code_challenge_method=S256"
    );
    let authorize_response = client.get(&authorize_url).dispatch().await;
    assert_eq!(authorize_response.status(), Status::Found);
    let provider_location = authorize_response
        .headers()
        .get_one("Location")
        .expect("authorize should redirect to the provider route")
        .to_string();
    assert_eq!(provider_location, "/dummy/authorize");

    // The tracked client carries the `openauth_state` cookie set by `/authorize`.
    let provider_response = client
        .post(&provider_location)
        .header(ContentType::JSON)
        .body("{}")
        .dispatch()
        .await;
    assert_eq!(provider_response.status(), Status::Found);
    let redirect = provider_response
        .headers()
        .get_one("Location")
        .expect("provider success redirects with a code")
        .to_string();
    let code = extract_query_param(&redirect, "code").expect("redirect should carry an authorization code");

    let form = format!(
        "grant_type=authorization_code&code={code}&redirect_uri=https%3A%2F%2Fclient.example%2Fcb&code_verifier={verifier}"
    );
    let token_response = client.post("/token").header(ContentType::Form).body(form).dispatch().await;
    assert_eq!(token_response.status(), Status::Ok);
    let token_json: Value = serde_json::from_str(&token_response.into_string().await.unwrap()).unwrap();
    assert_eq!(token_json["expires_in"], 30);
    assert!(token_json["access_token"].as_str().unwrap().split('.').count() == 3);

    let jwks_response = client.get("/.well-known/jwks.json").dispatch().await;
    assert_eq!(jwks_response.status(), Status::Ok);
    let jwks_json: Value = serde_json::from_str(&jwks_response.into_string().await.unwrap()).unwrap();
    assert!(!jwks_json["keys"].as_array().unwrap().is_empty());
}

#[rocket::async_test]
async fn scenario_1_wrong_pkce_verifier_is_rejected() {
    let (rocket, tokens) = build_app(minimal_config("")).await;
    let client = rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance");

    let challenge = pkce_s256("the-real-verifier");
    let record = openauth_issuer::token::AuthorizationCodeRecord {
        subject_type: "user".to_string(),
        subject_id: "user-1".to_string(),
        properties: json!({"userID": "123"}),
        client_id: "client-x".to_string(),
        redirect_uri: "https://client.example/cb".to_string(),
        code_challenge: Some(challenge),
        code_challenge_method: Some("S256".to_string()),
        scopes: None,
    };
    let code = tokens.mint_authorization_code(record).await.unwrap();

    let form = format!("grant_type=authorization_code&code={code}&redirect_uri=https%3A%2F%2Fclient.example%2Fcb&code_verifier=not-the-real-verifier");
    let response = client.post("/token").header(ContentType::Form).body(form).dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["error"], "invalid_grant");
}

#[rocket::async_test]
async fn scenario_2_refresh_reuse_interval_then_reuse_detection() {
    let (rocket, tokens) = build_app(minimal_config("")).await;
    let client = rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance");

    let subject = Subject {
        type_: "user".to_string(),
        id: "user-1".to_string(),
        properties: json!({"userID": "123"}),
    };
    let pair0 = tokens.mint_pair("client-x", &subject, None).await.unwrap();
    let refresh0 = pair0.refresh_token.unwrap();

    let first = client
        .post("/token")
        .header(ContentType::Form)
        .body(format!("grant_type=refresh_token&refresh_token={refresh0}"))
        .dispatch()
        .await;
    assert_eq!(first.status(), Status::Ok);
    let first_json: Value = serde_json::from_str(&first.into_string().await.unwrap()).unwrap();
    let refresh1 = first_json["refresh_token"].as_str().unwrap().to_string();

    // Within the 1s reuse interval: replays the same next refresh token and
    // the exact same access token payload (same `iat`/`exp`), not a freshly
    // minted one.
    let replay = client
        .post("/token")
        .header(ContentType::Form)
        .body(format!("grant_type=refresh_token&refresh_token={refresh0}"))
        .dispatch()
        .await;
    assert_eq!(replay.status(), Status::Ok);
    let replay_json: Value = serde_json::from_str(&replay.into_string().await.unwrap()).unwrap();
    assert_eq!(replay_json["refresh_token"], refresh1);
    assert_eq!(replay_json["access_token"], first_json["access_token"]);

    // Past the 1s reuse window but still within the 3s retention buffer, so
    // the stale presentation reaches the explicit reuse-detection chain
    // walk rather than simply finding an absent record.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let late = client
        .post("/token")
        .header(ContentType::Form)
        .body(format!("grant_type=refresh_token&refresh_token={refresh0}"))
        .dispatch()
        .await;
    assert_eq!(late.status(), Status::BadRequest);
    let late_json: Value = serde_json::from_str(&late.into_string().await.unwrap()).unwrap();
    assert_eq!(late_json["error"], "invalid_grant");

    let descendant_refresh = client
        .post("/token")
        .header(ContentType::Form)
        .body(format!("grant_type=refresh_token&refresh_token={refresh1}"))
        .dispatch()
        .await;
    assert_eq!(descendant_refresh.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn scenario_3_missing_refresh_token_is_invalid_request() {
    let (rocket, _tokens) = build_app(minimal_config("")).await;
    let client = rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance");

    let response = client
        .post("/token")
        .header(ContentType::Form)
        .body("grant_type=refresh_token&refresh_token=")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["error"], "invalid_request");
}

#[rocket::async_test]
async fn scenario_4_expired_access_token_without_refresh_is_rejected() {
    let mut config = minimal_config("");
    config.ttl.access = 1;
    let (_rocket, tokens) = build_app(config).await;

    let subject = Subject {
        type_: "user".to_string(),
        id: "user-1".to_string(),
        properties: json!({"userID": "123"}),
    };
    let access_token = tokens.mint_access("client-x", &subject, None).unwrap();
    assert!(tokens.verify_access(&access_token, None).is_ok());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(tokens.verify_access(&access_token, None).is_err());
}

#[rocket::async_test]
async fn scenario_5_base_path_routes_internally_and_advertises_prefixed_metadata() {
    let (rocket, _tokens) = build_app(minimal_config("/superbasepath")).await;
    let client = rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance");

    let unprefixed = client.get("/.well-known/oauth-authorization-server").dispatch().await;
    assert_eq!(unprefixed.status(), Status::NotFound);

    let prefixed = client.get("/superbasepath/.well-known/oauth-authorization-server").dispatch().await;
    assert_eq!(prefixed.status(), Status::Ok);
    let metadata: Value = serde_json::from_str(&prefixed.into_string().await.unwrap()).unwrap();
    assert_eq!(
        metadata["authorization_endpoint"],
        "https://issuer.example/superbasepath/authorize"
    );
    assert_eq!(metadata["token_endpoint"], "https://issuer.example/superbasepath/token");
}

#[test]
fn scenario_6_scope_narrowing() {
    assert_eq!(parse_scopes("foo bar"), vec!["foo", "bar"]);
    assert_eq!(
        validate_scopes(Some("foo bar"), Some(&["foo".to_string()])),
        Some(vec!["foo".to_string()])
    );
    assert_eq!(validate_scopes(Some("bar"), Some(&["foo".to_string()])), Some(vec![]));
    assert_eq!(
        validate_scopes(None, Some(&["foo".to_string()])),
        Some(vec!["foo".to_string()])
    );
    assert_eq!(validate_scopes(Some("foo"), None), None);
}
