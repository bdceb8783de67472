// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

use openauth_client::{Client, ReqwestTransport};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "jwks_uri": format!("{}/.well-known/jwks.json", server.uri()),
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn authorize_builds_url_against_discovered_endpoint() {
    let server = MockServer::start().await;
    mock_discovery(&server).await;

    let client = Client::new(server.uri(), "client-x", Box::new(ReqwestTransport::new()));
    let built = client
        .authorize(
            "https://relying-party.example/callback",
            "code",
            openauth_client::AuthorizeOptions {
                state: Some("xyz"),
                pkce: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(built.url.starts_with(&format!("{}/authorize?", server.uri())));
    assert!(built.url.contains("client_id=client-x"));
    assert!(built.url.contains("code_challenge_method=S256"));
    assert!(built.challenge.is_some());
}

#[tokio::test]
async fn exchange_posts_code_and_returns_token_set() {
    let server = MockServer::start().await;
    mock_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a.b.c",
            "refresh_token": "sub:ref:secret",
            "token_type": "Bearer",
            "expires_in": 30,
        })))
        .mount(&server)
        .await;

    let client = Client::new(server.uri(), "client-x", Box::new(ReqwestTransport::new()));
    let tokens = client
        .exchange("some-code", "https://relying-party.example/callback", Some("verifier"))
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "a.b.c");
    assert_eq!(tokens.refresh_token.as_deref(), Some("sub:ref:secret"));
}

#[tokio::test]
async fn exchange_surfaces_issuer_error_response() {
    let server = MockServer::start().await;
    mock_discovery(&server).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "authorization code already used",
        })))
        .mount(&server)
        .await;

    let client = Client::new(server.uri(), "client-x", Box::new(ReqwestTransport::new()));
    let result = client
        .exchange("used-code", "https://relying-party.example/callback", None)
        .await;

    match result {
        Err(openauth_client::ClientError::IssuerError { error, .. }) => assert_eq!(error, "invalid_grant"),
        other => panic!("expected IssuerError, got {other:?}"),
    }
}
