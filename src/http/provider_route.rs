// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Provider sub-route dispatcher, mounted at `/<providerName>/<path..>`,
//! per §4.4's "Provider sub-routes" section.
//!
//! Both a `GET` and a `POST` variant dispatch into the same provider, since
//! §4.5 requires some steps to be browser-navigable (an upstream OAuth2/OIDC
//! redirect landing back as `GET .../callback?code=...`, a magic-link email
//! landing as a clicked `GET .../callback?token=...`) and others to be
//! submitted as JSON (a password form's credentials). `GET` query
//! parameters are folded into the same `serde_json::Value` shape a `POST`
//! JSON body would carry, so a provider's `handle` never needs to know
//! which transport reached it.
//!
//! A conversation that completes (`ProviderOutcome::Success`) always ends
//! in a real HTTP redirect back to the client's `redirect_uri`, per §8
//! scenario 1's "browser follows the 302 chain to `redirect_uri?code=...`"
//! requirement — this is what makes the GET path the one browsers actually
//! need. A conversation that isn't finished (`ProviderOutcome::Forward`)
//! stays a JSON body, since it's meant for an embedder's own UI to render
//! and continue, not to navigate anywhere.

use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::{Request, State};
use serde_json::{Map, Value};

use super::authorize::AuthorizeRequest;
use super::errors::OAuthErrorResponse;
use super::guards::ConversationId;
use super::IssuerState;
use crate::error::OAuthErrorCode;
use crate::provider::{ProviderContext, ProviderOutcome};
use crate::token::AuthorizationCodeRecord;

/// A GET request's query string, folded into the same JSON shape a POST
/// body would take. Always succeeds — a missing or unparseable query
/// string is just an empty object, left to the provider to reject as it
/// would reject a POST body missing the same fields.
pub struct QueryBody(pub Value);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for QueryBody {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let pairs: Vec<(String, String)> = request
            .uri()
            .query()
            .map(|q| q.to_string())
            .and_then(|q| serde_urlencoded::from_str(&q).ok())
            .unwrap_or_default();
        let map: Map<String, Value> = pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        Outcome::Success(QueryBody(Value::Object(map)))
    }
}

#[derive(rocket::Responder)]
pub enum ProviderRouteResponse {
    Redirect(Redirect),
    Forwarded(Json<Value>),
}

#[rocket::post("/<provider_name>/<path..>", data = "<body>", rank = 1)]
pub async fn provider_route_post(
    provider_name: &str,
    path: std::path::PathBuf,
    body: Json<Value>,
    conversation: ConversationId,
    state: &State<IssuerState>,
) -> Result<ProviderRouteResponse, OAuthErrorResponse> {
    dispatch(provider_name, &path, body.into_inner(), conversation, state).await
}

#[rocket::get("/<provider_name>/<path..>", rank = 2)]
pub async fn provider_route_get(
    provider_name: &str,
    path: std::path::PathBuf,
    query: QueryBody,
    conversation: ConversationId,
    state: &State<IssuerState>,
) -> Result<ProviderRouteResponse, OAuthErrorResponse> {
    dispatch(provider_name, &path, query.0, conversation, state).await
}

async fn dispatch(
    provider_name: &str,
    path: &std::path::Path,
    body: Value,
    conversation: ConversationId,
    state: &State<IssuerState>,
) -> Result<ProviderRouteResponse, OAuthErrorResponse> {
    let provider = state
        .providers
        .get(provider_name)
        .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidRequest, "unknown provider"))?;

    let ctx = ProviderContext::new(conversation.0.clone(), state.storage.clone());
    let path_str = path.to_string_lossy().to_string();

    let outcome = provider
        .handle(&ctx, &path_str, body)
        .await
        .map_err(|e| OAuthErrorResponse::new(OAuthErrorCode::AccessDenied, e.to_string()))?;

    match outcome {
        ProviderOutcome::Forward(body) => {
            let value: Value = serde_json::from_str(&body).unwrap_or(Value::String(body));
            Ok(ProviderRouteResponse::Forwarded(Json(value)))
        }
        ProviderOutcome::Success(provider_value) => {
            let request: AuthorizeRequest = ctx
                .get("authorize_request")
                .await
                .map_err(|_| OAuthErrorResponse::new(OAuthErrorCode::ServerError, "conversation state lost"))?
                .ok_or_else(|| OAuthErrorResponse::new(OAuthErrorCode::InvalidRequest, "unknown conversation"))?;

            let subject = state
                .success
                .map(&provider_value)
                .await
                .map_err(|e| OAuthErrorResponse::new(OAuthErrorCode::ServerError, e.to_string()))?;

            let scopes = crate::scope::validate_scopes(request.scope.as_deref(), None);

            if request.response_type == "code" {
                let record = AuthorizationCodeRecord {
                    subject_type: subject.type_.clone(),
                    subject_id: subject.id.clone(),
                    properties: subject.properties.clone(),
                    client_id: request.client_id.clone(),
                    redirect_uri: request.redirect_uri.clone(),
                    code_challenge: request.code_challenge.clone(),
                    code_challenge_method: request.code_challenge_method.clone(),
                    scopes,
                };
                let code = state
                    .tokens
                    .mint_authorization_code(record)
                    .await
                    .map_err(OAuthErrorResponse::from)?;
                let mut url = url::Url::parse(&request.redirect_uri)
                    .map_err(|_| OAuthErrorResponse::new(OAuthErrorCode::ServerError, "invalid redirect_uri"))?;
                url.query_pairs_mut().append_pair("code", &code);
                if let Some(state_param) = &request.state {
                    url.query_pairs_mut().append_pair("state", state_param);
                }
                Ok(ProviderRouteResponse::Redirect(Redirect::to(url.to_string())))
            } else {
                let pair = state
                    .tokens
                    .mint_pair(&request.client_id, &subject, scopes)
                    .await
                    .map_err(OAuthErrorResponse::from)?;
                let mut url = url::Url::parse(&request.redirect_uri)
                    .map_err(|_| OAuthErrorResponse::new(OAuthErrorCode::ServerError, "invalid redirect_uri"))?;
                let fragment = format!(
                    "access_token={}&token_type=Bearer&expires_in={}",
                    pair.access_token, pair.expires_in
                );
                url.set_fragment(Some(&fragment));
                Ok(ProviderRouteResponse::Redirect(Redirect::to(url.to_string())))
            }
        }
    }
}
