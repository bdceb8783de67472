// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! `GET /authorize` and the provider sub-route dispatcher, per §4.4.
//!
//! All request inputs are persisted in the provider conversation keyspace
//! under a server-generated request ID stored in the `openauth_state`
//! cookie, matching §4.4's "All request inputs are persisted..." clause.

use rocket::http::{Cookie, CookieJar};
use rocket::response::Redirect;
use rocket::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{error_redirect, OAuthErrorResponse};
use super::guards::CONVERSATION_COOKIE;
use super::IssuerState;
use crate::error::OAuthErrorCode;
use crate::provider::ProviderContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub provider: Option<String>,
}

#[rocket::get("/authorize?<client_id>&<redirect_uri>&<response_type>&<state>&<scope>&<code_challenge>&<code_challenge_method>&<provider>")]
#[allow(clippy::too_many_arguments)]
pub async fn authorize(
    client_id: String,
    redirect_uri: String,
    response_type: String,
    state: Option<String>,
    scope: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    provider: Option<String>,
    app_state: &State<IssuerState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, OAuthErrorResponse> {
    // redirect_uri isn't trusted yet, so a validation failure here returns
    // a plain HTTP error rather than redirecting, per §7.
    if !app_state.allow.allow(&client_id, &redirect_uri) {
        return Err(OAuthErrorResponse::new(
            OAuthErrorCode::UnauthorizedClient,
            "client is not authorized to use this redirect_uri",
        ));
    }
    if response_type != "code" && response_type != "token" {
        // redirect_uri has already passed the allow-guard above, so this
        // failure redirects with error params rather than returning a
        // bare HTTP error, per §7.
        let target = error_redirect(
            &redirect_uri,
            state.as_deref(),
            OAuthErrorCode::UnsupportedResponseType,
            "response_type must be `code` or `token`",
        );
        return Ok(Redirect::to(target));
    }

    let request = AuthorizeRequest {
        client_id,
        redirect_uri: redirect_uri.clone(),
        response_type,
        state,
        scope,
        code_challenge,
        code_challenge_method,
        provider,
    };

    let request_id = Uuid::new_v4().to_string();
    let ctx = ProviderContext::new(request_id.clone(), app_state.storage.clone());
    ctx.set("authorize_request", 600, &request)
        .await
        .map_err(|_| OAuthErrorResponse::new(OAuthErrorCode::ServerError, "failed to persist conversation state"))?;

    cookies.add_private(Cookie::new(CONVERSATION_COOKIE, request_id));

    let provider_name = match &request.provider {
        Some(name) => name.clone(),
        None => {
            let names = app_state.providers.names();
            if names.len() == 1 {
                names[0].to_string()
            } else {
                // More than one provider configured and none chosen: a
                // real deployment renders a selection page here. Returning
                // a redirect to the bare provider root lets an embedder's
                // own UI take over; see §1's Non-goals (no UI framework).
                return Ok(Redirect::to(format!("{}/select", app_state.config.base_path)));
            }
        }
    };

    Ok(Redirect::to(format!(
        "{}/{}/authorize",
        app_state.config.base_path, provider_name
    )))
}

