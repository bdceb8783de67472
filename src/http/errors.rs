// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! JSON OAuth error responses, per §7's propagation policy: `/token`
//! failures return RFC 6749 §5.2 JSON bodies; `/authorize` failures
//! redirect once `redirect_uri` is validated, or return a plain HTTP error
//! before that point.

use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;

use crate::error::{OAuthErrorCode, TokenError};

#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

/// A `/token`-shaped JSON error response, carrying the HTTP status RFC
/// 6749 §5.2 associates with each `error` code.
pub struct OAuthErrorResponse {
    pub status: Status,
    pub body: OAuthErrorBody,
}

impl OAuthErrorResponse {
    pub fn new(code: OAuthErrorCode, description: impl Into<String>) -> Self {
        let status = match code {
            OAuthErrorCode::InvalidClient | OAuthErrorCode::UnauthorizedClient => Status::Unauthorized,
            OAuthErrorCode::ServerError => Status::InternalServerError,
            OAuthErrorCode::TemporarilyUnavailable => Status::ServiceUnavailable,
            _ => Status::BadRequest,
        };
        OAuthErrorResponse {
            status,
            body: OAuthErrorBody {
                error: code.as_str(),
                error_description: description.into(),
            },
        }
    }
}

impl From<TokenError> for OAuthErrorResponse {
    fn from(err: TokenError) -> Self {
        let code = err.oauth_code();
        // Storage-adapter failures are server_error with no sensitive
        // detail returned to the client, per §7.
        let description = match &err {
            TokenError::Storage(_) | TokenError::Key(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        };
        OAuthErrorResponse::new(code, description)
    }
}

impl<'r> Responder<'r, 'static> for OAuthErrorResponse {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let mut response = Json(self.body).respond_to(request)?;
        response.set_status(self.status);
        Ok(response)
    }
}

/// Builds a `302` redirect back to `redirect_uri` carrying `error` and
/// `error_description`, used once `redirect_uri` has already been
/// validated (never before, to avoid redirecting to an untrusted URL).
pub fn error_redirect(redirect_uri: &str, state: Option<&str>, code: OAuthErrorCode, description: &str) -> String {
    let mut url = url::Url::parse(redirect_uri).expect("redirect_uri must already be validated");
    url.query_pairs_mut()
        .append_pair("error", code.as_str())
        .append_pair("error_description", description);
    if let Some(state) = state {
        url.query_pairs_mut().append_pair("state", state);
    }
    url.into()
}
