//! API request/response models for authentication.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    selector::{AuthenticatedPrincipal, SchemeKind},
    ticket::Claim,
};

/// Identity of the caller as resolved by the scheme chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub scheme: SchemeKind,
    pub claims: Vec<Claim>,
}

impl From<AuthenticatedPrincipal> for MeResponse {
    fn from(resolved: AuthenticatedPrincipal) -> Self {
        Self {
            id: resolved.principal.id.as_str().to_string(),
            scheme: resolved.scheme,
            claims: resolved.principal.claims,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Cookie the token was written to. The token itself is never in the body.
    pub cookie_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Bearer token minted into its cookie.
#[derive(Debug)]
pub struct TokenResponse {
    pub info: TokenInfo,
    pub cookie: String,
}

impl IntoResponse for TokenResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(header::SET_COOKIE, self.cookie)], Json(self.info)).into_response()
    }
}

/// Completed federated sign-in: session cookie plus a redirect to the local return url.
#[derive(Debug)]
pub struct SignInRedirect {
    pub location: String,
    pub cookie: String,
}

impl IntoResponse for SignInRedirect {
    fn into_response(self) -> Response {
        ([(header::SET_COOKIE, self.cookie)], Redirect::to(&self.location)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutInfo {
    pub message: String,
}

/// Signed out. Clears every authentication cookie and, after a federated session, sends the
/// browser on to the provider's end-session endpoint.
#[derive(Debug)]
pub struct LogoutResponse {
    pub cookies: Vec<String>,
    pub provider_logout: Option<String>,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        let cookies = AppendHeaders(self.cookies.into_iter().map(|cookie| (header::SET_COOKIE, cookie)));
        match self.provider_logout {
            Some(location) => (cookies, Redirect::to(&location)).into_response(),
            None => (
                cookies,
                Json(LogoutInfo {
                    message: "Logout successful".to_string(),
                }),
            )
                .into_response(),
        }
    }
}
