use std::collections::HashMap;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
};
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::auth::{LogoutResponse, MeResponse, SignInRedirect, TokenInfo, TokenResponse},
    auth::{
        current_principal::CurrentPrincipal,
        federated::{FederatedScheme, sanitize_return_url},
        ticket::{TicketItem, TicketItems},
    },
    errors::Error,
};

/// Where browsers are sent to start a federated sign-in.
pub const LOGIN_PATH: &str = "/authentication/login";
/// Where the identity provider sends the browser back to.
pub const CALLBACK_PATH: &str = "/authentication/callback";
pub const LOGOUT_PATH: &str = "/authentication/logout";
pub const ME_PATH: &str = "/authentication/me";
pub const TOKEN_PATH: &str = "/authentication/token";

fn federated(state: &AppState) -> Result<&FederatedScheme, Error> {
    state.selector.federated().ok_or_else(|| Error::BadRequest {
        message: "Federated sign-in is not enabled".to_string(),
    })
}

/// Start a federated sign-in: redirect to the identity provider, carrying the return url.
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Result<Redirect, Error> {
    let federated = federated(&state)?;
    let return_url = sanitize_return_url(params.get(&state.config.auth.session.return_url_parameter).map(String::as_str));

    let location = federated.challenge(&return_url).await?;
    Ok(Redirect::to(location.as_str()))
}

/// Complete a federated sign-in: validate the callback, build the principal, open a session.
#[instrument(skip_all)]
pub async fn callback(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Result<SignInRedirect, Error> {
    let federated = federated(&state)?;
    let (principal, identity) = federated.complete(&params).await?;

    let return_url = sanitize_return_url(identity.return_url.as_deref());
    let mut items = TicketItems::default()
        .with(TicketItem::ReturnUrl(return_url.clone()))
        .with(TicketItem::IdentityProvider(identity.provider.clone()));
    if let Some(hint) = identity.id_token_hint {
        items.set(TicketItem::IdTokenHint(hint));
    }

    let sign_in = state.selector.sign_in(principal, federated.provider_name(), false, items).await?;
    info!(
        principal_id = %sign_in.ticket.principal().id,
        session_id = %sign_in.session_id,
        provider = %identity.provider,
        "Federated sign-in completed"
    );

    Ok(SignInRedirect {
        location: return_url,
        cookie: sign_in.cookie,
    })
}

/// Revoke the current session and clear every authentication cookie. Sessions that came from the
/// identity provider are also signed out there.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<LogoutResponse, Error> {
    let ticket = state.selector.sign_out(&headers).await?;

    let provider_logout = ticket.as_ref().and_then(|ticket| {
        let federated = state.selector.federated()?;
        ticket.items().identity_provider()?;
        federated
            .logout_redirect(
                ticket.items().id_token_hint(),
                &state.config.auth.federated.post_logout_redirect,
            )
            .map(|url| url.to_string())
    });

    if let Some(ticket) = &ticket {
        info!(principal_id = %ticket.principal().id, "Signed out");
    }

    Ok(LogoutResponse {
        cookies: state.selector.clear_cookies(),
        provider_logout,
    })
}

/// The authenticated principal and the scheme that established it.
#[instrument(skip_all)]
pub async fn me(CurrentPrincipal(resolved): CurrentPrincipal) -> Json<MeResponse> {
    Json(resolved.into())
}

/// Mint a bearer token for the current principal into the bearer cookie.
#[instrument(skip_all, fields(principal_id = %resolved.principal.id))]
pub async fn token(State(state): State<AppState>, CurrentPrincipal(resolved): CurrentPrincipal) -> Result<TokenResponse, Error> {
    let cookie = state.selector.bearer_cookie(&resolved.principal)?;
    let bearer = state.selector.bearer().ok_or_else(|| Error::BadRequest {
        message: "Bearer tokens are not enabled".to_string(),
    })?;

    Ok(TokenResponse {
        info: TokenInfo {
            cookie_name: bearer.cookie_name().to_string(),
            expires_at: state.selector.store().now() + bearer.keys().token_lifetime(),
        },
        cookie,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::auth::{LogoutInfo, MeResponse, TokenInfo},
        auth::{
            selector::SchemeKind,
            ticket::{Claim, ClaimType, Principal},
        },
        authz::policy::names,
        test_utils::{TestApp, create_test_config, set_cookie_headers},
    };
    use axum::http::{StatusCode, header};

    #[tokio::test]
    async fn test_login_redirects_to_provider_with_sanitized_return_url() {
        let app = TestApp::spawn().await;

        let response = app.server.get(LOGIN_PATH).add_query_param("ReturnUrl", "/photos/1").await;
        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.header(header::LOCATION);
        let location = location.to_str().unwrap();
        assert!(location.starts_with("https://idp.example.com/authorize"));
        assert!(location.contains("state=%2Fphotos%2F1"));

        let response = app
            .server
            .get(LOGIN_PATH)
            .add_query_param("ReturnUrl", "https://evil.example.com")
            .await;
        let location = response.header(header::LOCATION);
        assert!(location.to_str().unwrap().ends_with("state=%2F"));
    }

    #[tokio::test]
    async fn test_callback_opens_session_and_redirects() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .get(CALLBACK_PATH)
            .add_query_param("code", "abc")
            .add_query_param("state", "/photos")
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/photos");

        let cookies = set_cookie_headers(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("PhotosApp.Auth="));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(!cookies[0].contains("Max-Age"));
        assert_eq!(app.backend.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_callback_creates_no_session() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .get(CALLBACK_PATH)
            .add_query_param("error", "access_denied")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(set_cookie_headers(&response).is_empty());
        assert!(app.backend.is_empty());
    }

    #[tokio::test]
    async fn test_me_returns_principal_and_scheme() {
        let app = TestApp::spawn().await;
        let cookie = app
            .sign_in(Principal::new("alice", vec![Claim::new(ClaimType::Email, "alice@example.com")]))
            .await;

        let response = app.server.get(ME_PATH).add_header(header::COOKIE, cookie).await;
        response.assert_status_ok();
        let body: MeResponse = response.json();
        assert_eq!(body.id, "alice");
        assert_eq!(body.scheme, SchemeKind::Cookie);
        assert_eq!(body.claims[0].value, "alice@example.com");
    }

    #[tokio::test]
    async fn test_me_without_session_is_unauthorized() {
        let app = TestApp::spawn().await;

        let response = app.server.get(ME_PATH).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unauthorized_not_unavailable() {
        let app = TestApp::spawn().await;
        let cookie = app.sign_in(Principal::new("alice", vec![])).await;

        app.sessions.set_down(true);
        let response = app.server.get(ME_PATH).add_header(header::COOKIE, cookie.clone()).await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        app.sessions.set_down(false);
        let response = app.server.get(ME_PATH).add_header(header::COOKIE, cookie).await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_federated_only_policy_accepts_provider_sessions() {
        let mut config = create_test_config();
        if let Some(policy) = config.policies.get_mut(names::AUTHENTICATED) {
            policy.schemes = vec![SchemeKind::Federated];
        }
        let app = TestApp::spawn_with_config(config).await;

        let response = app.server.get(CALLBACK_PATH).add_query_param("code", "abc").await;
        let session = set_cookie_headers(&response)[0].split(';').next().unwrap().to_string();

        let response = app.server.get(ME_PATH).add_header(header::COOKIE, session).await;
        response.assert_status_ok();
        let body: MeResponse = response.json();
        assert_eq!(body.scheme, SchemeKind::Federated);

        // a local sign-in is not a federated session
        let cookie = app.sign_in(Principal::new("alice", vec![])).await;
        let response = app.server.get(ME_PATH).add_header(header::COOKIE, cookie).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_then_bearer_only_request() {
        let app = TestApp::spawn().await;
        let cookie = app.sign_in(Principal::new("alice", vec![])).await;

        let response = app.server.post(TOKEN_PATH).add_header(header::COOKIE, cookie).await;
        response.assert_status_ok();
        let info: TokenInfo = response.json();
        assert_eq!(info.cookie_name, "PhotosApp.Bearer");

        let bearer_cookie = set_cookie_headers(&response)
            .into_iter()
            .find(|c| c.starts_with("PhotosApp.Bearer="))
            .unwrap();
        let pair = bearer_cookie.split(';').next().unwrap().to_string();

        // no session cookie: the bearer scheme alone authenticates
        let response = app.server.get(ME_PATH).add_header(header::COOKIE, pair).await;
        response.assert_status_ok();
        let body: MeResponse = response.json();
        assert_eq!(body.id, "alice");
        assert_eq!(body.scheme, SchemeKind::Bearer);
    }

    #[tokio::test]
    async fn test_logout_revokes_session_and_clears_cookies() {
        let app = TestApp::spawn().await;
        let cookie = app.sign_in(Principal::new("alice", vec![])).await;

        let response = app.server.post(LOGOUT_PATH).add_header(header::COOKIE, cookie.clone()).await;
        response.assert_status_ok();
        let body: LogoutInfo = response.json();
        assert_eq!(body.message, "Logout successful");

        let cookies = set_cookie_headers(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
        assert!(app.backend.is_empty());

        // the old cookie no longer authenticates
        let response = app.server.get(ME_PATH).add_header(header::COOKIE, cookie).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_after_federated_sign_in_redirects_to_provider() {
        let app = TestApp::spawn().await;

        let response = app
            .server
            .get(CALLBACK_PATH)
            .add_query_param("code", "abc")
            .await;
        let session = set_cookie_headers(&response)[0].split(';').next().unwrap().to_string();

        let response = app.server.post(LOGOUT_PATH).add_header(header::COOKIE, session).await;
        response.assert_status(StatusCode::SEE_OTHER);
        let location = response.header(header::LOCATION);
        let location = location.to_str().unwrap();
        assert!(location.starts_with("https://idp.example.com/logout"));
        assert!(location.contains("id_token_hint=id-token"));
    }

    #[tokio::test]
    async fn test_logout_without_session_still_clears_cookies() {
        let app = TestApp::spawn().await;

        let response = app.server.post(LOGOUT_PATH).await;
        response.assert_status_ok();
        assert_eq!(set_cookie_headers(&response).len(), 2);
    }
}
