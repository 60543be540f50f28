//! Resolves the principal for a request from the configured authentication schemes.
//!
//! Schemes are tried in the configured priority order, restricted to the schemes the target
//! policy accepts. The first scheme that yields a principal wins; identities from different
//! schemes are never merged. Every scheme failure (unknown session, unreachable store, corrupt
//! ticket, rejected bearer token) counts as "unauthenticated" for that scheme and is recorded for
//! diagnostics only.

use axum::http::HeaderMap;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, trace, warn};

use crate::{
    auth::{
        bearer::{BearerRejection, BearerScheme},
        cookies::{CookieOptions, build_cookie, expired_cookie, read_cookie},
        federated::FederatedScheme,
        ticket::{AuthTicket, Principal, TicketItems},
        ticket_store::{TicketStore, TicketStoreError},
    },
    config::SessionConfig,
    errors::Error,
    types::SessionId,
};

/// Scheme name recorded on tickets created by a local cookie sign-in.
pub const COOKIE_SCHEME_NAME: &str = "Cookies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    Cookie,
    Bearer,
    Federated,
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeKind::Cookie => f.write_str("cookie"),
            SchemeKind::Bearer => f.write_str("bearer"),
            SchemeKind::Federated => f.write_str("federated"),
        }
    }
}

/// Why a scheme that found credentials still produced no principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeFailure {
    SessionNotFound,
    StoreUnavailable,
    CorruptTicket,
    /// Valid session, but its ticket came from a different sign-in scheme
    IssuedByOtherScheme,
    Bearer(BearerRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub principal: Principal,
    pub scheme: SchemeKind,
    /// Present when the principal came from a ticket-store session
    pub session_id: Option<SessionId>,
}

/// Outcome of running the scheme chain for one request.
#[derive(Debug, Clone, Default)]
pub struct Authentication {
    pub principal: Option<AuthenticatedPrincipal>,
    pub failures: Vec<(SchemeKind, SchemeFailure)>,
    /// `Set-Cookie` value to attach to the response after a sliding renewal
    pub refreshed_cookie: Option<String>,
}

/// How to answer a request that needs a principal but has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Redirect(String),
    Unauthorized,
}

/// How to answer an authenticated request that a policy denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forbid {
    Redirect(String),
    Forbidden,
}

/// Result of a successful interactive sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub session_id: SessionId,
    pub ticket: AuthTicket,
    pub cookie: String,
}

pub struct SchemeSelector {
    store: TicketStore,
    bearer: Option<BearerScheme>,
    federated: Option<FederatedScheme>,
    session: SessionConfig,
    cookie_options: CookieOptions,
    window: Duration,
    scheme_order: Vec<SchemeKind>,
}

impl SchemeSelector {
    pub fn new(
        store: TicketStore,
        bearer: Option<BearerScheme>,
        federated: Option<FederatedScheme>,
        session: SessionConfig,
        scheme_order: Vec<SchemeKind>,
    ) -> Result<Self, Error> {
        let window = Duration::from_std(session.expire_time_span).map_err(|e| Error::Configuration {
            message: format!("auth.session.expire_time_span out of range: {e}"),
        })?;
        if window <= Duration::zero() {
            return Err(Error::Configuration {
                message: "auth.session.expire_time_span must be positive".to_string(),
            });
        }

        Ok(Self {
            store,
            bearer,
            federated,
            cookie_options: session.cookie_options(),
            session,
            window,
            scheme_order,
        })
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub fn bearer(&self) -> Option<&BearerScheme> {
        self.bearer.as_ref()
    }

    pub fn federated(&self) -> Option<&FederatedScheme> {
        self.federated.as_ref()
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    pub fn scheme_order(&self) -> &[SchemeKind] {
        &self.scheme_order
    }

    /// Run the scheme chain restricted to `accepted`.
    #[instrument(skip_all, fields(accepted = ?accepted))]
    pub async fn authenticate(&self, headers: &HeaderMap, accepted: &[SchemeKind]) -> Authentication {
        let mut outcome = Authentication::default();
        let mut cookie_tried = false;

        for scheme in self.scheme_order.iter().filter(|s| accepted.contains(s)) {
            let attempt = match scheme {
                // the cookie scheme already read this session and did not authenticate
                SchemeKind::Federated if cookie_tried => continue,
                SchemeKind::Cookie => {
                    cookie_tried = true;
                    self.try_session(headers, *scheme).await
                }
                SchemeKind::Federated => self.try_session(headers, *scheme).await,
                SchemeKind::Bearer => self.try_bearer(headers),
            };

            match attempt {
                None => trace!(%scheme, "No credentials for scheme"),
                Some(Ok(resolved)) => {
                    debug!(%scheme, principal_id = %resolved.principal.principal.id, "Authenticated");
                    outcome.principal = Some(resolved.principal);
                    outcome.refreshed_cookie = resolved.refreshed_cookie;
                    return outcome;
                }
                Some(Err(failure)) => {
                    debug!(%scheme, ?failure, "Scheme did not authenticate");
                    outcome.failures.push((*scheme, failure));
                }
            }
        }

        outcome
    }

    /// Resolve the session cookie. The federated scheme signs in through the same cookie and only
    /// accepts tickets its provider issued.
    async fn try_session(&self, headers: &HeaderMap, scheme: SchemeKind) -> Option<Result<Resolved, SchemeFailure>> {
        let provider = match scheme {
            SchemeKind::Federated => Some(self.federated.as_ref()?.provider_name()),
            _ => None,
        };
        let raw = read_cookie(headers, &self.session.cookie_name)?;
        let session_id = SessionId::from_raw(raw);

        let ticket = match self.store.retrieve(&session_id).await {
            Ok(ticket) => ticket,
            Err(TicketStoreError::NotFound) => return Some(Err(SchemeFailure::SessionNotFound)),
            Err(TicketStoreError::CorruptTicket(reason)) => {
                warn!(session_id = %session_id, %reason, "Corrupt ticket in session store, treating as signed out");
                return Some(Err(SchemeFailure::CorruptTicket));
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Ticket store unavailable, treating request as unauthenticated");
                return Some(Err(SchemeFailure::StoreUnavailable));
            }
        };

        if let Some(provider) = provider
            && ticket.scheme_name() != provider
        {
            return Some(Err(SchemeFailure::IssuedByOtherScheme));
        }

        let refreshed_cookie = if self.session.sliding_expiration {
            self.slide(&session_id, &ticket).await
        } else {
            None
        };

        Some(Ok(Resolved {
            principal: AuthenticatedPrincipal {
                principal: ticket.principal().clone(),
                scheme,
                session_id: Some(session_id),
            },
            refreshed_cookie,
        }))
    }

    /// Renew the ticket once more than half of its window has elapsed. A failed renewal leaves the
    /// current ticket valid, so it is logged and otherwise ignored.
    async fn slide(&self, session_id: &SessionId, ticket: &AuthTicket) -> Option<String> {
        let now = self.store.now();
        if !ticket.needs_renewal(now) {
            return None;
        }

        let renewed = ticket.renewed(now, self.window).ok()?;
        match self.store.renew(session_id, &renewed).await {
            Ok(()) => {
                debug!(session_id = %session_id, expires_at = %renewed.expires_at(), "Renewed session");
                Some(self.session_cookie(session_id, renewed.is_persistent()))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Sliding renewal failed");
                None
            }
        }
    }

    fn try_bearer(&self, headers: &HeaderMap) -> Option<Result<Resolved, SchemeFailure>> {
        let bearer = self.bearer.as_ref()?;
        let result = bearer.authenticate(headers, self.store.now())?;

        Some(
            result
                .map(|principal| Resolved {
                    principal: AuthenticatedPrincipal {
                        principal,
                        scheme: SchemeKind::Bearer,
                        session_id: None,
                    },
                    refreshed_cookie: None,
                })
                .map_err(SchemeFailure::Bearer),
        )
    }

    /// Create a ticket-store session for `principal` and the cookie that points at it.
    #[instrument(skip(self, principal, items), fields(principal_id = %principal.id), err)]
    pub async fn sign_in(&self, principal: Principal, scheme_name: &str, persistent: bool, items: TicketItems) -> Result<SignIn, Error> {
        let ticket = AuthTicket::issue(principal, scheme_name, self.store.now(), self.window, persistent, items).map_err(|e| {
            Error::Internal {
                operation: format!("issue ticket: {e}"),
            }
        })?;
        let session_id = self.store.create(&ticket).await?;
        let cookie = self.session_cookie(&session_id, persistent);

        Ok(SignIn {
            session_id,
            ticket,
            cookie,
        })
    }

    /// Revoke the session named by the request's cookie, if any. Returns the revoked ticket when
    /// it could still be read, so sign-out can use its provider metadata.
    #[instrument(skip_all, err)]
    pub async fn sign_out(&self, headers: &HeaderMap) -> Result<Option<AuthTicket>, Error> {
        let Some(raw) = read_cookie(headers, &self.session.cookie_name) else {
            return Ok(None);
        };
        let session_id = SessionId::from_raw(raw);

        let ticket = match self.store.retrieve(&session_id).await {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Signing out a session that cannot be read");
                None
            }
        };
        self.store.revoke(&session_id).await?;
        Ok(ticket)
    }

    /// `Set-Cookie` for the session cookie. Persistent sessions get a `Max-Age` so they survive a
    /// browser restart.
    pub fn session_cookie(&self, session_id: &SessionId, persistent: bool) -> String {
        let max_age = persistent.then_some(self.session.expire_time_span);
        build_cookie(&self.session.cookie_name, session_id.expose(), max_age, &self.cookie_options)
    }

    /// Mint a bearer token for `principal` and wrap it in the bearer cookie.
    pub fn bearer_cookie(&self, principal: &Principal) -> Result<String, Error> {
        let bearer = self.bearer.as_ref().ok_or_else(|| Error::BadRequest {
            message: "Bearer tokens are not enabled".to_string(),
        })?;
        let token = bearer.keys().issue(principal, self.store.now())?;
        let max_age = bearer.keys().token_lifetime().to_std().ok();

        Ok(build_cookie(bearer.cookie_name(), &token, max_age, &self.cookie_options))
    }

    /// `Set-Cookie` values that remove every authentication cookie from the client.
    pub fn clear_cookies(&self) -> Vec<String> {
        let mut cookies = vec![expired_cookie(&self.session.cookie_name, &self.cookie_options)];
        if let Some(bearer) = &self.bearer {
            cookies.push(expired_cookie(bearer.cookie_name(), &self.cookie_options));
        }
        cookies
    }

    /// Browser requests are sent to sign in with the original path as return url; anything else
    /// gets a bare 401. Policies that accept the federated scheme sign in through the provider.
    pub fn challenge(&self, accepted: &[SchemeKind], wants_html: bool, path_and_query: &str) -> Challenge {
        if !wants_html {
            return Challenge::Unauthorized;
        }

        let login_path = if self.federated.is_some() && accepted.contains(&SchemeKind::Federated) {
            crate::api::handlers::auth::LOGIN_PATH
        } else {
            self.session.login_path.as_str()
        };
        Challenge::Redirect(self.with_return_url(login_path, path_and_query))
    }

    pub fn forbid(&self, wants_html: bool, path_and_query: &str) -> Forbid {
        if wants_html {
            Forbid::Redirect(self.with_return_url(&self.session.access_denied_path, path_and_query))
        } else {
            Forbid::Forbidden
        }
    }

    fn with_return_url(&self, target: &str, return_url: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(return_url.as_bytes()).collect();
        let separator = if target.contains('?') { '&' } else { '?' };
        format!("{target}{separator}{}={encoded}", self.session.return_url_parameter)
    }
}

struct Resolved {
    principal: AuthenticatedPrincipal,
    refreshed_cookie: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            bearer::SigningKeys,
            ticket::{Claim, ClaimType},
            ticket_store::{SessionBackend, SessionRecord},
        },
        test_utils::{TEST_PROVIDER, TestAuth, session_cookie_header},
    };
    use axum::http::{HeaderValue, header};

    const BOTH: &[SchemeKind] = &[SchemeKind::Cookie, SchemeKind::Bearer];

    fn alice() -> Principal {
        Principal::new("alice", vec![Claim::new(ClaimType::Subscription, "paid")])
    }

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_cookie_session_authenticates() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();

        let headers = cookie_headers(&session_cookie_header(&sign_in.session_id));
        let result = auth.selector.authenticate(&headers, BOTH).await;

        let resolved = result.principal.unwrap();
        assert_eq!(resolved.principal, alice());
        assert_eq!(resolved.scheme, SchemeKind::Cookie);
        assert_eq!(resolved.session_id, Some(sign_in.session_id));
        assert!(result.refreshed_cookie.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_is_unauthenticated_not_fault() {
        let auth = TestAuth::new();
        let headers = cookie_headers("PhotosApp.Auth=from-a-previous-process");

        let result = auth.selector.authenticate(&headers, BOTH).await;
        assert!(result.principal.is_none());
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::SessionNotFound)]);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unauthenticated() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();
        let headers = cookie_headers(&session_cookie_header(&sign_in.session_id));

        auth.sessions.set_down(true);
        let result = auth.selector.authenticate(&headers, BOTH).await;
        assert!(result.principal.is_none());
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::StoreUnavailable)]);

        auth.sessions.set_down(false);
        assert!(auth.selector.authenticate(&headers, BOTH).await.principal.is_some());
    }

    #[tokio::test]
    async fn test_session_is_read_once_per_request() {
        let auth = TestAuth::new();
        let all = &[SchemeKind::Cookie, SchemeKind::Bearer, SchemeKind::Federated];
        let headers = cookie_headers(&session_cookie_header(&SessionId::from_raw("missing")));

        let result = auth.selector.authenticate(&headers, all).await;
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::SessionNotFound)]);

        auth.sessions.set_down(true);
        let result = auth.selector.authenticate(&headers, all).await;
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::StoreUnavailable)]);
    }

    #[tokio::test]
    async fn test_corrupt_ticket_is_unauthenticated() {
        let auth = TestAuth::new();
        let now = auth.selector.store().now();
        let session_id = SessionId::from_raw("corrupted-session");
        auth.backend
            .insert(SessionRecord {
                session_id: session_id.clone(),
                payload: b"not a ticket".to_vec(),
                last_activity: now,
                expires_at: now + Duration::minutes(60),
            })
            .await
            .unwrap();

        let headers = cookie_headers(&session_cookie_header(&session_id));
        let result = auth.selector.authenticate(&headers, BOTH).await;
        assert!(result.principal.is_none());
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::CorruptTicket)]);
    }

    #[tokio::test]
    async fn test_federated_scheme_accepts_only_provider_tickets() {
        let auth = TestAuth::new();
        let federated_only = &[SchemeKind::Federated];

        let federated = auth.selector.sign_in(alice(), TEST_PROVIDER, false, TicketItems::default()).await.unwrap();
        let result = auth
            .selector
            .authenticate(&cookie_headers(&session_cookie_header(&federated.session_id)), federated_only)
            .await;
        let resolved = result.principal.unwrap();
        assert_eq!(resolved.principal, alice());
        assert_eq!(resolved.scheme, SchemeKind::Federated);
        assert_eq!(resolved.session_id, Some(federated.session_id));

        let local = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();
        let result = auth
            .selector
            .authenticate(&cookie_headers(&session_cookie_header(&local.session_id)), federated_only)
            .await;
        assert!(result.principal.is_none());
        assert_eq!(result.failures, vec![(SchemeKind::Federated, SchemeFailure::IssuedByOtherScheme)]);
    }

    #[tokio::test]
    async fn test_federated_scheme_without_provider_is_skipped() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), TEST_PROVIDER, false, TicketItems::default()).await.unwrap();
        let selector = SchemeSelector::new(
            auth.selector.store().clone(),
            None,
            None,
            auth.selector.session_config().clone(),
            vec![SchemeKind::Cookie, SchemeKind::Federated],
        )
        .unwrap();

        let result = selector
            .authenticate(&cookie_headers(&session_cookie_header(&sign_in.session_id)), &[SchemeKind::Federated])
            .await;
        assert!(result.principal.is_none());
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_expired_bearer_without_other_scheme_is_unauthenticated() {
        let auth = TestAuth::new();
        let cookie = auth.selector.bearer_cookie(&alice()).unwrap();
        let token = cookie.split(';').next().unwrap().to_string();

        auth.clock.advance(Duration::hours(2));
        let result = auth.selector.authenticate(&cookie_headers(&token), BOTH).await;

        assert!(result.principal.is_none());
        assert_eq!(
            result.failures,
            vec![(SchemeKind::Bearer, SchemeFailure::Bearer(BearerRejection::Expired))]
        );
    }

    #[tokio::test]
    async fn test_first_successful_scheme_wins() {
        let auth = TestAuth::new();
        let bob = Principal::new("bob", vec![]);
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();
        let bearer = auth.selector.bearer_cookie(&bob).unwrap();

        let header_value = format!(
            "{}; {}",
            session_cookie_header(&sign_in.session_id),
            bearer.split(';').next().unwrap()
        );
        let headers = cookie_headers(&header_value);

        let result = auth.selector.authenticate(&headers, BOTH).await;
        assert_eq!(result.principal.unwrap().principal.id.as_str(), "alice");

        let bearer_only = auth.selector.authenticate(&headers, &[SchemeKind::Bearer]).await;
        let resolved = bearer_only.principal.unwrap();
        assert_eq!(resolved.principal.id.as_str(), "bob");
        assert_eq!(resolved.scheme, SchemeKind::Bearer);
    }

    #[tokio::test]
    async fn test_falls_through_to_bearer_when_session_missing() {
        let auth = TestAuth::new();
        let bearer = auth.selector.bearer_cookie(&alice()).unwrap();
        let header_value = format!("PhotosApp.Auth=gone; {}", bearer.split(';').next().unwrap());

        let result = auth.selector.authenticate(&cookie_headers(&header_value), BOTH).await;
        assert_eq!(result.principal.unwrap().scheme, SchemeKind::Bearer);
        assert_eq!(result.failures, vec![(SchemeKind::Cookie, SchemeFailure::SessionNotFound)]);
    }

    #[tokio::test]
    async fn test_sliding_renewal_after_half_window() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, true, TicketItems::default()).await.unwrap();
        let headers = cookie_headers(&session_cookie_header(&sign_in.session_id));

        auth.clock.advance(Duration::minutes(20));
        assert!(auth.selector.authenticate(&headers, BOTH).await.refreshed_cookie.is_none());

        auth.clock.advance(Duration::minutes(20));
        let renewed = auth.selector.authenticate(&headers, BOTH).await;
        let cookie = renewed.refreshed_cookie.unwrap();
        assert!(cookie.starts_with(&format!("PhotosApp.Auth={}", sign_in.session_id.expose())));
        assert!(cookie.contains("Max-Age=3600"));

        // the original ticket would have expired at 60 minutes
        auth.clock.advance(Duration::minutes(50));
        assert!(auth.selector.authenticate(&headers, BOTH).await.principal.is_some());
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_is_idempotent() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();
        let headers = cookie_headers(&session_cookie_header(&sign_in.session_id));

        let revoked = auth.selector.sign_out(&headers).await.unwrap();
        assert_eq!(revoked.unwrap().principal(), &alice());
        assert!(auth.selector.authenticate(&headers, BOTH).await.principal.is_none());

        assert!(auth.selector.sign_out(&headers).await.unwrap().is_none());
        assert!(auth.selector.sign_out(&HeaderMap::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schemes_outside_accepted_set_are_skipped() {
        let auth = TestAuth::new();
        let sign_in = auth.selector.sign_in(alice(), COOKIE_SCHEME_NAME, false, TicketItems::default()).await.unwrap();
        let headers = cookie_headers(&session_cookie_header(&sign_in.session_id));

        let result = auth.selector.authenticate(&headers, &[SchemeKind::Bearer]).await;
        assert!(result.principal.is_none());
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_challenge_and_forbid() {
        let auth = TestAuth::new();
        let selector = &auth.selector;

        assert_eq!(selector.challenge(BOTH, false, "/photos/1"), Challenge::Unauthorized);
        assert_eq!(
            selector.challenge(BOTH, true, "/photos/1?x=1"),
            Challenge::Redirect("/Identity/Account/Login?ReturnUrl=%2Fphotos%2F1%3Fx%3D1".to_string())
        );
        assert_eq!(
            selector.challenge(&[SchemeKind::Cookie, SchemeKind::Federated], true, "/"),
            Challenge::Redirect("/authentication/login?ReturnUrl=%2F".to_string())
        );
        assert_eq!(selector.forbid(false, "/photos"), Forbid::Forbidden);
        assert_eq!(
            selector.forbid(true, "/photos"),
            Forbid::Redirect("/Identity/Account/AccessDenied?ReturnUrl=%2Fphotos".to_string())
        );
    }

    #[test]
    fn test_bearer_cookie_requires_bearer_scheme() {
        let auth = TestAuth::with_bearer(None);
        assert!(matches!(auth.selector.bearer_cookie(&alice()), Err(Error::BadRequest { .. })));
    }

    #[test]
    fn test_non_positive_window_is_configuration_error() {
        let auth = TestAuth::new();
        let mut session = auth.selector.session_config().clone();
        session.expire_time_span = std::time::Duration::ZERO;

        let result = SchemeSelector::new(auth.selector.store().clone(), None, None, session, vec![SchemeKind::Cookie]);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_signing_keys_are_injected() {
        let keys = SigningKeys::new(b"k", None, None, Duration::minutes(1));
        let auth = TestAuth::with_bearer(Some(BearerScheme::new(std::sync::Arc::new(keys), "Custom.Bearer")));
        assert_eq!(auth.selector.bearer().unwrap().cookie_name(), "Custom.Bearer");
    }
}
