//! Route guard that enforces a named policy.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Redirect, Response},
    routing::MethodRouter,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    AppState,
    auth::selector::{Challenge, Forbid},
    authz::{
        evaluator::{Decision, DenyReason},
        policy::Policy,
    },
    errors::Error,
};

/// State for one guarded route: the app plus the policy resolved at startup.
#[derive(Clone)]
pub struct PolicyGuard {
    state: AppState,
    policy: Arc<Policy>,
}

/// Wrap `route` so every request must satisfy the policy called `policy_name`.
///
/// The policy is resolved here, while the router is being built, so a route naming an unknown
/// policy fails startup with [`Error::Configuration`].
pub fn require_policy(route: MethodRouter<AppState>, state: &AppState, policy_name: &str) -> Result<MethodRouter<AppState>, Error> {
    let guard = PolicyGuard {
        state: state.clone(),
        policy: state.evaluator.policy(policy_name)?,
    };
    Ok(route.route_layer(from_fn_with_state(guard, enforce_policy)))
}

/// Whether the client is a browser that should be redirected rather than handed a status code.
fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn route_params(params: Option<RawPathParams>) -> HashMap<String, String> {
    params
        .map(|params| params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default()
}

/// Outcome of the guard before the handler runs.
enum Verdict {
    Proceed(Request),
    Respond(Response),
}

#[instrument(skip_all, fields(policy = %guard.policy.name(), path = %request.uri().path()))]
async fn authorize(guard: &PolicyGuard, request: Request) -> (Verdict, Option<String>) {
    let (mut parts, body) = request.into_parts();
    let params = route_params(RawPathParams::from_request_parts(&mut parts, &()).await.ok());
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_else(|| "/".to_string());
    let html = wants_html(&parts.headers);
    let selector = &guard.state.selector;

    let authentication = selector.authenticate(&parts.headers, guard.policy.schemes()).await;
    let refreshed_cookie = authentication.refreshed_cookie;
    let resolved = authentication.principal;

    let decision = guard
        .state
        .evaluator
        .evaluate(&guard.policy, resolved.as_ref().map(|r| &r.principal), &params)
        .await;

    let verdict = match (decision, resolved) {
        (Decision::Allow, resolved) => {
            if let Some(resolved) = resolved {
                parts.extensions.insert(resolved);
            }
            Verdict::Proceed(Request::from_parts(parts, body))
        }
        (Decision::Deny(reason), None) | (Decision::Deny(reason @ DenyReason::Unauthenticated), _) => {
            debug!(%reason, failures = ?authentication.failures, "Challenging unauthenticated request");
            Verdict::Respond(match selector.challenge(guard.policy.schemes(), html, &path_and_query) {
                Challenge::Redirect(location) => Redirect::to(&location).into_response(),
                Challenge::Unauthorized => Error::Unauthenticated { message: None }.into_response(),
            })
        }
        (Decision::Deny(reason), Some(resolved)) => {
            info!(principal_id = %resolved.principal.id, %reason, "Policy denied request");
            Verdict::Respond(match selector.forbid(html, &path_and_query) {
                Forbid::Redirect(location) => Redirect::to(&location).into_response(),
                Forbid::Forbidden => Error::Forbidden {
                    reason: reason.to_string(),
                }
                .into_response(),
            })
        }
    };

    (verdict, refreshed_cookie)
}

/// Middleware body behind [`require_policy`].
pub async fn enforce_policy(State(guard): State<PolicyGuard>, request: Request, next: Next) -> Response {
    let (verdict, refreshed_cookie) = authorize(&guard, request).await;

    let mut response = match verdict {
        Verdict::Proceed(request) => next.run(request).await,
        Verdict::Respond(response) => response,
    };

    if let Some(cookie) = refreshed_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Renewed session cookie is not a valid header value"),
        }
    }
    response
}
