//! Extractor for the authenticated principal in handlers.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

use crate::{
    AppState,
    auth::selector::AuthenticatedPrincipal,
    errors::{Error, Result},
};

/// The principal the policy guard resolved for this request.
///
/// Routes behind [`crate::authz::middleware::require_policy`] always have one; elsewhere the
/// extractor runs the scheme chain itself in the configured order and rejects with
/// [`Error::Unauthenticated`] when nothing matches. Sliding renewal cookies are only emitted by
/// the policy guard.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub AuthenticatedPrincipal);

impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(resolved) = parts.extensions.get::<AuthenticatedPrincipal>() {
            trace!("Using principal resolved by policy guard");
            return Ok(CurrentPrincipal(resolved.clone()));
        }

        let outcome = state.selector.authenticate(&parts.headers, state.selector.scheme_order()).await;
        match outcome.principal {
            Some(resolved) => Ok(CurrentPrincipal(resolved)),
            None => {
                trace!(failures = ?outcome.failures, "No scheme authenticated the request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}
