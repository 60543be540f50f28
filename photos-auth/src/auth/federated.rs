//! Federated (OIDC) sign-in.
//!
//! The protocol itself lives behind [`IdentityProvider`]: this crate only asks it for redirect
//! URLs and hands it the callback parameters to validate. A successful callback yields an
//! [`ExternalIdentity`], which a [`ClaimsTransformer`] turns into the local [`Principal`] before
//! any policy sees it. That step is where local claims such as the subscription tier are attached.

use std::{collections::HashMap, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::ticket::{Claim, ClaimType, Principal};

/// Identity asserted by an external provider after a validated callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,
    pub subject: String,
    pub claims: Vec<Claim>,
    /// Raw id token, kept so sign-out can pass it back to the provider
    pub id_token_hint: Option<String>,
    /// Local return url carried through the round trip
    pub return_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("identity provider rejected the callback: {0}")]
    InvalidCallback(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("claims assembly failed: {0}")]
    ClaimsAssembly(String),
}

/// External federated identity protocol.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Scheme name recorded on tickets issued through this provider
    fn name(&self) -> &str;

    /// Where to send the browser to start sign-in. `return_url` must come back in the callback.
    async fn login_redirect(&self, return_url: &str) -> Result<Url, ProviderError>;

    /// Validate the callback query parameters and return the authenticated identity.
    async fn complete(&self, callback: &HashMap<String, String>) -> Result<ExternalIdentity, ProviderError>;

    /// Provider end-session URL, if the provider supports one.
    fn logout_redirect(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> Option<Url>;
}

/// Builds the local principal from an external identity.
#[async_trait::async_trait]
pub trait ClaimsTransformer: Send + Sync {
    async fn transform(&self, identity: ExternalIdentity) -> Result<Principal, ProviderError>;
}

#[async_trait::async_trait]
impl<F> ClaimsTransformer for F
where
    F: Fn(ExternalIdentity) -> Principal + Send + Sync,
{
    async fn transform(&self, identity: ExternalIdentity) -> Result<Principal, ProviderError> {
        Ok(self(identity))
    }
}

/// Uses the provider subject as principal id and keeps the provider claims, tagging each with the
/// provider as issuer. Adds a `sub` claim when the provider did not send one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughClaims;

#[async_trait::async_trait]
impl ClaimsTransformer for PassthroughClaims {
    async fn transform(&self, identity: ExternalIdentity) -> Result<Principal, ProviderError> {
        if identity.subject.is_empty() {
            return Err(ProviderError::ClaimsAssembly("external identity has no subject".to_string()));
        }

        let mut claims: Vec<Claim> = identity
            .claims
            .into_iter()
            .map(|claim| match claim.issuer {
                Some(_) => claim,
                None => claim.issued_by(identity.provider.clone()),
            })
            .collect();
        if !claims.iter().any(|c| c.claim_type == ClaimType::NameIdentifier) {
            claims.insert(
                0,
                Claim::new(ClaimType::NameIdentifier, identity.subject.clone()).issued_by(identity.provider.clone()),
            );
        }

        Ok(Principal::new(identity.subject, claims))
    }
}

/// Only same-site absolute paths are accepted as return urls. Anything else falls back to `/`.
pub fn sanitize_return_url(candidate: Option<&str>) -> String {
    match candidate {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") => url.to_string(),
        _ => "/".to_string(),
    }
}

/// Federated scheme: provider plus claims assembly, with every provider call bounded.
#[derive(Clone)]
pub struct FederatedScheme {
    provider: Arc<dyn IdentityProvider>,
    transformer: Arc<dyn ClaimsTransformer>,
    timeout: Duration,
}

impl FederatedScheme {
    pub fn new(provider: Arc<dyn IdentityProvider>, transformer: Arc<dyn ClaimsTransformer>, timeout: Duration) -> Self {
        Self {
            provider,
            transformer,
            timeout,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    #[instrument(skip(self))]
    pub async fn challenge(&self, return_url: &str) -> Result<Url, ProviderError> {
        tokio::time::timeout(self.timeout, self.provider.login_redirect(return_url))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }

    /// Validate a callback and assemble the local principal. Returns the principal together with
    /// the identity so the caller can record provider metadata on the ticket.
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn complete(&self, callback: &HashMap<String, String>) -> Result<(Principal, ExternalIdentity), ProviderError> {
        let identity = tokio::time::timeout(self.timeout, self.provider.complete(callback))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
            .inspect_err(|e| warn!(error = %e, "Federated callback failed"))?;
        debug!(subject = %identity.subject, "Federated callback validated");

        let principal = tokio::time::timeout(self.timeout, self.transformer.transform(identity.clone()))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        Ok((principal, identity))
    }

    pub fn logout_redirect(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> Option<Url> {
        self.provider.logout_redirect(id_token_hint, post_logout_redirect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticIdentityProvider;

    fn identity() -> ExternalIdentity {
        ExternalIdentity {
            provider: "oidc".to_string(),
            subject: "idp|42".to_string(),
            claims: vec![Claim::new(ClaimType::Email, "bob@example.com")],
            id_token_hint: Some("id-token".to_string()),
            return_url: Some("/photos".to_string()),
        }
    }

    #[test]
    fn test_sanitize_return_url() {
        assert_eq!(sanitize_return_url(Some("/photos/1?x=y")), "/photos/1?x=y");
        assert_eq!(sanitize_return_url(Some("https://evil.example.com")), "/");
        assert_eq!(sanitize_return_url(Some("//evil.example.com")), "/");
        assert_eq!(sanitize_return_url(Some("/\\evil.example.com")), "/");
        assert_eq!(sanitize_return_url(Some("photos")), "/");
        assert_eq!(sanitize_return_url(None), "/");
    }

    #[tokio::test]
    async fn test_passthrough_adds_subject_claim_and_issuer() {
        let principal = PassthroughClaims.transform(identity()).await.unwrap();

        assert_eq!(principal.id.as_str(), "idp|42");
        assert_eq!(principal.claims[0].claim_type, ClaimType::NameIdentifier);
        assert!(principal.claims.iter().all(|c| c.issuer.as_deref() == Some("oidc")));
        assert!(principal.has_claim(&ClaimType::Email, "bob@example.com"));
    }

    #[tokio::test]
    async fn test_closure_transformer_attaches_local_claims() {
        let transformer = |identity: ExternalIdentity| {
            let mut claims = identity.claims;
            claims.push(Claim::new(ClaimType::Subscription, "paid"));
            Principal::new(identity.subject, claims)
        };
        let scheme = FederatedScheme::new(
            Arc::new(StaticIdentityProvider::new(identity())),
            Arc::new(transformer),
            Duration::from_secs(1),
        );

        let (principal, external) = scheme.complete(&HashMap::new()).await.unwrap();
        assert!(principal.has_claim(&ClaimType::Subscription, "paid"));
        assert_eq!(external.id_token_hint.as_deref(), Some("id-token"));
    }

    #[tokio::test]
    async fn test_provider_timeout_surfaces_as_failure() {
        let provider = StaticIdentityProvider::new(identity()).with_delay(Duration::from_secs(30));
        let scheme = FederatedScheme::new(Arc::new(provider), Arc::new(PassthroughClaims), Duration::from_millis(50));

        assert!(matches!(
            scheme.complete(&HashMap::new()).await,
            Err(ProviderError::Timeout(_))
        ));
        assert!(matches!(scheme.challenge("/").await, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_rejected_callback() {
        let provider = StaticIdentityProvider::new(identity()).rejecting();
        let scheme = FederatedScheme::new(Arc::new(provider), Arc::new(PassthroughClaims), Duration::from_secs(1));

        assert!(matches!(
            scheme.complete(&HashMap::new()).await,
            Err(ProviderError::InvalidCallback(_))
        ));
    }
}
