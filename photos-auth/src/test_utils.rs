//! Test utilities (available with the `test-utils` feature).
//!
//! Everything here runs on in-memory storage and a [`ManualClock`], so expiry and sliding renewal
//! are driven by `clock.advance(..)` rather than sleeping.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use url::Url;

use crate::{
    auth::{
        bearer::{BearerScheme, SigningKeys},
        federated::{ExternalIdentity, FederatedScheme, IdentityProvider, PassthroughClaims, ProviderError},
        selector::{SchemeKind, SchemeSelector},
        ticket::{Claim, ClaimType},
        ticket_format::TicketFormat,
        ticket_store::{BackendError, MemorySessionBackend, SessionBackend, SessionRecord, TicketStore},
    },
    authz::ownership::{OwnershipError, ResourceOwnership},
    clock::ManualClock,
    config::{BearerConfig, Config, DatabaseConfig, FederatedConfig, SessionConfig},
    types::{PrincipalId, SessionId},
};

pub const TEST_BEARER_SECRET: &str = "test-secret-key-for-testing-only";
/// Base64 of the bytes 0..32
pub const TEST_PROTECTION_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
pub const TEST_PROVIDER: &str = "oidc";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig::Memory,
        auth: crate::config::AuthConfig {
            session: SessionConfig::default(),
            bearer: BearerConfig {
                secret: Some(TEST_BEARER_SECRET.to_string()),
                ..Default::default()
            },
            federated: FederatedConfig {
                enabled: true,
                provider_timeout: Duration::from_secs(1),
                post_logout_redirect: "https://photos.example.com/".to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `Cookie` header value carrying `session_id` in the default session cookie.
pub fn session_cookie_header(session_id: &SessionId) -> String {
    format!("{}={}", SessionConfig::default().cookie_name, session_id.expose())
}

pub fn test_identity() -> ExternalIdentity {
    ExternalIdentity {
        provider: TEST_PROVIDER.to_string(),
        subject: "idp|alice".to_string(),
        claims: vec![
            Claim::new(ClaimType::Email, "alice@example.com"),
            Claim::new(ClaimType::Subscription, "paid"),
        ],
        id_token_hint: Some("id-token".to_string()),
        return_url: None,
    }
}

pub fn test_bearer() -> BearerScheme {
    let config = create_test_config();
    let keys = SigningKeys::from_config(&config.auth.bearer).expect("test bearer config is valid");
    BearerScheme::new(Arc::new(keys), config.auth.bearer.cookie_name)
}

/// A scheme selector over the memory backend with the default session settings.
pub struct TestAuth {
    pub selector: SchemeSelector,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemorySessionBackend>,
    /// Wraps `backend`; switch it off to simulate an unreachable store
    pub sessions: Arc<UnreliableSessionBackend>,
}

impl TestAuth {
    pub fn new() -> Self {
        Self::with_bearer(Some(test_bearer()))
    }

    pub fn with_bearer(bearer: Option<BearerScheme>) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = Arc::new(MemorySessionBackend::new());
        let sessions = Arc::new(UnreliableSessionBackend::new(backend.clone()));
        let store = TicketStore::new(sessions.clone(), TicketFormat::default(), Duration::from_secs(1), clock.clone());
        let federated = FederatedScheme::new(
            Arc::new(StaticIdentityProvider::new(test_identity())),
            Arc::new(PassthroughClaims),
            Duration::from_secs(1),
        );

        let selector = SchemeSelector::new(
            store,
            bearer,
            Some(federated),
            SessionConfig::default(),
            vec![SchemeKind::Cookie, SchemeKind::Bearer, SchemeKind::Federated],
        )
        .expect("default session config is valid");

        Self {
            selector,
            clock,
            backend,
            sessions,
        }
    }
}

impl Default for TestAuth {
    fn default() -> Self {
        Self::new()
    }
}

/// Session backend that delegates to a [`MemorySessionBackend`] until switched off, then fails
/// every call with [`BackendError::Unavailable`].
#[derive(Debug)]
pub struct UnreliableSessionBackend {
    inner: Arc<MemorySessionBackend>,
    down: AtomicBool,
}

impl UnreliableSessionBackend {
    pub fn new(inner: Arc<MemorySessionBackend>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionBackend for UnreliableSessionBackend {
    async fn insert(&self, record: SessionRecord) -> Result<(), BackendError> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn fetch(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, BackendError> {
        self.check()?;
        self.inner.fetch(session_id).await
    }

    async fn replace(&self, record: SessionRecord, now: DateTime<Utc>) -> Result<bool, BackendError> {
        self.check()?;
        self.inner.replace(record, now).await
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), BackendError> {
        self.check()?;
        self.inner.remove(session_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, BackendError> {
        self.check()?;
        self.inner.purge_expired(now).await
    }
}

/// Identity provider that asserts one fixed identity.
///
/// The login redirect carries the return url in `state`; the callback echoes `state` back as the
/// identity's return url. A callback with an `error` parameter is rejected.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    identity: ExternalIdentity,
    delay: Option<Duration>,
    reject: bool,
}

impl StaticIdentityProvider {
    pub fn new(identity: ExternalIdentity) -> Self {
        Self {
            identity,
            delay: None,
            reject: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every callback.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    fn name(&self) -> &str {
        &self.identity.provider
    }

    async fn login_redirect(&self, return_url: &str) -> Result<Url, ProviderError> {
        self.pause().await;
        let mut url = Url::parse("https://idp.example.com/authorize").map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", "photos-app")
            .append_pair("state", return_url);
        Ok(url)
    }

    async fn complete(&self, callback: &HashMap<String, String>) -> Result<ExternalIdentity, ProviderError> {
        self.pause().await;
        if self.reject {
            return Err(ProviderError::InvalidCallback("provider rejected the sign-in".to_string()));
        }
        if let Some(error) = callback.get("error") {
            return Err(ProviderError::InvalidCallback(error.clone()));
        }

        let mut identity = self.identity.clone();
        if let Some(state) = callback.get("state") {
            identity.return_url = Some(state.clone());
        }
        Ok(identity)
    }

    fn logout_redirect(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> Option<Url> {
        let mut url = Url::parse("https://idp.example.com/logout").ok()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("post_logout_redirect_uri", post_logout_redirect);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        Some(url)
    }
}

/// Ownership collaborator over a fixed map of resource id to owner. Clones share the map and
/// the counters, so a test can change ownership after handing a clone to a handler.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnership {
    owners: Arc<DashMap<String, String>>,
    fail: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl StaticOwnership {
    pub fn with_owner(self, resource_id: &str, owner: &str) -> Self {
        self.set_owner(resource_id, owner);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_owner(&self, resource_id: &str, owner: &str) {
        self.owners.insert(resource_id.to_string(), owner.to_string());
    }

    /// Make every lookup fail with a collaborator error.
    pub fn fail_with_error(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of lookups made so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResourceOwnership for StaticOwnership {
    async fn is_owner(&self, principal_id: &PrincipalId, resource_id: &str) -> Result<bool, OwnershipError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(OwnershipError::Lookup("ownership store unreachable".to_string()));
        }

        match self.owners.get(resource_id) {
            Some(owner) => Ok(owner.value() == principal_id.as_str()),
            None => Err(OwnershipError::ResourceNotFound),
        }
    }
}

/// The full router over memory storage, a manual clock and [`StaticIdentityProvider`].
#[cfg(test)]
pub struct TestApp {
    pub server: axum_test::TestServer,
    pub state: crate::AppState,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemorySessionBackend>,
    pub sessions: Arc<UnreliableSessionBackend>,
    _background: crate::BackgroundServices,
}

#[cfg(test)]
impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(create_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = Arc::new(MemorySessionBackend::new());
        let sessions = Arc::new(UnreliableSessionBackend::new(backend.clone()));
        let collaborators = crate::Collaborators::builder()
            .identity_provider(Arc::new(StaticIdentityProvider::new(test_identity())))
            .clock(clock.clone())
            .session_backend(sessions.clone())
            .photo_catalog(Arc::new(crate::photos::MemoryPhotoCatalog::new()))
            .build();

        let app = crate::Application::with_collaborators(config, collaborators)
            .await
            .expect("Failed to create application");
        let state = app.state().clone();
        let (server, background) = app.into_test_server();

        Self {
            server,
            state,
            clock,
            backend,
            sessions,
            _background: background,
        }
    }

    /// Open a cookie session for `principal` and return the `Cookie` header value for it.
    pub async fn sign_in(&self, principal: crate::auth::ticket::Principal) -> String {
        let sign_in = self
            .state
            .selector
            .sign_in(principal, crate::auth::selector::COOKIE_SCHEME_NAME, false, Default::default())
            .await
            .expect("sign in");
        session_cookie_header(&sign_in.session_id)
    }
}

/// Every `Set-Cookie` header on a response.
#[cfg(test)]
pub fn set_cookie_headers(response: &axum_test::TestResponse) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}
