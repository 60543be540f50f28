//! # photos-auth: authentication and authorization for the Photos application
//!
//! `photos-auth` decides who a request comes from and whether it may proceed.
//!
//! ## Authentication
//!
//! Three schemes establish a principal ([`auth`]):
//!
//! - **Cookie sessions** backed by a server-side ticket store. The browser only holds an opaque
//!   session id; the serialized ticket with the principal's claims lives in PostgreSQL (or in
//!   memory for development). Sessions slide: once half of the expiry window has passed, the
//!   ticket is renewed in place.
//! - **Bearer tokens read from a cookie**: signed JWTs minted for a signed-in principal.
//! - **Federated sign-in** through an external identity provider, whose callback is turned into
//!   a local principal and ends in a cookie session.
//!
//! Schemes run in a configured priority order, filtered by what the route's policy accepts. The
//! first scheme that yields a principal wins.
//!
//! ## Authorization
//!
//! Routes name a policy ([`authz`]). A policy is a conjunction of requirements: an authenticated
//! principal, an exact claim match, or a custom check such as photo ownership. Unauthenticated
//! requests are challenged (login redirect for browsers, 401 otherwise); denied requests are
//! forbidden (access-denied redirect or 403). Deny reasons never reach the client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use photos_auth::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = photos_auth::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     photos_auth::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! Deployments that enable federated sign-in supply their identity provider through
//! [`Collaborators`] and [`Application::with_collaborators`].

pub mod api;
pub mod auth;
pub mod authz;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
pub mod photos;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, instrument, warn};

pub use config::Config;

use crate::{
    api::handlers::{auth as auth_handlers, photos as photo_handlers},
    auth::{
        bearer::{BearerScheme, SigningKeys},
        federated::{ClaimsTransformer, FederatedScheme, IdentityProvider, PassthroughClaims},
        selector::SchemeSelector,
        sweeper::run_ticket_sweeper,
        ticket_format::TicketFormat,
        ticket_store::{MemorySessionBackend, PostgresSessionBackend, SessionBackend, TicketStore},
    },
    authz::{
        evaluator::PolicyEvaluator,
        middleware::require_policy,
        ownership::{OwnershipHandler, PHOTO_OWNER_HANDLER, ResourceOwnership},
        policy::{PolicySet, names},
        registry::HandlerRegistry,
    },
    clock::{Clock, SystemClock},
    config::{CorsOrigin, DatabaseConfig},
    crypto::TicketProtector,
    errors::Error,
    photos::{MemoryPhotoCatalog, PgPhotoCatalog, PhotoCatalog, PhotoOwnership},
};

/// Shared state for every handler and the policy guard.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .selector(Arc::new(selector))
///     .evaluator(Arc::new(evaluator))
///     .photos(catalog)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub selector: Arc<SchemeSelector>,
    pub evaluator: Arc<PolicyEvaluator>,
    pub photos: Arc<dyn PhotoCatalog>,
}

/// Get the photos-auth database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Pieces the embedding application provides instead of the defaults.
#[derive(Clone, Default, Builder)]
pub struct Collaborators {
    /// Required when `auth.federated.enabled` is set
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    /// Defaults to [`PassthroughClaims`]
    pub claims_transformer: Option<Arc<dyn ClaimsTransformer>>,
    /// Defaults to ownership looked up in the photo catalog
    pub ownership: Option<Arc<dyn ResourceOwnership>>,
    /// Defaults to [`SystemClock`]
    pub clock: Option<Arc<dyn Clock>>,
    /// Replaces the configured storage for sessions
    pub session_backend: Option<Arc<dyn SessionBackend>>,
    /// Replaces the configured storage for photos
    pub photo_catalog: Option<Arc<dyn PhotoCatalog>>,
}

struct Storage {
    pool: Option<PgPool>,
    sessions: Arc<dyn SessionBackend>,
    photos: Arc<dyn PhotoCatalog>,
}

async fn setup_storage(config: &Config) -> anyhow::Result<Storage> {
    match &config.database {
        DatabaseConfig::Memory => {
            warn!("Using in-memory storage: sessions and photos are lost on restart");
            Ok(Storage {
                pool: None,
                sessions: Arc::new(MemorySessionBackend::new()),
                photos: Arc::new(MemoryPhotoCatalog::new()),
            })
        }
        DatabaseConfig::Postgres { url, pool: settings } => {
            info!("Using external database");
            let mut options = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .min_connections(settings.min_connections)
                .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));
            if settings.idle_timeout_secs > 0 {
                options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
            }
            if settings.max_lifetime_secs > 0 {
                options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
            }

            let pool = options.connect(url).await?;
            migrator().run(&pool).await?;

            Ok(Storage {
                sessions: Arc::new(PostgresSessionBackend::new(pool.clone())),
                photos: Arc::new(PgPhotoCatalog::new(pool.clone())),
                pool: Some(pool),
            })
        }
    }
}

/// Wire the ticket store, the scheme chain and the policy evaluator. Every configuration error
/// surfaces here, before the server accepts a request.
fn build_state(
    config: &Config,
    sessions: Arc<dyn SessionBackend>,
    photos: Arc<dyn PhotoCatalog>,
    collaborators: Collaborators,
) -> Result<(AppState, TicketStore), Error> {
    let protector = config
        .ticket_store
        .protection_key
        .as_deref()
        .map(TicketProtector::from_base64_key)
        .transpose()
        .map_err(|e| Error::Configuration {
            message: format!("ticket_store.protection_key is invalid: {e}"),
        })?;
    if protector.is_none() {
        info!("No ticket protection key configured, tickets are stored unencrypted");
    }

    let clock = collaborators.clock.unwrap_or_else(|| Arc::new(SystemClock));
    let store = TicketStore::new(sessions, TicketFormat::new(protector), config.ticket_store.operation_timeout, clock);

    let bearer = if config.auth.bearer.enabled {
        let keys = SigningKeys::from_config(&config.auth.bearer)?;
        Some(BearerScheme::new(Arc::new(keys), config.auth.bearer.cookie_name.clone()))
    } else {
        None
    };

    let federated = match (config.auth.federated.enabled, collaborators.identity_provider) {
        (true, Some(provider)) => {
            let transformer = collaborators.claims_transformer.unwrap_or_else(|| Arc::new(PassthroughClaims));
            Some(FederatedScheme::new(provider, transformer, config.auth.federated.provider_timeout))
        }
        (true, None) => {
            return Err(Error::Configuration {
                message: "auth.federated.enabled is set but no identity provider was supplied".to_string(),
            });
        }
        (false, Some(_)) => {
            warn!("Identity provider supplied but auth.federated.enabled is false, ignoring it");
            None
        }
        (false, None) => None,
    };

    let selector = SchemeSelector::new(
        store.clone(),
        bearer,
        federated,
        config.auth.session.clone(),
        config.auth.scheme_order.clone(),
    )?;

    let ownership = collaborators
        .ownership
        .unwrap_or_else(|| Arc::new(PhotoOwnership::new(photos.clone())));
    let mut registry = HandlerRegistry::new();
    registry.register(
        PHOTO_OWNER_HANDLER,
        Arc::new(OwnershipHandler::new(ownership, config.auth.requirement_timeout)),
    );

    let evaluator = PolicyEvaluator::new(PolicySet::from_config(&config.policies)?, registry)?;

    let state = AppState::builder()
        .config(config.clone())
        .selector(Arc::new(selector))
        .evaluator(Arc::new(evaluator))
        .photos(photos)
        .build();

    Ok((state, store))
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// Guarded routes resolve their policy here, so a route naming a policy that is not configured
/// fails the build instead of failing requests.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route(auth_handlers::LOGIN_PATH, get(auth_handlers::login))
        .route(auth_handlers::CALLBACK_PATH, get(auth_handlers::callback))
        .route(auth_handlers::LOGOUT_PATH, post(auth_handlers::logout))
        .route(
            auth_handlers::ME_PATH,
            require_policy(get(auth_handlers::me), state, names::AUTHENTICATED)?,
        )
        .route(
            auth_handlers::TOKEN_PATH,
            require_policy(post(auth_handlers::token), state, names::AUTHENTICATED)?,
        );

    let photo_routes = Router::new()
        .route(
            photo_handlers::PHOTOS_PATH,
            require_policy(post(photo_handlers::create_photo), state, names::CAN_ADD_PHOTO)?,
        )
        .route(
            photo_handlers::PHOTO_PATH,
            require_policy(
                get(photo_handlers::get_photo).patch(photo_handlers::rename_photo),
                state,
                names::MUST_OWN_PHOTO,
            )?,
        );

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(photo_routes)
        .with_state(state.clone())
        .layer(create_cors_layer(&state.config)?)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

/// Tasks that run alongside the HTTP server: currently the expired-ticket sweep.
///
/// Dropping this without calling [`shutdown`](BackgroundServices::shutdown) still cancels the
/// tasks through `drop_guard`.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    fn start(config: &Config, store: TicketStore) -> Self {
        let shutdown_token = CancellationToken::new();
        let sweeper = tokio::spawn(run_ticket_sweeper(
            store,
            config.ticket_store.sweep_interval,
            shutdown_token.clone(),
        ));

        Self {
            background_tasks: vec![sweeper],
            drop_guard: Some(shutdown_token.clone().drop_guard()),
            shutdown_token,
        }
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(guard) = self.drop_guard.take() {
            let _ = guard.disarm();
        }

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// The assembled service: storage, state, router and background tasks.
///
/// 1. **Create**: [`Application::new`] connects storage, runs migrations, validates the policy
///    set against the handler registry and starts the ticket sweep
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: when the shutdown future resolves, stops the sweep and closes the pool
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: Option<PgPool>,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_collaborators(config, Collaborators::default()).await
    }

    pub async fn with_collaborators(config: Config, collaborators: Collaborators) -> anyhow::Result<Self> {
        // the config carries the bearer secret and the protection key, so only log where we bind
        debug!(bind_address = %config.bind_address(), memory = config.database.is_memory(), "Starting photos-auth");
        config.validate()?;

        let (pool, sessions, photos) = match (collaborators.session_backend.clone(), collaborators.photo_catalog.clone()) {
            (Some(sessions), Some(photos)) => (None, sessions, photos),
            (sessions, photos) => {
                let storage = setup_storage(&config).await?;
                (
                    storage.pool,
                    sessions.unwrap_or(storage.sessions),
                    photos.unwrap_or(storage.photos),
                )
            }
        };

        let (app_state, store) = build_state(&config, sessions, photos, collaborators)?;
        let router = build_router(&app_state)?;
        let bg_services = BackgroundServices::start(&config, store);

        info!(
            policies = app_state.evaluator.policies().len(),
            bearer = app_state.selector.bearer().is_some(),
            federated = app_state.selector.federated().is_some(),
            "Authentication and authorization configured"
        );

        Ok(Self {
            router,
            app_state,
            config,
            pool,
            bg_services,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "photos-auth listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{StaticIdentityProvider, create_test_config, test_identity};
    use axum::http::StatusCode;

    fn memory_collaborators() -> Collaborators {
        Collaborators::builder()
            .identity_provider(Arc::new(StaticIdentityProvider::new(test_identity())))
            .build()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = Application::with_collaborators(create_test_config(), memory_collaborators())
            .await
            .unwrap();
        let (server, bg) = app.into_test_server();

        let response = server.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        response.assert_text("OK");

        bg.shutdown().await;
    }

    #[tokio::test]
    async fn test_unregistered_handler_fails_startup() {
        let mut config = create_test_config();
        config.policies.insert(
            "AlbumEditor".to_string(),
            config::PolicyConfig {
                requirements: vec![authz::policy::Requirement::Custom {
                    handler: "album_editor".to_string(),
                    resource: Some("album_id".to_string()),
                }],
                schemes: vec![auth::selector::SchemeKind::Cookie],
            },
        );

        let result = Application::with_collaborators(config, memory_collaborators()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_route_policy_missing_fails_startup() {
        let mut config = create_test_config();
        config.policies.remove(names::MUST_OWN_PHOTO);

        let result = Application::with_collaborators(config, memory_collaborators()).await;
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains(names::MUST_OWN_PHOTO), "{message}");
    }

    #[tokio::test]
    async fn test_federated_without_provider_fails_startup() {
        let result = Application::new(create_test_config()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_federated_disabled_challenges_to_local_login() {
        let mut config = create_test_config();
        config.auth.federated.enabled = false;
        let app = Application::new(config).await.unwrap();
        assert!(app.state().selector.federated().is_none());
        let (server, bg) = app.into_test_server();

        let response = server
            .get("/authentication/me")
            .add_header(http::header::ACCEPT, HeaderValue::from_static("text/html"))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(
            response.header(http::header::LOCATION),
            "/Identity/Account/Login?ReturnUrl=%2Fauthentication%2Fme"
        );

        let response = server.get("/authentication/login").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        bg.shutdown().await;
    }

    #[tokio::test]
    async fn test_protected_tickets_round_trip_through_the_app() {
        let mut config = create_test_config();
        config.ticket_store.protection_key = Some(crate::test_utils::TEST_PROTECTION_KEY.to_string());
        let app = Application::with_collaborators(config, memory_collaborators())
            .await
            .unwrap();
        let sign_in = app
            .state()
            .selector
            .sign_in(auth::ticket::Principal::new("alice", vec![]), "Cookies", false, Default::default())
            .await
            .unwrap();
        let (server, bg) = app.into_test_server();

        let cookie = format!("PhotosApp.Auth={}", sign_in.session_id.expose());
        let response = server.get("/authentication/me").add_header(http::header::COOKIE, cookie).await;
        response.assert_status_ok();

        bg.shutdown().await;
    }
}
