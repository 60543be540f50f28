//! Bearer tokens carried in a dedicated cookie.
//!
//! Tokens are HS256 JWTs minted by [`SigningKeys::issue`] for an already authenticated
//! principal. Browser clients get them in the bearer cookie, so no `Authorization` header
//! plumbing is needed on the client. Validation checks signature, issuer and audience (when
//! configured) and lifetime with zero clock skew.

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::{
    auth::{
        cookies::read_cookie,
        ticket::{Claim, Principal},
    },
    config::BearerConfig,
    errors::Error,
    types::PrincipalId,
};

/// Why a bearer token was not accepted. Every variant means "unauthenticated".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BearerRejection {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("unexpected token issuer")]
    InvalidIssuer,
    #[error("unexpected token audience")]
    InvalidAudience,
    #[error("malformed token: {0}")]
    Malformed(String),
}

/// JWT payload
#[derive(Debug, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: PrincipalId,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Immutable key material and validation parameters for bearer tokens.
///
/// Built once at startup and handed to the selector; tests build their own with a throwaway
/// secret.
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
    audience: Option<String>,
    token_lifetime: Duration,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    pub fn new(secret: &[u8], issuer: Option<String>, audience: Option<String>, token_lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer,
            audience,
            token_lifetime,
        }
    }

    pub fn from_config(config: &BearerConfig) -> Result<Self, Error> {
        let secret = config.secret.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| Error::Configuration {
            message: "auth.bearer.secret is required when the bearer scheme is enabled".to_string(),
        })?;
        let token_lifetime = Duration::from_std(config.token_lifetime).map_err(|e| Error::Configuration {
            message: format!("auth.bearer.token_lifetime out of range: {e}"),
        })?;

        Ok(Self::new(
            secret.as_bytes(),
            config.issuer.clone(),
            config.audience.clone(),
            token_lifetime,
        ))
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// Mint a token for `principal` valid from `now` for the configured lifetime.
    pub fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, Error> {
        let claims = BearerClaims {
            sub: principal.id.clone(),
            exp: (now + self.token_lifetime).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            claims: principal.claims.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| Error::Internal {
            operation: format!("create bearer token: {e}"),
        })
    }

    /// Validate a token at `now`. Lifetime is checked against the injected time with no leeway.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, BearerRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // expiry is checked below against `now` rather than the system clock
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<BearerClaims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => BearerRejection::InvalidSignature,
            ErrorKind::ExpiredSignature => BearerRejection::Expired,
            ErrorKind::InvalidIssuer => BearerRejection::InvalidIssuer,
            ErrorKind::InvalidAudience => BearerRejection::InvalidAudience,
            _ => BearerRejection::Malformed(e.to_string()),
        })?;

        if now.timestamp() >= data.claims.exp {
            return Err(BearerRejection::Expired);
        }

        Ok(Principal::new(data.claims.sub, data.claims.claims))
    }
}

/// Bearer-from-cookie authentication scheme.
#[derive(Debug, Clone)]
pub struct BearerScheme {
    keys: Arc<SigningKeys>,
    cookie_name: String,
}

impl BearerScheme {
    pub fn new(keys: Arc<SigningKeys>, cookie_name: impl Into<String>) -> Self {
        Self {
            keys,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn keys(&self) -> &SigningKeys {
        &self.keys
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Returns:
    /// - None: no bearer cookie present
    /// - Some(Ok(principal)): token valid
    /// - Some(Err(rejection)): cookie present but token rejected
    #[instrument(skip_all)]
    pub fn authenticate(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Option<Result<Principal, BearerRejection>> {
        let token = read_cookie(headers, &self.cookie_name)?;
        trace!("Found bearer cookie");

        let result = self.keys.validate(token, now);
        if let Err(rejection) = &result {
            debug!(%rejection, "Bearer token rejected");
        }
        Some(result)
    }
}
