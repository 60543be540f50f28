//! In-memory authentication ticket: who signed in, with which claims, through which scheme and
//! until when.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::PrincipalId;

/// Claim types the authorization layer reasons about, plus a residual variant for anything a
/// provider sends that has no meaning here.
///
/// Equality and hashing go by the claim type name, so `Other("email")` and `Email` are the same
/// claim type, as they are once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClaimType {
    NameIdentifier,
    Name,
    Email,
    Role,
    Subscription,
    BetaTester,
    Other(String),
}

impl ClaimType {
    pub fn as_str(&self) -> &str {
        match self {
            ClaimType::NameIdentifier => "sub",
            ClaimType::Name => "name",
            ClaimType::Email => "email",
            ClaimType::Role => "role",
            ClaimType::Subscription => "subscription",
            ClaimType::BetaTester => "beta_tester",
            ClaimType::Other(name) => name,
        }
    }
}

impl PartialEq for ClaimType {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ClaimType {}

impl std::hash::Hash for ClaimType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<String> for ClaimType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sub" => ClaimType::NameIdentifier,
            "name" => ClaimType::Name,
            "email" => ClaimType::Email,
            "role" => ClaimType::Role,
            "subscription" => ClaimType::Subscription,
            "beta_tester" => ClaimType::BetaTester,
            _ => ClaimType::Other(value),
        }
    }
}

impl From<&str> for ClaimType {
    fn from(value: &str) -> Self {
        ClaimType::from(value.to_string())
    }
}

impl From<ClaimType> for String {
    fn from(value: ClaimType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub value: String,
    /// Issuer of the claim when it came from an external provider; `None` for local claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Claim {
    pub fn new(claim_type: impl Into<ClaimType>, value: impl Into<String>) -> Self {
        // `Other` holding a known name becomes the named variant
        let claim_type = match claim_type.into() {
            ClaimType::Other(name) => ClaimType::from(name),
            known => known,
        };
        Self {
            claim_type,
            value: value.into(),
            issuer: None,
        }
    }

    pub fn issued_by(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// Authenticated subject with its ordered claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub claims: Vec<Claim>,
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>, claims: Vec<Claim>) -> Self {
        Self { id: id.into(), claims }
    }

    /// Exact, case-sensitive match on claim type and value.
    pub fn has_claim(&self, claim_type: &ClaimType, value: &str) -> bool {
        self.claims.iter().any(|c| &c.claim_type == claim_type && c.value == value)
    }

    pub fn find_first(&self, claim_type: &ClaimType) -> Option<&str> {
        self.claims.iter().find(|c| &c.claim_type == claim_type).map(|c| c.value.as_str())
    }
}

/// Metadata keys the sign-in flow itself reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum TicketItem {
    /// Local path to send the user to once sign-in completes
    ReturnUrl(String),
    /// Name of the identity provider that authenticated the principal
    IdentityProvider(String),
    /// Provider id token, replayed as a hint on federated sign-out
    IdTokenHint(String),
}

impl TicketItem {
    fn same_key(&self, other: &TicketItem) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Scheme-specific ticket metadata: typed entries for known keys plus opaque provider extras.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketItems {
    #[serde(default)]
    known: Vec<TicketItem>,
    #[serde(default)]
    extras: BTreeMap<String, String>,
}

impl TicketItems {
    /// Set a known item, replacing any previous value for the same key.
    pub fn set(&mut self, item: TicketItem) {
        match self.known.iter_mut().find(|existing| existing.same_key(&item)) {
            Some(existing) => *existing = item,
            None => self.known.push(item),
        }
    }

    pub fn with(mut self, item: TicketItem) -> Self {
        self.set(item);
        self
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.insert(key.into(), value.into());
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    pub fn known(&self) -> &[TicketItem] {
        &self.known
    }

    pub fn return_url(&self) -> Option<&str> {
        self.known.iter().find_map(|item| match item {
            TicketItem::ReturnUrl(url) => Some(url.as_str()),
            _ => None,
        })
    }

    pub fn identity_provider(&self) -> Option<&str> {
        self.known.iter().find_map(|item| match item {
            TicketItem::IdentityProvider(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn id_token_hint(&self) -> Option<&str> {
        self.known.iter().find_map(|item| match item {
            TicketItem::IdTokenHint(hint) => Some(hint.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ticket expiry must be after its issue time")]
pub struct InvalidTicketLifetime;

/// One authenticated session.
///
/// Immutable once issued; the only way to move `expires_at` is [`AuthTicket::renewed`], which
/// returns a new ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    principal: Principal,
    scheme_name: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_persistent: bool,
    items: TicketItems,
}

impl AuthTicket {
    pub fn new(
        principal: Principal,
        scheme_name: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        is_persistent: bool,
        items: TicketItems,
    ) -> Result<Self, InvalidTicketLifetime> {
        if expires_at <= issued_at {
            return Err(InvalidTicketLifetime);
        }
        Ok(Self {
            principal,
            scheme_name: scheme_name.into(),
            issued_at,
            expires_at,
            is_persistent,
            items,
        })
    }

    /// Issue a ticket valid for `lifetime` starting at `now`.
    pub fn issue(
        principal: Principal,
        scheme_name: impl Into<String>,
        now: DateTime<Utc>,
        lifetime: Duration,
        is_persistent: bool,
        items: TicketItems,
    ) -> Result<Self, InvalidTicketLifetime> {
        Self::new(principal, scheme_name, now, now + lifetime, is_persistent, items)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub fn items(&self) -> &TicketItems {
        &self.items
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Sliding renewal is due once more than half of the original window has elapsed.
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        let window = self.expires_at - self.issued_at;
        now - self.issued_at > window / 2 && !self.is_expired(now)
    }

    /// A copy of this ticket re-issued at `now` with a fresh `window`.
    pub fn renewed(&self, now: DateTime<Utc>, window: Duration) -> Result<Self, InvalidTicketLifetime> {
        Self::new(
            self.principal.clone(),
            self.scheme_name.clone(),
            now,
            now + window,
            self.is_persistent,
            self.items.clone(),
        )
    }
}
