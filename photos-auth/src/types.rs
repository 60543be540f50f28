//! Common identifier types.
//!
//! - [`PrincipalId`]: stable identity of an authenticated subject (the `sub` of a federated
//!   identity, or a local user id)
//! - [`SessionId`]: opaque ticket-store key placed in the session cookie
//! - [`PhotoId`]: photo resource identifier
//!
//! # Utility Functions
//!
//! - [`abbrev`]: Abbreviate identifiers to their first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PhotoId = Uuid;

/// Abbreviate an identifier to its first 8 characters for more readable logs and traces.
/// Session ids are bearer secrets, so only this prefix is ever logged.
pub fn abbrev(value: &str) -> String {
    value.chars().take(8).collect()
}

/// Stable identity of the authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque, unguessable ticket-store key.
///
/// Generated exclusively by the ticket store (see [`crate::crypto::generate_session_id`]); never
/// derived from user data. `Debug` and `Display` only show an abbreviated prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a value read back from a cookie or the database.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The full identifier, for the cookie value and the storage key only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}…)", abbrev(&self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", abbrev(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_formatting_hides_full_value() {
        let id = SessionId::from_raw("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(format!("{id}"), "abcdefgh…");
        assert_eq!(format!("{id:?}"), "SessionId(abcdefgh…)");
        assert_eq!(id.expose(), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_abbrev_short_values() {
        assert_eq!(abbrev("abc"), "abc");
        assert_eq!(abbrev(""), "");
    }
}
