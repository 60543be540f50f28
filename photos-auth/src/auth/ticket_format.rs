//! Binary framing for persisted tickets.
//!
//! Layout: a 3 byte magic (`PAT`), a 1 byte format version, then the JSON encoded ticket body.
//! When a [`TicketProtector`] is configured the whole frame is sealed with AES-256-GCM before it
//! leaves the process, so the stored blob is opaque and tamper evident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    auth::ticket::{AuthTicket, Principal, TicketItems},
    crypto::TicketProtector,
};

const MAGIC: &[u8; 3] = b"PAT";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1;

#[derive(Debug, Error)]
pub enum TicketFormatError {
    /// The payload is not a ticket this process can read: wrong magic or version, truncated,
    /// failed authentication, or a body that violates the ticket invariants.
    #[error("corrupt ticket: {0}")]
    Corrupt(String),

    #[error("failed to encode ticket: {0}")]
    Encode(String),
}

#[derive(Serialize, Deserialize)]
struct TicketBody {
    principal: Principal,
    scheme: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    persistent: bool,
    #[serde(default)]
    items: TicketItems,
}

/// Serializes tickets to opaque blobs and back.
#[derive(Debug, Clone, Default)]
pub struct TicketFormat {
    protector: Option<TicketProtector>,
}

impl TicketFormat {
    pub fn new(protector: Option<TicketProtector>) -> Self {
        Self { protector }
    }

    pub fn is_protected(&self) -> bool {
        self.protector.is_some()
    }

    pub fn serialize(&self, ticket: &AuthTicket) -> Result<Vec<u8>, TicketFormatError> {
        let body = TicketBody {
            principal: ticket.principal().clone(),
            scheme: ticket.scheme_name().to_string(),
            issued_at: ticket.issued_at(),
            expires_at: ticket.expires_at(),
            persistent: ticket.is_persistent(),
            items: ticket.items().clone(),
        };

        let mut frame = Vec::with_capacity(256);
        frame.extend_from_slice(MAGIC);
        frame.push(FORMAT_VERSION);
        serde_json::to_writer(&mut frame, &body).map_err(|e| TicketFormatError::Encode(e.to_string()))?;

        match &self.protector {
            Some(protector) => protector.protect(&frame).map_err(|e| TicketFormatError::Encode(e.to_string())),
            None => Ok(frame),
        }
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<AuthTicket, TicketFormatError> {
        let frame = match &self.protector {
            Some(protector) => protector.unprotect(bytes).map_err(|e| TicketFormatError::Corrupt(e.to_string()))?,
            None => bytes.to_vec(),
        };

        if frame.len() < HEADER_LEN {
            return Err(TicketFormatError::Corrupt("payload shorter than header".to_string()));
        }
        let (header, body) = frame.split_at(HEADER_LEN);
        if &header[..MAGIC.len()] != MAGIC {
            return Err(TicketFormatError::Corrupt("unrecognised format tag".to_string()));
        }
        let version = header[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(TicketFormatError::Corrupt(format!("unsupported format version {version}")));
        }

        let body: TicketBody = serde_json::from_slice(body).map_err(|e| TicketFormatError::Corrupt(e.to_string()))?;

        AuthTicket::new(
            body.principal,
            body.scheme,
            body.issued_at,
            body.expires_at,
            body.persistent,
            body.items,
        )
        .map_err(|e| TicketFormatError::Corrupt(e.to_string()))
    }
}
