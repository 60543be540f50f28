//! Server-side ticket store.
//!
//! The cookie only ever carries an opaque [`SessionId`]; the serialized [`AuthTicket`] lives in a
//! [`SessionBackend`]. Two backends ship with the crate:
//!
//! - [`MemorySessionBackend`]: process-local `DashMap`, lost on restart
//! - [`PostgresSessionBackend`]: the `tickets` table via [`crate::db::handlers::Tickets`]
//!
//! Every backend call made by [`TicketStore`] is bounded by the configured operation timeout. A
//! timeout or I/O failure surfaces as [`TicketStoreError::StoreUnavailable`]; callers on the
//! authentication path treat that as "no session".
//!
//! Expired records are invisible to [`TicketStore::retrieve`] as soon as their expiry passes,
//! regardless of when the sweeper physically deletes them.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use sqlx::PgPool;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::{
    auth::{
        ticket::AuthTicket,
        ticket_format::{TicketFormat, TicketFormatError},
    },
    clock::Clock,
    crypto::generate_session_id,
    db::{
        errors::DbError,
        handlers::{Repository, Tickets},
        models::tickets::{TicketCreateDBRequest, TicketUpdateDBRequest},
    },
    types::{SessionId, abbrev},
};

/// Persisted counterpart of an [`AuthTicket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub payload: Vec<u8>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("session id already exists")]
    Duplicate,

    #[error("session backend unavailable: {0}")]
    Unavailable(String),
}

impl From<DbError> for BackendError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation { .. } => BackendError::Duplicate,
            other => BackendError::Unavailable(other.to_string()),
        }
    }
}

/// Key to opaque-blob persistence with an expiry notion.
///
/// Implementations must make `insert`, `replace` and `remove` atomic per session id: a reader
/// racing any of them sees either the previous record or the new state, never a partial write.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Insert a new record. Fails with [`BackendError::Duplicate`] if the id is taken; existing
    /// records are never overwritten.
    async fn insert(&self, record: SessionRecord) -> Result<(), BackendError>;

    async fn fetch(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, BackendError>;

    /// Replace the payload of a record that is still live at `now`. Returns `false` when there is
    /// no such record.
    async fn replace(&self, record: SessionRecord, now: DateTime<Utc>) -> Result<bool, BackendError>;

    /// Delete a record. Deleting an unknown id is not an error.
    async fn remove(&self, session_id: &SessionId) -> Result<(), BackendError>;

    /// Physically delete every record expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, BackendError>;
}

#[derive(Debug, Error)]
pub enum TicketStoreError {
    /// Unknown, revoked or expired session id
    #[error("session not found")]
    NotFound,

    #[error("ticket store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("corrupt ticket: {0}")]
    CorruptTicket(String),

    /// A freshly generated id already existed. With 256 bits of entropy this indicates a broken
    /// random source, so it is never retried.
    #[error("generated session id collided with an existing session")]
    SessionIdCollision,

    #[error("failed to encode ticket: {0}")]
    Encode(String),
}

impl From<TicketFormatError> for TicketStoreError {
    fn from(err: TicketFormatError) -> Self {
        match err {
            TicketFormatError::Corrupt(reason) => TicketStoreError::CorruptTicket(reason),
            TicketFormatError::Encode(reason) => TicketStoreError::Encode(reason),
        }
    }
}

#[derive(Clone)]
pub struct TicketStore {
    backend: Arc<dyn SessionBackend>,
    format: TicketFormat,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl TicketStore {
    pub fn new(backend: Arc<dyn SessionBackend>, format: TicketFormat, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            format,
            timeout,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn bounded<T>(&self, operation: &'static str, fut: impl Future<Output = Result<T, BackendError>>) -> Result<T, TicketStoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(BackendError::Duplicate)) => Err(TicketStoreError::SessionIdCollision),
            Ok(Err(BackendError::Unavailable(reason))) => Err(TicketStoreError::StoreUnavailable { reason }),
            Err(_) => Err(TicketStoreError::StoreUnavailable {
                reason: format!("{operation} timed out after {:?}", self.timeout),
            }),
        }
    }

    /// Persist a ticket under a freshly generated session id.
    #[instrument(skip_all, fields(principal_id = %ticket.principal().id), err)]
    pub async fn create(&self, ticket: &AuthTicket) -> Result<SessionId, TicketStoreError> {
        let payload = self.format.serialize(ticket)?;
        let session_id = generate_session_id();
        let record = SessionRecord {
            session_id: session_id.clone(),
            payload,
            last_activity: self.clock.now(),
            expires_at: ticket.expires_at(),
        };

        match self.bounded("create", self.backend.insert(record)).await {
            Ok(()) => {
                debug!(session_id = %session_id, "Created session");
                Ok(session_id)
            }
            Err(TicketStoreError::SessionIdCollision) => {
                error!(session_id = %session_id, "Generated session id collided with a live session");
                Err(TicketStoreError::SessionIdCollision)
            }
            Err(e) => Err(e),
        }
    }

    /// Load the ticket for a session id. Expired records are reported as `NotFound` and deleted
    /// on a best-effort basis.
    #[instrument(skip_all, fields(session_id = %session_id), err(level = "debug"))]
    pub async fn retrieve(&self, session_id: &SessionId) -> Result<AuthTicket, TicketStoreError> {
        let now = self.clock.now();
        let record = self
            .bounded("retrieve", self.backend.fetch(session_id))
            .await?
            .ok_or(TicketStoreError::NotFound)?;

        if record.expires_at <= now {
            debug!("Session expired, removing lazily");
            if let Err(e) = self.bounded("remove expired", self.backend.remove(session_id)).await {
                debug!(error = %e, "Lazy removal of expired session failed, leaving it to the sweeper");
            }
            return Err(TicketStoreError::NotFound);
        }

        let ticket = self.format.deserialize(&record.payload)?;
        if ticket.is_expired(now) {
            return Err(TicketStoreError::NotFound);
        }
        Ok(ticket)
    }

    /// Replace the ticket stored under `session_id` in place. The id never changes, so concurrent
    /// requests carrying the same cookie keep resolving during renewal.
    #[instrument(skip_all, fields(session_id = %session_id), err(level = "debug"))]
    pub async fn renew(&self, session_id: &SessionId, ticket: &AuthTicket) -> Result<(), TicketStoreError> {
        let now = self.clock.now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            payload: self.format.serialize(ticket)?,
            last_activity: now,
            expires_at: ticket.expires_at(),
        };

        if self.bounded("renew", self.backend.replace(record, now)).await? {
            Ok(())
        } else {
            Err(TicketStoreError::NotFound)
        }
    }

    /// Delete a session. Revoking an unknown or already revoked id succeeds.
    #[instrument(skip_all, fields(session_id = %session_id), err)]
    pub async fn revoke(&self, session_id: &SessionId) -> Result<(), TicketStoreError> {
        self.bounded("revoke", self.backend.remove(session_id)).await
    }

    #[instrument(skip_all, err)]
    pub async fn purge_expired(&self) -> Result<u64, TicketStoreError> {
        let now = self.clock.now();
        self.bounded("purge", self.backend.purge_expired(now)).await
    }
}

/// Process-local backend. Sessions do not survive a restart; requests carrying a cookie from a
/// previous process are simply unauthenticated.
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn insert(&self, record: SessionRecord) -> Result<(), BackendError> {
        match self.records.entry(record.session_id.expose().to_string()) {
            Entry::Occupied(_) => Err(BackendError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn fetch(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, BackendError> {
        Ok(self.records.get(session_id.expose()).map(|r| r.value().clone()))
    }

    async fn replace(&self, record: SessionRecord, now: DateTime<Utc>) -> Result<bool, BackendError> {
        match self.records.get_mut(record.session_id.expose()) {
            Some(mut existing) if existing.expires_at > now => {
                *existing = record;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), BackendError> {
        self.records.remove(session_id.expose());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, BackendError> {
        let mut purged = 0u64;
        self.records.retain(|_, record| {
            let live = record.expires_at > now;
            if !live {
                purged += 1;
            }
            live
        });
        Ok(purged)
    }
}

/// Backend over the `tickets` table.
#[derive(Debug, Clone)]
pub struct PostgresSessionBackend {
    pool: PgPool,
}

impl PostgresSessionBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, BackendError> {
        self.pool.acquire().await.map_err(|e| BackendError::from(DbError::from(e)))
    }
}

#[async_trait::async_trait]
impl SessionBackend for PostgresSessionBackend {
    async fn insert(&self, record: SessionRecord) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;
        let request = TicketCreateDBRequest {
            id: record.session_id.expose().to_string(),
            value: record.payload,
            last_activity: record.last_activity,
            expires: record.expires_at,
        };
        Tickets::new(&mut conn).create(&request).await?;
        Ok(())
    }

    async fn fetch(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, BackendError> {
        let mut conn = self.conn().await?;
        let row = Tickets::new(&mut conn).get_by_id(session_id.expose().to_string()).await?;

        Ok(row.map(|row| SessionRecord {
            session_id: SessionId::from_raw(row.id),
            payload: row.value,
            last_activity: row.last_activity,
            expires_at: row.expires,
        }))
    }

    async fn replace(&self, record: SessionRecord, now: DateTime<Utc>) -> Result<bool, BackendError> {
        let mut conn = self.conn().await?;
        let request = TicketUpdateDBRequest {
            value: record.payload,
            last_activity: record.last_activity,
            expires: record.expires_at,
            now,
        };
        let updated = Tickets::new(&mut conn)
            .update(record.session_id.expose().to_string(), &request)
            .await?;
        Ok(updated.is_some())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;
        let deleted = Tickets::new(&mut conn).delete(session_id.expose().to_string()).await?;
        if !deleted {
            debug!(session_id = %abbrev(session_id.expose()), "Revoked unknown session");
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, BackendError> {
        let mut conn = self.conn().await?;
        let purged = Tickets::new(&mut conn).purge_expired(now).await.map_err(|e| {
            warn!(error = %e, "Failed to purge expired tickets");
            BackendError::from(e)
        })?;
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::ticket::{Claim, ClaimType, Principal, TicketItem, TicketItems},
        clock::ManualClock,
    };
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn ticket_at(now: DateTime<Utc>, minutes: i64) -> AuthTicket {
        let principal = Principal::new(
            "alice",
            vec![
                Claim::new(ClaimType::Subscription, "paid"),
                Claim::new(ClaimType::Email, "alice@example.com"),
            ],
        );
        let items = TicketItems::default().with(TicketItem::ReturnUrl("/photos".to_string()));
        AuthTicket::issue(principal, "Cookies", now, chrono::Duration::minutes(minutes), false, items).unwrap()
    }

    fn store_with_clock() -> (TicketStore, Arc<MemorySessionBackend>, Arc<ManualClock>) {
        let backend = Arc::new(MemorySessionBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let store = TicketStore::new(backend.clone(), TicketFormat::default(), Duration::from_secs(1), clock.clone());
        (store, backend, clock)
    }

    #[tokio::test]
    async fn test_create_then_retrieve_returns_same_ticket() {
        let (store, _, _) = store_with_clock();
        let ticket = ticket_at(start(), 60);

        let id = store.create(&ticket).await.unwrap();
        let loaded = store.retrieve(&id).await.unwrap();

        assert_eq!(loaded, ticket);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (store, _, _) = store_with_clock();
        let result = store.retrieve(&SessionId::from_raw("does-not-exist")).await;
        assert!(matches!(result, Err(TicketStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (store, backend, _) = store_with_clock();
        let id = store.create(&ticket_at(start(), 60)).await.unwrap();

        store.revoke(&id).await.unwrap();
        assert!(backend.is_empty());
        assert!(matches!(store.retrieve(&id).await, Err(TicketStoreError::NotFound)));

        store.revoke(&id).await.unwrap();
        assert!(backend.is_empty());
        assert!(matches!(store.retrieve(&id).await, Err(TicketStoreError::NotFound)));

        store.revoke(&SessionId::from_raw("never-issued")).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_ticket_hidden_before_sweep() {
        let (store, backend, clock) = store_with_clock();
        let id = store.create(&ticket_at(start(), 60)).await.unwrap();

        clock.advance(chrono::Duration::minutes(60));
        assert!(matches!(store.retrieve(&id).await, Err(TicketStoreError::NotFound)));
        // lazily removed on the failed lookup
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_renew_keeps_session_id_and_replaces_payload() {
        let (store, _, clock) = store_with_clock();
        let ticket = ticket_at(start(), 60);
        let id = store.create(&ticket).await.unwrap();

        clock.advance(chrono::Duration::minutes(40));
        let renewed = ticket.renewed(clock.now(), chrono::Duration::minutes(60)).unwrap();
        store.renew(&id, &renewed).await.unwrap();

        // past the original expiry but inside the renewed window
        clock.advance(chrono::Duration::minutes(30));
        let loaded = store.retrieve(&id).await.unwrap();
        assert_eq!(loaded, renewed);
    }

    #[tokio::test]
    async fn test_renew_of_revoked_or_expired_session_is_not_found() {
        let (store, _, clock) = store_with_clock();
        let ticket = ticket_at(start(), 60);

        let revoked = store.create(&ticket).await.unwrap();
        store.revoke(&revoked).await.unwrap();
        assert!(matches!(store.renew(&revoked, &ticket).await, Err(TicketStoreError::NotFound)));

        let expired = store.create(&ticket).await.unwrap();
        clock.advance(chrono::Duration::minutes(61));
        let late = ticket.renewed(clock.now(), chrono::Duration::minutes(60)).unwrap();
        assert!(matches!(store.renew(&expired, &late).await, Err(TicketStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_purge_expired_only_removes_expired() {
        let (store, backend, clock) = store_with_clock();
        store.create(&ticket_at(start(), 10)).await.unwrap();
        store.create(&ticket_at(start(), 20)).await.unwrap();
        let live = store.create(&ticket_at(start(), 120)).await.unwrap();

        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(backend.len(), 1);
        assert!(store.retrieve(&live).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_reported() {
        let (store, backend, _) = store_with_clock();
        let id = SessionId::from_raw("corrupted");
        backend
            .insert(SessionRecord {
                session_id: id.clone(),
                payload: b"not a ticket".to_vec(),
                last_activity: start(),
                expires_at: start() + chrono::Duration::minutes(60),
            })
            .await
            .unwrap();

        assert!(matches!(store.retrieve(&id).await, Err(TicketStoreError::CorruptTicket(_))));
    }

    #[tokio::test]
    async fn test_backend_rejects_duplicate_insert() {
        let backend = MemorySessionBackend::new();
        let record = SessionRecord {
            session_id: SessionId::from_raw("same"),
            payload: vec![1],
            last_activity: start(),
            expires_at: start() + chrono::Duration::minutes(1),
        };
        backend.insert(record.clone()).await.unwrap();

        let mut second = record.clone();
        second.payload = vec![2];
        assert!(matches!(backend.insert(second).await, Err(BackendError::Duplicate)));
        assert_eq!(backend.fetch(&record.session_id).await.unwrap().unwrap().payload, vec![1]);
    }

    #[derive(Default)]
    struct StalledBackend {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SessionBackend for StalledBackend {
        async fn insert(&self, _record: SessionRecord) -> Result<(), BackendError> {
            Err(BackendError::Duplicate)
        }

        async fn fetch(&self, _session_id: &SessionId) -> Result<Option<SessionRecord>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }

        async fn replace(&self, _record: SessionRecord, _now: DateTime<Utc>) -> Result<bool, BackendError> {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }

        async fn remove(&self, _session_id: &SessionId) -> Result<(), BackendError> {
            Ok(())
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, BackendError> {
            Ok(0)
        }
    }

    fn stalled_store() -> (TicketStore, Arc<StalledBackend>) {
        let backend = Arc::new(StalledBackend::default());
        let store = TicketStore::new(
            backend.clone(),
            TicketFormat::default(),
            Duration::from_millis(50),
            Arc::new(ManualClock::new(start())),
        );
        (store, backend)
    }

    #[tokio::test]
    async fn test_slow_backend_surfaces_store_unavailable() {
        let (store, backend) = stalled_store();

        let result = store.retrieve(&SessionId::from_raw("any")).await;
        assert!(matches!(result, Err(TicketStoreError::StoreUnavailable { reason }) if reason.contains("timed out")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_are_mapped() {
        let (store, _) = stalled_store();
        let ticket = ticket_at(start(), 60);

        assert!(matches!(store.create(&ticket).await, Err(TicketStoreError::SessionIdCollision)));
        assert!(matches!(
            store.renew(&SessionId::from_raw("any"), &ticket).await,
            Err(TicketStoreError::StoreUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_revoke_and_retrieve() {
        let (store, _, _) = store_with_clock();
        let id = store.create(&ticket_at(start(), 60)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                if i == 10 {
                    store.revoke(&id).await.map(|_| None)
                } else {
                    match store.retrieve(&id).await {
                        Ok(ticket) => Ok(Some(ticket)),
                        Err(TicketStoreError::NotFound) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        for handle in handles {
            if let Some(ticket) = handle.await.unwrap().unwrap() {
                assert_eq!(ticket.principal().id.as_str(), "alice");
            }
        }
        assert!(matches!(store.retrieve(&id).await, Err(TicketStoreError::NotFound)));
    }
}
