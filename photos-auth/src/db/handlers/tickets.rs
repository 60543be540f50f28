//! Database repository for server-side authentication tickets.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::tickets::{TicketCreateDBRequest, TicketDBResponse, TicketUpdateDBRequest},
    },
    types::abbrev,
};

pub struct Tickets<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Tickets<'c> {
    type CreateRequest = TicketCreateDBRequest;
    type UpdateRequest = TicketUpdateDBRequest;
    type Response = TicketDBResponse;
    type Id = String;

    /// Plain INSERT: a primary key clash surfaces as `DbError::UniqueViolation` and is never
    /// resolved by overwriting the existing row.
    #[instrument(skip(self, request), fields(ticket_id = %abbrev(&request.id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>(
            r#"
            INSERT INTO tickets (id, value, last_activity, expires)
            VALUES ($1, $2, $3, $4)
            RETURNING id, value, last_activity, expires
            "#,
        )
        .bind(&request.id)
        .bind(&request.value)
        .bind(request.last_activity)
        .bind(request.expires)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(ticket)
    }

    #[instrument(skip(self, id), fields(ticket_id = %abbrev(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>("SELECT id, value, last_activity, expires FROM tickets WHERE id = $1")
            .bind(&id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(ticket)
    }

    #[instrument(skip(self, id, request), fields(ticket_id = %abbrev(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Option<Self::Response>> {
        let ticket = sqlx::query_as::<_, TicketDBResponse>(
            r#"
            UPDATE tickets
            SET value = $2, last_activity = $3, expires = $4
            WHERE id = $1 AND expires > $5
            RETURNING id, value, last_activity, expires
            "#,
        )
        .bind(&id)
        .bind(&request.value)
        .bind(request.last_activity)
        .bind(request.expires)
        .bind(request.now)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(ticket)
    }

    #[instrument(skip(self, id), fields(ticket_id = %abbrev(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(&id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Tickets<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Physically delete every ticket that expired at or before `now`.
    #[instrument(skip(self), err)]
    pub async fn purge_expired(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tickets WHERE expires <= $1")
            .bind(now)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
