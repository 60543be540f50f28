//! Database repository for photos. Only the columns the ownership check and the demo routes
//! need are modelled here.

use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::photos::{PhotoCreateDBRequest, PhotoDBResponse, PhotoUpdateDBRequest},
    },
    types::PhotoId,
};

pub struct Photos<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Photos<'c> {
    type CreateRequest = PhotoCreateDBRequest;
    type UpdateRequest = PhotoUpdateDBRequest;
    type Response = PhotoDBResponse;
    type Id = PhotoId;

    #[instrument(skip(self, request), fields(owner_id = %request.owner_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let photo = sqlx::query_as::<_, PhotoDBResponse>(
            r#"
            INSERT INTO photos (id, owner_id, title)
            VALUES ($1, $2, $3)
            RETURNING id, owner_id, title, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.owner_id)
        .bind(&request.title)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(photo)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let photo = sqlx::query_as::<_, PhotoDBResponse>("SELECT id, owner_id, title, created_at FROM photos WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(photo)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Option<Self::Response>> {
        let photo = sqlx::query_as::<_, PhotoDBResponse>(
            r#"
            UPDATE photos SET title = $2
            WHERE id = $1
            RETURNING id, owner_id, title, created_at
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(photo)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Photos<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Owner of a photo, without loading the rest of the row
    #[instrument(skip(self), err)]
    pub async fn get_owner(&mut self, id: PhotoId) -> Result<Option<String>> {
        let owner = sqlx::query_scalar::<_, String>("SELECT owner_id FROM photos WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(owner)
    }
}
