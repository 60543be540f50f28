//! Photo catalog: the resource data behind the ownership requirement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    authz::ownership::{OwnershipError, ResourceOwnership},
    db::{
        errors::{DbError, Result},
        handlers::{Photos, Repository},
        models::photos::{PhotoCreateDBRequest, PhotoDBResponse, PhotoUpdateDBRequest},
    },
    types::{PhotoId, PrincipalId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub owner_id: PrincipalId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<PhotoDBResponse> for Photo {
    fn from(row: PhotoDBResponse) -> Self {
        Self {
            id: row.id,
            owner_id: PrincipalId::new(row.owner_id),
            title: row.title,
            created_at: row.created_at,
        }
    }
}

#[async_trait::async_trait]
pub trait PhotoCatalog: Send + Sync {
    async fn get(&self, id: PhotoId) -> Result<Option<Photo>>;
    async fn create(&self, owner: &PrincipalId, title: &str) -> Result<Photo>;
    async fn rename(&self, id: PhotoId, title: &str) -> Result<Option<Photo>>;
    async fn owner_of(&self, id: PhotoId) -> Result<Option<PrincipalId>>;
}

#[derive(Debug, Clone)]
pub struct PgPhotoCatalog {
    pool: PgPool,
}

impl PgPhotoCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PhotoCatalog for PgPhotoCatalog {
    async fn get(&self, id: PhotoId) -> Result<Option<Photo>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Photos::new(&mut conn).get_by_id(id).await?.map(Photo::from))
    }

    async fn create(&self, owner: &PrincipalId, title: &str) -> Result<Photo> {
        let mut conn = self.pool.acquire().await?;
        let request = PhotoCreateDBRequest {
            owner_id: owner.as_str().to_string(),
            title: title.to_string(),
        };
        Ok(Photos::new(&mut conn).create(&request).await?.into())
    }

    async fn rename(&self, id: PhotoId, title: &str) -> Result<Option<Photo>> {
        let mut conn = self.pool.acquire().await?;
        let request = PhotoUpdateDBRequest { title: title.to_string() };
        Ok(Photos::new(&mut conn).update(id, &request).await?.map(Photo::from))
    }

    async fn owner_of(&self, id: PhotoId) -> Result<Option<PrincipalId>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Photos::new(&mut conn).get_owner(id).await?.map(PrincipalId::new))
    }
}

/// In-process catalog for development and tests.
#[derive(Debug, Default)]
pub struct MemoryPhotoCatalog {
    photos: DashMap<PhotoId, Photo>,
}

impl MemoryPhotoCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PhotoCatalog for MemoryPhotoCatalog {
    async fn get(&self, id: PhotoId) -> Result<Option<Photo>> {
        Ok(self.photos.get(&id).map(|p| p.value().clone()))
    }

    async fn create(&self, owner: &PrincipalId, title: &str) -> Result<Photo> {
        let photo = Photo {
            id: Uuid::new_v4(),
            owner_id: owner.clone(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.photos.insert(photo.id, photo.clone());
        Ok(photo)
    }

    async fn rename(&self, id: PhotoId, title: &str) -> Result<Option<Photo>> {
        Ok(self.photos.get_mut(&id).map(|mut photo| {
            photo.title = title.to_string();
            photo.clone()
        }))
    }

    async fn owner_of(&self, id: PhotoId) -> Result<Option<PrincipalId>> {
        Ok(self.photos.get(&id).map(|p| p.owner_id.clone()))
    }
}

/// Ownership collaborator over the photo catalog. Resource ids that are not photo ids are
/// unknown resources.
#[derive(Clone)]
pub struct PhotoOwnership {
    catalog: Arc<dyn PhotoCatalog>,
}

impl PhotoOwnership {
    pub fn new(catalog: Arc<dyn PhotoCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait::async_trait]
impl ResourceOwnership for PhotoOwnership {
    #[instrument(skip(self), err(level = "debug"))]
    async fn is_owner(&self, principal_id: &PrincipalId, resource_id: &str) -> std::result::Result<bool, OwnershipError> {
        let photo_id: PhotoId = resource_id.parse().map_err(|_| OwnershipError::ResourceNotFound)?;

        match self.catalog.owner_of(photo_id).await {
            Ok(Some(owner)) => Ok(&owner == principal_id),
            Ok(None) | Err(DbError::NotFound) => Err(OwnershipError::ResourceNotFound),
            Err(e) => Err(OwnershipError::Lookup(e.to_string())),
        }
    }
}
