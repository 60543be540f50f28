use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database request for creating a new photo
#[derive(Debug, Clone)]
pub struct PhotoCreateDBRequest {
    pub owner_id: String,
    pub title: String,
}

/// Database request for renaming a photo
#[derive(Debug, Clone)]
pub struct PhotoUpdateDBRequest {
    pub title: String,
}

/// Database response for a photo
#[derive(Debug, Clone, FromRow)]
pub struct PhotoDBResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
