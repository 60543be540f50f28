//! API request/response models for photos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{photos::Photo, types::PhotoId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoCreate {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoUpdate {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub id: PhotoId,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<Photo> for PhotoResponse {
    fn from(photo: Photo) -> Self {
        Self {
            id: photo.id,
            owner_id: photo.owner_id.as_str().to_string(),
            title: photo.title,
            created_at: photo.created_at,
        }
    }
}
