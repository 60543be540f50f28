use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::{
    AppState,
    api::models::photos::{PhotoCreate, PhotoResponse, PhotoUpdate},
    auth::current_principal::CurrentPrincipal,
    errors::Error,
    types::PhotoId,
};

pub const PHOTOS_PATH: &str = "/photos";
pub const PHOTO_PATH: &str = "/photos/{photo_id}";

fn validate_title(title: &str) -> Result<&str, Error> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::BadRequest {
            message: "Photo title cannot be empty".to_string(),
        });
    }
    Ok(title)
}

/// Get a photo. Guarded by `MustOwnPhoto`, so only its owner gets here.
#[instrument(skip(state))]
pub async fn get_photo(State(state): State<AppState>, Path(photo_id): Path<PhotoId>) -> Result<Json<PhotoResponse>, Error> {
    let photo = state.photos.get(photo_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Photo".to_string(),
        id: photo_id.to_string(),
    })?;
    Ok(Json(photo.into()))
}

/// Add a photo owned by the caller. Guarded by `CanAddPhoto`.
#[instrument(skip_all, fields(principal_id = %resolved.principal.id))]
pub async fn create_photo(
    State(state): State<AppState>,
    CurrentPrincipal(resolved): CurrentPrincipal,
    Json(request): Json<PhotoCreate>,
) -> Result<(StatusCode, Json<PhotoResponse>), Error> {
    let title = validate_title(&request.title)?;
    let photo = state.photos.create(&resolved.principal.id, title).await?;
    Ok((StatusCode::CREATED, Json(photo.into())))
}

/// Rename a photo. Guarded by `MustOwnPhoto`.
#[instrument(skip(state, request))]
pub async fn rename_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<PhotoId>,
    Json(request): Json<PhotoUpdate>,
) -> Result<Json<PhotoResponse>, Error> {
    let title = validate_title(&request.title)?;
    let photo = state.photos.rename(photo_id, title).await?.ok_or_else(|| Error::NotFound {
        resource: "Photo".to_string(),
        id: photo_id.to_string(),
    })?;
    Ok(Json(photo.into()))
}
