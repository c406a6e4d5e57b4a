//! `POST /api/asset`: accepts one image per request and streams it into
//! the blob store.

use crate::{
    errors::{AppError, GalleryError},
    services::upload_service::{FILE_FIELD, prepare_upload, store_image},
    state::AppState,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use tracing::warn;

pub async fn upload_asset(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, AppError> {
    let mut multipart =
        multipart.map_err(|rejection| GalleryError::ValidationFailed(rejection.body_text()))?;
    let mut stored: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| GalleryError::ValidationFailed(err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        if let Some(key) = stored.take() {
            discard_upload(&state, &key).await;
            return Err(GalleryError::ValidationFailed(
                "only one file may be uploaded per request".into(),
            )
            .into());
        }

        let content_type = field.content_type().map(str::to_owned);
        let key = prepare_upload(&state.uploads, field.file_name(), content_type.as_deref())?;
        let content_type = content_type.unwrap_or_default();
        store_image(&*state.store, &state.uploads, &key, &content_type, field).await?;
        stored = Some(key);
    }

    if stored.is_none() {
        return Err(GalleryError::ValidationFailed("request carried no `file` part".into()).into());
    }
    Ok(StatusCode::CREATED)
}

/// Remove a part stored before the request turned out to be invalid.
async fn discard_upload(state: &AppState, key: &str) {
    if let Err(err) = state.store.delete_object(&state.uploads.bucket, key).await {
        warn!(key, error = %err, "could not discard upload from rejected request");
    }
}
