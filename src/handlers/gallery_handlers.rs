//! JSON endpoints consumed by the gallery and per-photo pages.

use crate::{
    errors::AppError,
    models::image::ImageEntry,
    services::delivery::{DEFAULT_WIDTH, Rendition, image_url, srcset},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

/// Per-photo pages not enumerated at build time are generated on request.
const FALLBACK: &str = "blocking";

#[derive(Serialize)]
pub struct GalleryResponse {
    pub images: Vec<ImageEntry>,
    /// Seconds until the listing is recomputed.
    pub revalidate: u64,
}

#[derive(Serialize)]
pub struct PhotoResponse {
    pub photo: ImageEntry,
    pub src: String,
    pub srcset: Vec<Rendition>,
}

#[derive(Serialize)]
pub struct PhotoPathsResponse {
    pub paths: Vec<String>,
    pub fallback: &'static str,
}

/// `GET /api/gallery`
pub async fn list_gallery(State(state): State<AppState>) -> Result<Json<GalleryResponse>, AppError> {
    let images = state.gallery.images().await?;
    Ok(Json(GalleryResponse {
        images: images.as_ref().clone(),
        revalidate: state.gallery.revalidate().as_secs(),
    }))
}

/// `GET /api/photos/{idx}`
pub async fn get_photo(
    State(state): State<AppState>,
    Path(idx): Path<usize>,
) -> Result<Json<PhotoResponse>, AppError> {
    let photo = state.gallery.photo(idx).await?;
    Ok(Json(PhotoResponse {
        src: image_url(&state.distribution_domain, DEFAULT_WIDTH, &photo.filename),
        srcset: srcset(&state.distribution_domain, &photo.filename),
        photo,
    }))
}

/// `GET /api/photo-paths`
pub async fn photo_paths(
    State(state): State<AppState>,
) -> Result<Json<PhotoPathsResponse>, AppError> {
    let images = state.gallery.images().await?;
    Ok(Json(PhotoPathsResponse {
        paths: images.iter().map(|img| format!("/p/{}", img.idx)).collect(),
        fallback: FALLBACK,
    }))
}
