//! Defines the HTTP surface of the gallery.
//!
//! ## Structure
//! - **Gallery data**
//!   - `GET  /api/gallery`       ordered image index
//!   - `GET  /api/photos/{idx}`  one photo plus its CDN renditions
//!   - `GET  /api/photo-paths`   per-photo routes known at build time
//!
//! - **Uploads**
//!   - `POST /api/asset`         multipart upload, field `file`
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        gallery_handlers::{get_photo, list_gallery, photo_paths},
        health_handlers::{healthz, readyz},
        upload_handlers::upload_asset,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart boundaries and part headers on top of the file cap.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the router for every gallery route.
///
/// Other methods on `/api/asset` are answered with 405 by the method router.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes + MULTIPART_OVERHEAD_BYTES).unwrap_or(usize::MAX);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/gallery", get(list_gallery))
        .route("/api/photos/{idx}", get(get_photo))
        .route("/api/photo-paths", get(photo_paths))
        .route(
            "/api/asset",
            post(upload_asset).layer(DefaultBodyLimit::max(body_limit)),
        )
}
