//! Shared state handed to every handler.

use crate::services::{
    gallery_cache::GalleryCache, storage_service::BlobStore, upload_service::UploadSettings,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub gallery: GalleryCache,
    pub uploads: UploadSettings,
    /// Host of the CDN distribution serving resized images.
    pub distribution_domain: String,
}
