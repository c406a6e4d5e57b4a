//! How the upload queue reaches the upload endpoint.

use crate::{
    client::form::encode_file_form,
    errors::{GalleryError, GalleryResult},
    models::upload::FileHandle,
    services::upload_service::FILE_FIELD,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
};
use tower::ServiceExt;

/// Sends one file to the upload endpoint. Any non-2xx answer is an error.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, file: &FileHandle) -> GalleryResult<()>;
}

/// Posts multipart requests through an in-process axum router, exercising
/// the same handler stack a remote client would hit.
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
    path: String,
}

impl RouterTransport {
    pub fn new(router: Router, path: impl Into<String>) -> Self {
        Self {
            router,
            path: path.into(),
        }
    }
}

#[async_trait]
impl UploadTransport for RouterTransport {
    async fn upload(&self, file: &FileHandle) -> GalleryResult<()> {
        let form = encode_file_form(FILE_FIELD, file);
        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.path)
            .header(header::CONTENT_TYPE, form.content_type)
            .header(header::CONTENT_LENGTH, form.body.len())
            .body(Body::from(form.body))
            .map_err(|err| GalleryError::UploadTransport(err.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| GalleryError::UploadTransport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GalleryError::UploadTransport(format!(
                "`{}` rejected with {}",
                file.name(),
                status
            )))
        }
    }
}
