use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Domain errors shared by the index builder, the upload endpoint and the
/// upload queue.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("bucket `{0}` does not exist")]
    BucketMissing(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("photo {0} not found")]
    PhotoNotFound(usize),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("upload transport error: {0}")]
    UploadTransport(String),
    #[error("upload queue is no longer running")]
    QueueClosed,
}

pub type GalleryResult<T> = Result<T, GalleryError>;

impl From<StorageError> for GalleryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(bucket) => GalleryError::BucketMissing(bucket),
            StorageError::ObjectNotFound { bucket, key } => {
                GalleryError::ObjectNotFound { bucket, key }
            }
            err @ (StorageError::InvalidObjectKey
            | StorageError::InvalidBucketName { .. }
            | StorageError::BucketAlreadyExists(_)) => {
                GalleryError::ValidationFailed(err.to_string())
            }
            err @ (StorageError::Sqlx(_) | StorageError::Io(_)) => {
                GalleryError::StorageUnavailable(err.to_string())
            }
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::PhotoNotFound(_) | GalleryError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        GalleryError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_onto_the_taxonomy() {
        let missing = GalleryError::from(StorageError::BucketNotFound("photos".into()));
        assert!(matches!(missing, GalleryError::BucketMissing(ref bucket) if bucket == "photos"));

        let invalid = GalleryError::from(StorageError::InvalidObjectKey);
        assert!(matches!(invalid, GalleryError::ValidationFailed(_)));

        let io = GalleryError::from(StorageError::Io(std::io::Error::other("disk gone")));
        assert!(matches!(io, GalleryError::StorageUnavailable(ref msg) if msg.contains("disk gone")));
    }

    #[test]
    fn only_absence_maps_to_not_found() {
        assert_eq!(
            AppError::from(GalleryError::PhotoNotFound(3)).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(GalleryError::ValidationFailed("not an image".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(GalleryError::StorageUnavailable("db".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_bucket_is_a_server_error() {
        let err = AppError::from(StorageError::BucketNotFound("photos".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("photos"));
    }
}
