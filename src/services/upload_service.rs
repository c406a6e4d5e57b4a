//! Server side of the upload endpoint: validates an uploaded part and
//! streams it into the blob store under the uploads prefix.

use crate::{
    errors::{GalleryError, GalleryResult},
    models::object::Object,
    services::storage_service::{BlobStore, PutOptions},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::info;

const MIB: u64 = 1024 * 1024;

/// Server-side cap, deliberately looser than the client's 10 MiB gate.
pub const MAX_SERVER_UPLOAD_BYTES: u64 = 20 * MIB;

/// Multipart field that carries the file.
pub const FILE_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct UploadSettings {
    pub bucket: String,
    /// Uploads land at `{prefix}/{filename}`.
    pub prefix: String,
    pub max_bytes: u64,
}

/// Check an incoming part and derive its storage key.
///
/// Only the last path segment of the client's filename is kept.
pub fn prepare_upload(
    settings: &UploadSettings,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> GalleryResult<String> {
    if !content_type.is_some_and(|ct| ct.starts_with("image/")) {
        return Err(GalleryError::ValidationFailed(format!(
            "unsupported content type `{}`, expected an image",
            content_type.unwrap_or("none")
        )));
    }

    let name = filename
        .and_then(|f| f.rsplit(['/', '\\']).next())
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(GalleryError::ValidationFailed(
            "uploaded file has no usable filename".into(),
        ));
    }

    Ok(format!("{}/{}", settings.prefix.trim_end_matches('/'), name))
}

/// Stream `body` to `key`, failing once more than `settings.max_bytes`
/// have been received.
pub async fn store_image<'a, S, E>(
    store: &dyn BlobStore,
    settings: &UploadSettings,
    key: &str,
    content_type: &str,
    body: S,
) -> GalleryResult<Object>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'a,
    E: std::error::Error + Send + Sync + 'static,
{
    let max_bytes = settings.max_bytes;
    let received = Arc::new(AtomicU64::new(0));
    let counter = received.clone();

    let limited = body
        .map(move |chunk| {
            let chunk = chunk.map_err(io::Error::other)?;
            let total = counter.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
            if total > max_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "upload exceeds size limit",
                ));
            }
            Ok(chunk)
        })
        .boxed();

    let options = PutOptions {
        content_type: Some(content_type.to_string()),
        ..PutOptions::default()
    };

    match store.put_object(&settings.bucket, key, options, limited).await {
        Ok(object) => {
            info!(
                key = %object.key,
                size_bytes = object.size_bytes,
                location = %object.location(&settings.bucket),
                "stored upload"
            );
            Ok(object)
        }
        Err(_) if received.load(Ordering::Relaxed) > max_bytes => {
            Err(GalleryError::ValidationFailed(format!(
                "file exceeds the {} MiB upload limit",
                max_bytes / MIB
            )))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gallery_index::tests::FakeStore;
    use futures::stream;

    fn settings(max_bytes: u64) -> UploadSettings {
        UploadSettings {
            bucket: "photos".into(),
            prefix: "assets/uploads/gallery/".into(),
            max_bytes,
        }
    }

    #[test]
    fn keys_use_the_basename_under_the_upload_prefix() {
        let key = prepare_upload(&settings(10), Some("C:\\Users\\me\\sunset.jpg"), Some("image/jpeg"))
            .unwrap();
        assert_eq!(key, "assets/uploads/gallery/sunset.jpg");

        let key = prepare_upload(&settings(10), Some("../../etc/passwd.png"), Some("image/png")).unwrap();
        assert_eq!(key, "assets/uploads/gallery/passwd.png");
    }

    #[test]
    fn rejects_non_images_and_missing_names() {
        for (filename, content_type) in [
            (Some("notes.txt"), Some("text/plain")),
            (Some("photo.jpg"), None),
            (None, Some("image/jpeg")),
            (Some("dir/"), Some("image/jpeg")),
            (Some(".."), Some("image/jpeg")),
        ] {
            let err = prepare_upload(&settings(10), filename, content_type).unwrap_err();
            assert!(matches!(err, GalleryError::ValidationFailed(_)), "{filename:?}");
        }
    }

    #[tokio::test]
    async fn stores_within_the_limit() {
        let store = FakeStore::new("photos");
        let body = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let object = store_image(&store, &settings(6), "assets/uploads/gallery/a.jpg", "image/jpeg", body)
            .await
            .unwrap();
        assert_eq!(object.size_bytes, 6);
        assert_eq!(object.content_type.as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_a_validation_failure() {
        let store = FakeStore::new("photos");
        let body = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"abcd")),
            Ok(Bytes::from_static(b"efgh")),
        ]);
        let err = store_image(&store, &settings(6), "assets/uploads/gallery/a.jpg", "image/jpeg", body)
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::ValidationFailed(msg) if msg.contains("limit")));
    }
}
