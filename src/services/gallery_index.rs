//! Builds the gallery index from a bucket listing.
//!
//! Two phases: a sequential paginated listing of every key under the gallery
//! prefix, then a metadata lookup per key. Lookups may run concurrently but
//! results are consumed in listing order, so `idx` follows the listing.

use crate::{
    errors::{GalleryError, GalleryResult},
    models::image::{ImageEntry, ImageMetadata},
    services::storage_service::{BlobStore, ListRequest, MAX_KEYS_PER_PAGE, StorageError},
};
use futures::{StreamExt, stream};
use tracing::{debug, warn};

/// Where the originals live and how hard to hit the store while indexing.
#[derive(Clone, Debug)]
pub struct IndexSettings {
    pub bucket: String,
    pub prefix: String,
    /// Maximum metadata lookups in flight. `1` resolves keys one at a time.
    pub metadata_concurrency: usize,
}

/// Every key under `prefix`, in listing order.
///
/// A missing bucket is an empty gallery, not an error.
pub async fn list_image_keys(
    store: &dyn BlobStore,
    bucket: &str,
    prefix: &str,
) -> GalleryResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor = None;

    loop {
        let request = ListRequest {
            prefix: Some(prefix.to_string()),
            cursor: cursor.take(),
            max_keys: MAX_KEYS_PER_PAGE,
        };
        match store.list_page(bucket, request).await {
            Ok(page) => {
                keys.extend(page.keys);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Err(StorageError::BucketNotFound(_)) => {
                warn!(bucket, "bucket does not exist, gallery is empty");
                break;
            }
            Err(err) => return Err(GalleryError::from(err)),
        }
    }

    Ok(keys)
}

/// Dimensions of one object, or `None` when they cannot be resolved.
async fn resolve_metadata(store: &dyn BlobStore, bucket: &str, key: &str) -> Option<ImageMetadata> {
    match store.head_metadata(bucket, key).await {
        Ok(fields) => {
            let meta = ImageMetadata::from_object_metadata(&fields);
            if meta.is_none() {
                debug!(key, "skipping object without width/height metadata");
            }
            meta
        }
        Err(err) => {
            debug!(key, error = %err, "skipping object whose metadata could not be read");
            None
        }
    }
}

/// Last path segment of a storage key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// List, resolve and number the gallery's images.
///
/// Objects without resolvable dimensions are left out and do not consume
/// an index.
pub async fn build_gallery_index(
    store: &dyn BlobStore,
    settings: &IndexSettings,
) -> GalleryResult<Vec<ImageEntry>> {
    let keys = list_image_keys(store, &settings.bucket, &settings.prefix).await?;
    let bucket = settings.bucket.as_str();

    let resolved: Vec<(String, Option<ImageMetadata>)> = stream::iter(keys)
        .map(|key| async move {
            let meta = resolve_metadata(store, bucket, &key).await;
            (key, meta)
        })
        .buffered(settings.metadata_concurrency.max(1))
        .collect()
        .await;

    let entries = resolved
        .into_iter()
        .filter_map(|(key, meta)| meta.map(|meta| (key, meta)))
        .enumerate()
        .map(|(idx, (key, meta))| ImageEntry {
            idx,
            filename: basename(&key).to_string(),
            meta,
        })
        .collect::<Vec<_>>();

    debug!(bucket, count = entries.len(), "built gallery index");
    Ok(entries)
}

/// Locate a photo by its index within one build.
pub fn find_by_idx(entries: &[ImageEntry], idx: usize) -> Option<&ImageEntry> {
    entries.iter().find(|entry| entry.idx == idx)
}
