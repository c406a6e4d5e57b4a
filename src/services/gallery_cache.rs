//! Revalidating cache around the gallery index.
//!
//! The index is rebuilt at most once per revalidation interval. A stale
//! index keeps being served while a single background rebuild runs; only a
//! cold cache makes a request wait for the build.

use crate::{
    errors::{GalleryError, GalleryResult},
    models::image::ImageEntry,
    services::{
        gallery_index::{IndexSettings, build_gallery_index, find_by_idx},
        storage_service::BlobStore,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{debug, warn};

/// A miss against a build younger than this is answered from that build.
pub const MIN_ON_DEMAND_AGE: Duration = Duration::from_secs(1);

struct CachedIndex {
    built_at: Instant,
    images: Arc<Vec<ImageEntry>>,
}

struct CacheInner {
    store: Arc<dyn BlobStore>,
    settings: IndexSettings,
    revalidate: Duration,
    state: RwLock<Option<CachedIndex>>,
    refreshing: AtomicBool,
    /// Serializes cold builds and rebuilds triggered by photo lookups.
    on_demand: Mutex<()>,
}

#[derive(Clone)]
pub struct GalleryCache {
    inner: Arc<CacheInner>,
}

impl GalleryCache {
    pub fn new(store: Arc<dyn BlobStore>, settings: IndexSettings, revalidate: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                settings,
                revalidate,
                state: RwLock::new(None),
                refreshing: AtomicBool::new(false),
                on_demand: Mutex::new(()),
            }),
        }
    }

    pub fn revalidate(&self) -> Duration {
        self.inner.revalidate
    }

    /// The current index, building it first if nothing is cached yet.
    pub async fn images(&self) -> GalleryResult<Arc<Vec<ImageEntry>>> {
        match self.cached().await {
            Some((built_at, images)) => {
                if built_at.elapsed() >= self.inner.revalidate {
                    self.spawn_revalidation();
                }
                Ok(images)
            }
            None => {
                let _building = self.inner.on_demand.lock().await;
                match self.cached().await {
                    Some((_, images)) => Ok(images),
                    None => self.refresh().await,
                }
            }
        }
    }

    /// Rebuild now and replace the cached index.
    pub async fn refresh(&self) -> GalleryResult<Arc<Vec<ImageEntry>>> {
        let images = Arc::new(build_gallery_index(&*self.inner.store, &self.inner.settings).await?);
        *self.inner.state.write().await = Some(CachedIndex {
            built_at: Instant::now(),
            images: images.clone(),
        });
        Ok(images)
    }

    /// Look up one photo. An index missing from the cached build waits for
    /// a rebuild before giving up.
    ///
    /// Concurrent misses share a single rebuild, and a build younger than
    /// [`MIN_ON_DEMAND_AGE`] is never redone for a miss.
    pub async fn photo(&self, idx: usize) -> GalleryResult<ImageEntry> {
        let images = self.images().await?;
        if let Some(entry) = find_by_idx(&images, idx) {
            return Ok(entry.clone());
        }

        let images = self.rebuild_for_miss(idx).await?;
        find_by_idx(&images, idx)
            .cloned()
            .ok_or(GalleryError::PhotoNotFound(idx))
    }

    async fn rebuild_for_miss(&self, idx: usize) -> GalleryResult<Arc<Vec<ImageEntry>>> {
        let requested_at = Instant::now();
        let _rebuilding = self.inner.on_demand.lock().await;

        if let Some((built_at, images)) = self.cached().await {
            if built_at >= requested_at || built_at.elapsed() < MIN_ON_DEMAND_AGE {
                return Ok(images);
            }
        }

        debug!(idx, "photo not in cached index, rebuilding");
        self.refresh().await
    }

    async fn cached(&self) -> Option<(Instant, Arc<Vec<ImageEntry>>)> {
        self.inner
            .state
            .read()
            .await
            .as_ref()
            .map(|c| (c.built_at, c.images.clone()))
    }

    fn spawn_revalidation(&self) {
        if self.inner.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(err) = cache.refresh().await {
                warn!(error = %err, "gallery revalidation failed, keeping stale index");
            }
            cache.inner.refreshing.store(false, Ordering::Release);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gallery_index::tests::FakeStore;
    use std::sync::atomic::Ordering;

    fn cache(store: Arc<FakeStore>) -> GalleryCache {
        GalleryCache::new(
            store,
            IndexSettings {
                bucket: "photos".into(),
                prefix: "g/".into(),
                metadata_concurrency: 4,
            },
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_index_is_served_without_listing() {
        let store = Arc::new(FakeStore::new("photos").with_image("g/a.jpg", 1, 1));
        let cache = cache(store.clone());

        assert_eq!(cache.images().await.unwrap().len(), 1);
        let calls = store.list_calls.load(Ordering::SeqCst);
        store.insert("g/b.jpg", crate::models::image::ImageMetadata { width: 2, height: 2 }.into_fields());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.images().await.unwrap().len(), 1);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_index_is_served_while_rebuilding() {
        let store = Arc::new(FakeStore::new("photos").with_image("g/a.jpg", 1, 1));
        let cache = cache(store.clone());
        cache.images().await.unwrap();

        store.insert("g/b.jpg", crate::models::image::ImageMetadata { width: 2, height: 2 }.into_fields());
        tokio::time::advance(Duration::from_secs(11)).await;

        // The stale build answers immediately.
        assert_eq!(cache.images().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.images().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_photo_falls_back_to_a_rebuild() {
        let store = Arc::new(FakeStore::new("photos").with_image("g/a.jpg", 1, 1));
        let cache = cache(store.clone());
        cache.images().await.unwrap();

        store.insert("g/b.jpg", crate::models::image::ImageMetadata { width: 2, height: 3 }.into_fields());
        tokio::time::advance(MIN_ON_DEMAND_AGE).await;
        let photo = cache.photo(1).await.unwrap();
        assert_eq!(photo.filename, "b.jpg");
        assert_eq!(photo.meta.height, 3);

        store.remove("g/a.jpg");
        tokio::time::advance(MIN_ON_DEMAND_AGE).await;
        let err = cache.photo(7).await.unwrap_err();
        assert!(matches!(err, GalleryError::PhotoNotFound(7)));
        // The rebuild shifted b.jpg down to idx 0.
        assert_eq!(cache.photo(0).await.unwrap().filename, "b.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_photos_share_one_rebuild() {
        let store = Arc::new(FakeStore::new("photos").with_image("g/a.jpg", 1, 1));
        let cache = cache(store.clone());
        cache.images().await.unwrap();
        tokio::time::advance(MIN_ON_DEMAND_AGE).await;
        let before = store.list_calls.load(Ordering::SeqCst);

        let lookups = (0..50).map(|_| cache.photo(999));
        let results = futures::future::join_all(lookups).await;
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(GalleryError::PhotoNotFound(999)))));
        assert_eq!(store.list_calls.load(Ordering::SeqCst), before + 1);

        for _ in 0..50 {
            assert!(cache.photo(999).await.is_err());
        }
        assert_eq!(store.list_calls.load(Ordering::SeqCst), before + 1);

        tokio::time::advance(MIN_ON_DEMAND_AGE).await;
        assert!(cache.photo(999).await.is_err());
        assert_eq!(store.list_calls.load(Ordering::SeqCst), before + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_cache_builds_once_for_concurrent_requests() {
        let store = Arc::new(FakeStore::new("photos").with_image("g/a.jpg", 1, 1));
        let cache = cache(store.clone());

        let results = futures::future::join_all((0..20).map(|_| cache.images())).await;
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|images| images.len() == 1)));
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
    }
}
