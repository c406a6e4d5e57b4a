//! Subcommand entrypoints.

use crate::{
    build_app, build_state,
    client::{
        last_viewed::LastViewedPhoto,
        transport::RouterTransport,
        upload_manager::{UploadManager, UploaderSettings},
    },
    config::{AppConfig, Command},
    models::{
        image::{ImageEntry, ImageMetadata},
        upload::{FileHandle, UploadStatus},
    },
    open_store,
    services::{
        delivery::{DEFAULT_WIDTH, image_url},
        gallery_index::basename,
        storage_service::{BlobStore, PutOptions, SqliteBlobStore},
    },
};
use anyhow::{Context, Result, bail};
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs, net::TcpListener};
use tracing::{debug, info, warn};

const UPLOAD_PATH: &str = "/api/asset";

pub async fn run(cfg: AppConfig, command: Command) -> Result<()> {
    match command {
        Command::Serve => serve(cfg).await,
        Command::Migrate => migrate(cfg).await,
        Command::Upload {
            files,
            timeout_secs,
        } => upload(cfg, &files, timeout_secs.map(Duration::from_secs)).await,
        Command::List => list(cfg).await,
        Command::Show { idx } => show(cfg, idx).await,
        Command::Import {
            file,
            width,
            height,
        } => import(cfg, &file, ImageMetadata { width, height }).await,
    }
}

async fn serve(cfg: AppConfig) -> Result<()> {
    let store = open_gallery_store(&cfg).await?;
    let app = build_app(&cfg, build_state(&cfg, store));

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr, err, fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn migrate(cfg: AppConfig) -> Result<()> {
    open_gallery_store(&cfg).await?;
    info!(bucket = %cfg.bucket, "Database migration complete.");
    Ok(())
}

/// Open the store and make sure the gallery bucket exists.
async fn open_gallery_store(cfg: &AppConfig) -> Result<Arc<SqliteBlobStore>> {
    let store = open_store(cfg).await?;
    store
        .ensure_bucket(&cfg.bucket)
        .await
        .with_context(|| format!("creating bucket `{}`", cfg.bucket))?;
    Ok(store)
}

async fn upload(cfg: AppConfig, paths: &[PathBuf], timeout: Option<Duration>) -> Result<()> {
    let store = open_gallery_store(&cfg).await?;
    let app = build_app(&cfg, build_state(&cfg, store));
    let transport = Arc::new(RouterTransport::new(app, UPLOAD_PATH));
    let manager = UploadManager::spawn(
        transport,
        UploaderSettings {
            request_timeout: timeout,
            ..UploaderSettings::default()
        },
    );

    let mut progress = manager.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let (in_flight, settled) = {
                let items = progress.borrow_and_update();
                (
                    items
                        .iter()
                        .filter(|item| item.status == UploadStatus::Uploading)
                        .count(),
                    items.iter().filter(|item| item.status.is_settled()).count(),
                )
            };
            debug!(in_flight, settled, "upload progress");
        }
    });

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_local_file(path).await?);
    }
    manager.add_files(files).await?;
    manager.submit_all().await?;

    let settled = manager.wait_until_settled().await?;
    reporter.abort();
    let mut failures = 0;
    for item in &settled {
        match item.status {
            UploadStatus::Uploaded => info!(file = item.file.name(), "uploaded"),
            UploadStatus::TooLarge => {
                failures += 1;
                warn!(file = item.file.name(), size = item.file.size(), "skipped, larger than 10 MiB");
            }
            status => {
                failures += 1;
                warn!(file = item.file.name(), ?status, "upload did not complete");
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files were not uploaded", failures, settled.len());
    }
    Ok(())
}

/// Print the gallery. The photo `show` displayed last is marked once,
/// then forgotten.
async fn list(cfg: AppConfig) -> Result<()> {
    let store = open_gallery_store(&cfg).await?;
    let state = build_state(&cfg, store);
    let images = state.gallery.images().await?;

    let mut last_viewed = LastViewedPhoto::load(&cfg.last_viewed_path).await;
    let highlight = last_viewed.take();
    for line in render_listing(&images, highlight) {
        println!("{}", line);
    }
    if highlight.is_some() {
        last_viewed
            .save(&cfg.last_viewed_path)
            .await
            .with_context(|| format!("writing {}", cfg.last_viewed_path.display()))?;
    }
    Ok(())
}

async fn show(cfg: AppConfig, idx: usize) -> Result<()> {
    let store = open_gallery_store(&cfg).await?;
    let state = build_state(&cfg, store);
    let photo = state.gallery.photo(idx).await?;

    println!(
        "{}\t{}x{}\t{}",
        photo.filename,
        photo.meta.width,
        photo.meta.height,
        image_url(&state.distribution_domain, DEFAULT_WIDTH, &photo.filename)
    );

    let mut last_viewed = LastViewedPhoto::load(&cfg.last_viewed_path).await;
    last_viewed.remember(photo.idx);
    last_viewed
        .save(&cfg.last_viewed_path)
        .await
        .with_context(|| format!("writing {}", cfg.last_viewed_path.display()))?;
    Ok(())
}

fn render_listing(images: &[ImageEntry], highlight: Option<usize>) -> Vec<String> {
    images
        .iter()
        .map(|img| {
            let marker = if Some(img.idx) == highlight { '*' } else { ' ' };
            format!(
                "{} {:>4}  {}  {}x{}",
                marker, img.idx, img.filename, img.meta.width, img.meta.height
            )
        })
        .collect()
}

async fn import(cfg: AppConfig, path: &Path, meta: ImageMetadata) -> Result<()> {
    let store = open_gallery_store(&cfg).await?;
    let file = read_local_file(path).await?;
    let key = format!(
        "{}/{}",
        cfg.gallery_prefix.trim_end_matches('/'),
        basename(file.name())
    );

    let options = PutOptions {
        content_type: Some(file.mime_type().to_string()),
        metadata: meta.into_fields(),
    };
    let body = stream::iter([Ok::<_, io::Error>(file.bytes())]).boxed();
    let object = store
        .put_object(&cfg.bucket, &key, options, body)
        .await
        .with_context(|| format!("storing `{}`", key))?;

    info!(location = %object.location(&cfg.bucket), "imported original");
    Ok(())
}

async fn read_local_file(path: &Path) -> Result<FileHandle> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    Ok(FileHandle::new(name, mime_for_path(path), Bytes::from(bytes)))
}

/// MIME type inferred from the file extension.
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
