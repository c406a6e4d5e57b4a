//! src/services/storage_service.rs
//!
//! The blob store the gallery reads from and uploads into. `BlobStore` is the
//! narrow list/head/put surface the rest of the crate depends on;
//! `SqliteBlobStore` implements it with durable metadata in SQLite and
//! payloads on disk sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::models::{bucket::Bucket, metadata::ObjectMetadata, object::Object};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use serde::Serialize;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
pub const MAX_KEYS_PER_PAGE: usize = 1000;
const DEFAULT_REGION: &str = "local";

/// Parameters for one page of a prefix listing.
#[derive(Clone, Debug)]
pub struct ListRequest {
    pub prefix: Option<String>,
    /// Opaque cursor taken from a previous [`ListPage::next_cursor`].
    pub cursor: Option<String>,
    pub max_keys: usize,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            prefix: None,
            cursor: None,
            max_keys: MAX_KEYS_PER_PAGE,
        }
    }
}

/// One page of keys in lexicographic order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present while more keys remain after this page.
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    /// User metadata; replaces whatever the key carried before.
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

pub type ByteStream<'a> = BoxStream<'a, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The object-store operations the gallery needs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List one page of keys under `request.prefix`.
    async fn list_page(&self, bucket: &str, request: ListRequest) -> StorageResult<ListPage>;

    /// User metadata of a single object.
    async fn head_metadata(&self, bucket: &str, key: &str)
    -> StorageResult<HashMap<String, String>>;

    /// Stream `body` into `bucket/key`, overwriting any previous object.
    async fn put_object<'a>(
        &self,
        bucket: &str,
        key: &str,
        options: PutOptions,
        body: ByteStream<'a>,
    ) -> StorageResult<Object>;

    /// Remove `bucket/key` and its payload.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    async fn create_bucket(&self, name: &str) -> StorageResult<Bucket>;

    /// Dependency checks reported by `/readyz`.
    async fn readiness(&self) -> Vec<ReadinessCheck>;
}

/// `BlobStore` backed by SQLite for metadata and local disk for payloads.
#[derive(Clone)]
pub struct SqliteBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl SqliteBlobStore {
    /// Create a new store backed by the provided SQLite pool and using
    /// `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Create `name` unless it already exists.
    pub async fn ensure_bucket(&self, name: &str) -> StorageResult<()> {
        match self.create_bucket(name).await {
            Ok(_) | Err(StorageError::BucketAlreadyExists(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }
        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Remove now-empty shard directories from `start` up to, not
    /// including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err)
                    if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) =>
                {
                    break;
                }
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// Two-level shard directories from MD5(bucket/key), keeping the file
    /// count per directory small.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{key}`. Parent directories may not
    /// exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<Sqlite, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, filename, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Write the stream to a temp file next to its final location, then
    /// rename into place. Returns the payload size and hex MD5.
    async fn write_payload(
        &self,
        file_path: &Path,
        mut body: ByteStream<'_>,
    ) -> StorageResult<(i64, String)> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    /// Upsert the object row and replace its metadata in one transaction.
    async fn record_object(
        &self,
        bucket: &Bucket,
        key: &str,
        options: PutOptions,
        size_bytes: i64,
        etag: String,
    ) -> StorageResult<Object> {
        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let mut tx = self.db.begin().await?;

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, filename, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket_id, key, filename, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket.id)
        .bind(key)
        .bind(&filename)
        .bind(options.content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;

        for (meta_key, value) in options.metadata {
            sqlx::query(
                "INSERT INTO object_metadata (id, object_id, key, value) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(object.id)
            .bind(meta_key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(object)
    }

    async fn check_sqlite(&self) -> ReadinessCheck {
        let error = match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await
        {
            Ok(1) => None,
            Ok(v) => Some(format!("unexpected result: {}", v)),
            Err(e) => Some(format!("error: {}", e)),
        };
        ReadinessCheck {
            name: "sqlite",
            ok: error.is_none(),
            error,
        }
    }

    /// Best-effort write/read/delete of a temp file under `base_path`.
    async fn check_disk(&self) -> ReadinessCheck {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        let (ok, error) = match fs::write(&tmp_path, b"readyz").await {
            Ok(_) => match fs::read(&tmp_path).await {
                Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                    Ok(_) => (true, None),
                    Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
                },
                Ok(_) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some("file content mismatch".to_string()))
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some(format!("could not read tmp file: {}", e)))
                }
            },
            Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
        };
        ReadinessCheck {
            name: "disk",
            ok,
            error,
        }
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn list_page(&self, bucket: &str, request: ListRequest) -> StorageResult<ListPage> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let max_keys = request.max_keys.clamp(1, MAX_KEYS_PER_PAGE);

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT key FROM objects WHERE bucket_id = ");
        builder.push_bind(bucket_rec.id);

        // Literal prefix match; LIKE would treat `%` and `_` as wildcards.
        if let Some(prefix) = request.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(cursor) = request.cursor.as_deref() {
            builder.push(" AND key > ");
            builder.push_bind(decode_cursor(cursor));
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind((max_keys + 1) as i64);

        let mut keys: Vec<String> = builder
            .build_query_scalar()
            .fetch_all(&*self.db)
            .await?;

        let next_cursor = if keys.len() > max_keys {
            keys.truncate(max_keys);
            keys.last().map(|last| encode_cursor(last))
        } else {
            None
        };

        Ok(ListPage { keys, next_cursor })
    }

    async fn head_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<HashMap<String, String>> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let rows = sqlx::query_as::<_, ObjectMetadata>(
            "SELECT id, object_id, key, value FROM object_metadata WHERE object_id = ?",
        )
        .bind(object.id)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    async fn put_object<'a>(
        &self,
        bucket: &str,
        key: &str,
        options: PutOptions,
        body: ByteStream<'a>,
    ) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let (size_bytes, etag) = self.write_payload(&file_path, body).await?;

        match self
            .record_object(&bucket_rec, key, options, size_bytes, etag)
            .await
        {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(err)
            }
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root(&bucket_rec.name))
                .await;
        }
        Ok(())
    }

    async fn create_bucket(&self, name: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            region: DEFAULT_REGION.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(&bucket.region)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    async fn readiness(&self) -> Vec<ReadinessCheck> {
        vec![self.check_sqlite().await, self.check_disk().await]
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn encode_cursor(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

/// Undecodable cursors are used verbatim as the start-after key.
fn decode_cursor(cursor: &str) -> String {
    general_purpose::STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| cursor.to_string())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> (SqliteBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteBlobStore::new(Arc::new(pool), dir.path());
        store.migrate().await.unwrap();
        store.create_bucket("gallery-bucket").await.unwrap();
        (store, dir)
    }

    fn body(bytes: &'static [u8]) -> ByteStream<'static> {
        stream::iter(vec![Ok(Bytes::from_static(bytes))]).boxed()
    }

    async fn put(store: &SqliteBlobStore, key: &str, meta: &[(&str, &str)]) -> Object {
        let options = PutOptions {
            content_type: Some("image/jpeg".into()),
            metadata: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        store
            .put_object("gallery-bucket", key, options, body(b"jpeg-bytes"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_writes_payload_and_metadata() {
        let (store, _dir) = store().await;
        let object = put(&store, "assets/gallery/originals/a.jpg", &[("width", "4")]).await;

        assert_eq!(object.filename, "a.jpg");
        assert_eq!(object.size_bytes, 10);
        assert_eq!(
            object.etag.as_deref(),
            Some(format!("{:x}", md5::compute(b"jpeg-bytes")).as_str())
        );
        assert_eq!(
            object.location("gallery-bucket"),
            "/gallery-bucket/assets/gallery/originals/a.jpg"
        );

        let on_disk = fs::read(store.object_path("gallery-bucket", &object.key))
            .await
            .unwrap();
        assert_eq!(on_disk, b"jpeg-bytes");

        let meta = store
            .head_metadata("gallery-bucket", "assets/gallery/originals/a.jpg")
            .await
            .unwrap();
        assert_eq!(meta.get("width").map(String::as_str), Some("4"));
    }

    #[tokio::test]
    async fn delete_removes_row_metadata_and_payload() {
        let (store, dir) = store().await;
        let object = put(&store, "uploads/a.jpg", &[("width", "4")]).await;
        let path = store.object_path("gallery-bucket", &object.key);

        store.delete_object("gallery-bucket", "uploads/a.jpg").await.unwrap();

        assert!(!path.exists());
        assert!(dir.path().join("gallery-bucket").exists());
        let missing = store.head_metadata("gallery-bucket", "uploads/a.jpg").await;
        assert!(matches!(missing, Err(StorageError::ObjectNotFound { .. })));
        let page = store
            .list_page("gallery-bucket", ListRequest::default())
            .await
            .unwrap();
        assert!(page.keys.is_empty());

        let again = store.delete_object("gallery-bucket", "uploads/a.jpg").await;
        assert!(matches!(again, Err(StorageError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn overwrite_replaces_metadata() {
        let (store, _dir) = store().await;
        put(&store, "k.jpg", &[("width", "1"), ("height", "1")]).await;
        put(&store, "k.jpg", &[("width", "2")]).await;

        let meta = store.head_metadata("gallery-bucket", "k.jpg").await.unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get("width").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_object() {
        let (store, _dir) = store().await;
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(io::Error::other("client went away")),
        ])
        .boxed();
        let err = store
            .put_object("gallery-bucket", "broken.jpg", PutOptions::default(), failing)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        let missing = store.head_metadata("gallery-bucket", "broken.jpg").await;
        assert!(matches!(missing, Err(StorageError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn list_pages_follow_the_cursor_in_key_order() {
        let (store, _dir) = store().await;
        for key in ["p/c.jpg", "p/a.jpg", "other/z.jpg", "p/b.jpg", "p_x/d.jpg"] {
            put(&store, key, &[]).await;
        }

        let first = store
            .list_page(
                "gallery-bucket",
                ListRequest {
                    prefix: Some("p/".into()),
                    cursor: None,
                    max_keys: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.keys, vec!["p/a.jpg", "p/b.jpg"]);
        assert!(first.next_cursor.is_some());

        let second = store
            .list_page(
                "gallery-bucket",
                ListRequest {
                    prefix: Some("p/".into()),
                    cursor: first.next_cursor,
                    max_keys: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["p/c.jpg"]);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn missing_bucket_is_reported() {
        let (store, _dir) = store().await;
        let err = store
            .list_page("no-such-bucket", ListRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(name) if name == "no-such-bucket"));
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_duplicate_buckets() {
        let (store, _dir) = store().await;
        for key in ["", "/abs.jpg", "../escape.jpg", "a\\b.jpg"] {
            let err = store
                .put_object("gallery-bucket", key, PutOptions::default(), body(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectKey), "{key:?}");
        }

        assert!(matches!(
            store.create_bucket("gallery-bucket").await,
            Err(StorageError::BucketAlreadyExists(_))
        ));
        store.ensure_bucket("gallery-bucket").await.unwrap();
        assert!(matches!(
            store.create_bucket("192.168.1.1").await,
            Err(StorageError::InvalidBucketName { .. })
        ));
    }

    #[tokio::test]
    async fn readiness_reports_both_checks() {
        let (store, _dir) = store().await;
        let checks = store.readiness().await;
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.ok), "{checks:?}");
    }
}
