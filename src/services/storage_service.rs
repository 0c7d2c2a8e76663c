//! src/services/storage_service.rs
//!
//! Object store backing the image feed. Metadata and tags live in SQLite,
//! payloads on local disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.
//!
//! The feed and the status cache only see the [`ObjectStore`] capability
//! (list, read tags, head, sign a download URL). Upload and tag writes are
//! inherent methods used by the HTTP layer.

use crate::{
    models::{bucket::Bucket, object::StoredObject, tag::ObjectTag},
    services::url_signer::{SignedMethod, UrlSigner},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
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

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
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

/// Read-side capability of the object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All objects currently in `bucket`, in no guaranteed order.
    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>>;

    /// Tags of one object. An untagged object yields an empty map.
    async fn get_tags(&self, bucket: &str, key: &str) -> StorageResult<HashMap<String, String>>;

    /// Metadata of one object.
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject>;

    /// A download URL for the object, valid for `ttl`.
    async fn sign_get_url(&self, bucket: &str, key: &str, ttl: TimeDelta) -> StorageResult<String>;
}

/// SQLite + disk implementation of the object store.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Signs download and upload URLs handed to clients.
    pub signer: UrlSigner,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

impl StorageService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
        }
    }

    /// Key validation. Keys appear verbatim in signed URL paths, so only
    /// URL-safe characters are accepted, and `..` or a leading `/` are
    /// rejected to keep payloads under the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") || key.contains("//")
        {
            return Err(StorageError::InvalidObjectKey);
        }
        if !key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/'))
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// S3-like rules: 3–63 characters of lowercase letters, digits, dots and
    /// hyphens; must start and end with a letter or digit; no consecutive
    /// dots.
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
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), as lowercase hex
    /// bytes (00–ff). Keeps the file count per directory low.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

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
        sqlx::query_as::<_, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
                other => StorageError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ? AND bucket_id = ?",
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

    /// Return the bucket, creating its row and directory when missing.
    pub async fn ensure_bucket(&self, name: &str) -> StorageResult<Bucket> {
        match self.fetch_bucket(name).await {
            Ok(bucket) => return Ok(bucket),
            Err(StorageError::BucketNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        fs::create_dir_all(self.bucket_root(name)).await?;
        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        // A concurrent creator may have won; fall back to its row.
        let inserted = sqlx::query(
            "INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(bucket.created_at)
        .execute(&*self.db)
        .await?;

        if inserted.rows_affected() == 0 {
            return self.fetch_bucket(name).await;
        }
        tracing::info!("Created bucket {}", name);
        Ok(bucket)
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes the MD5 etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts the metadata row and clears tags from earlier content, so
    ///   the new payload goes back to an unclassified state.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
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
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let etag = format!("{:x}", digest.compute());
        let mut tx = self.db.begin().await?;
        let object = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket_id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM object_tags WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("stored {} ({} bytes, etag {})", key, size_bytes, etag);
        Ok(object)
    }

    /// Metadata plus an opened file handle ready for streaming out.
    ///
    /// Returns ObjectNotFound if metadata exists but the payload is missing.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Upsert tags on an existing object in one transaction.
    pub async fn put_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &[(&str, &str)],
    ) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let mut tx = self.db.begin().await?;
        for (tag_key, value) in tags {
            sqlx::query(
                "INSERT INTO object_tags (object_id, key, value) VALUES (?, ?, ?)
                 ON CONFLICT(object_id, key) DO UPDATE SET value = excluded.value",
            )
            .bind(object.id)
            .bind(*tag_key)
            .bind(*value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// A URL the client can PUT the payload to, valid for `ttl`.
    pub fn sign_put_url(&self, bucket: &str, key: &str, ttl: TimeDelta) -> StorageResult<String> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        Ok(self
            .signer
            .sign(SignedMethod::Put, bucket, key, Utc::now() + ttl))
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let rows = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE bucket_id = ? ORDER BY last_modified DESC",
        )
        .bind(bucket_rec.id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> StorageResult<HashMap<String, String>> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let tags = sqlx::query_as::<_, ObjectTag>(
            "SELECT object_id, key, value FROM object_tags WHERE object_id = ?",
        )
        .bind(object.id)
        .fetch_all(&*self.db)
        .await?;

        Ok(tags.into_iter().map(|tag| (tag.key, tag.value)).collect())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await
    }

    async fn sign_get_url(&self, bucket: &str, key: &str, ttl: TimeDelta) -> StorageResult<String> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;
        Ok(self
            .signer
            .sign(SignedMethod::Get, bucket, key, Utc::now() + ttl))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    pub(crate) async fn test_storage() -> (StorageService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let signer = UrlSigner::new("test-secret", "http://localhost:3000");
        let storage = StorageService::new(Arc::new(pool), dir.path(), signer);
        storage.ensure_bucket("feed").await.unwrap();
        (storage, dir)
    }

    pub(crate) async fn put_bytes(
        storage: &StorageService,
        key: &str,
        body: &'static [u8],
    ) -> StoredObject {
        let stream = futures::stream::iter(vec![Ok(Bytes::from_static(body))]);
        storage
            .upload_object_stream("feed", key, Some("image/jpeg".into()), stream)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_computes_md5_etag_and_round_trips_payload() {
        let (storage, _dir) = test_storage().await;
        let object = put_bytes(&storage, "img-1", b"hello").await;

        assert_eq!(object.etag, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(object.size_bytes, 5);

        let (meta, mut file) = storage.get_object_reader("feed", "img-1").await.unwrap();
        let mut body = Vec::new();
        file.read_to_end(&mut body).await.unwrap();
        assert_eq!(meta, object);
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn tags_are_upserted_and_cleared_on_reupload() {
        let (storage, _dir) = test_storage().await;
        put_bytes(&storage, "img-1", b"first").await;
        assert!(storage.get_tags("feed", "img-1").await.unwrap().is_empty());

        storage
            .put_tags("feed", "img-1", &[("status", "PROCESSING")])
            .await
            .unwrap();
        storage
            .put_tags("feed", "img-1", &[("status", "APPROVED"), ("reason", "MOMO")])
            .await
            .unwrap();
        let tags = storage.get_tags("feed", "img-1").await.unwrap();
        assert_eq!(tags.get("status").map(String::as_str), Some("APPROVED"));
        assert_eq!(tags.get("reason").map(String::as_str), Some("MOMO"));

        let replaced = put_bytes(&storage, "img-1", b"second").await;
        assert!(storage.get_tags("feed", "img-1").await.unwrap().is_empty());
        assert_eq!(storage.list_objects("feed").await.unwrap(), vec![replaced]);
    }

    #[tokio::test]
    async fn identical_reupload_keeps_etag_but_clears_tags() {
        let (storage, _dir) = test_storage().await;
        let first = put_bytes(&storage, "img-1", b"same").await;
        storage
            .put_tags("feed", "img-1", &[("status", "APPROVED")])
            .await
            .unwrap();

        let second = put_bytes(&storage, "img-1", b"same").await;
        assert_eq!(second.etag, first.etag);
        assert!(storage.get_tags("feed", "img-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_objects_and_buckets_are_reported() {
        let (storage, _dir) = test_storage().await;
        assert!(matches!(
            storage.head_object("feed", "nope").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            storage.get_tags("feed", "nope").await,
            Err(StorageError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            storage.list_objects("other").await,
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unsafe_keys_and_bucket_names_are_rejected() {
        let (storage, _dir) = test_storage().await;
        for key in ["", "/abs", "a/../b", "a b", "q?x", "trailing/"] {
            assert!(
                matches!(
                    storage.sign_get_url("feed", key, TimeDelta::hours(1)).await,
                    Err(StorageError::InvalidObjectKey)
                ),
                "key {key:?}"
            );
        }
        assert!(matches!(
            storage.ensure_bucket("Bad_Bucket").await,
            Err(StorageError::InvalidBucketName { .. })
        ));
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let (storage, _dir) = test_storage().await;
        let a = storage.ensure_bucket("feed").await.unwrap();
        let b = storage.ensure_bucket("feed").await.unwrap();
        assert_eq!(a.id, b.id);
    }
}
