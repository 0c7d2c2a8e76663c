//! Represents an uploaded image stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single stored object. The payload bytes live on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key, also used as the public image id.
    pub key: String,

    /// Content type (MIME type) sent on upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload. Serves as the content fingerprint for the
    /// status cache.
    pub etag: String,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    /// Last-modified time as fractional Unix seconds.
    pub fn timestamp(&self) -> f64 {
        self.last_modified.timestamp_micros() as f64 / 1_000_000.0
    }
}
