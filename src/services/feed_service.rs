//! Feed composition on top of the status cache.
//!
//! Listing walks every object newest-first, resolves it through the
//! [`StatusCache`], counts it in the stats and keeps only visible images.
//! The single-image status lookup always goes to the store.

use crate::{
    models::{
        feed::{FeedListing, FeedStats, ImageItem, ImageStatusView},
        tag::{REASON_TAG, STATUS_TAG},
    },
    services::{
        status_cache::{StatusCache, URL_VALIDITY},
        storage_service::{ObjectStore, StorageError},
    },
};
use chrono::DateTime;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Server configuration error: bucket not set")]
    MissingBucket,
    #[error("image `{0}` not found or not ready")]
    ImageNotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FeedResult<T> = Result<T, FeedError>;

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn ObjectStore>,
    cache: StatusCache,
    bucket: Option<String>,
}

impl FeedService {
    pub fn new(store: Arc<dyn ObjectStore>, cache: StatusCache, bucket: Option<String>) -> Self {
        Self {
            store,
            cache,
            bucket,
        }
    }

    /// The configured bucket, or a configuration error.
    pub fn bucket(&self) -> FeedResult<&str> {
        self.bucket.as_deref().ok_or(FeedError::MissingBucket)
    }

    /// List visible images newest-first with stats over all objects.
    ///
    /// `after` keeps only images modified strictly later than the given
    /// point in time. An unparseable value is ignored.
    pub async fn list_images(&self, after: Option<&str>) -> FeedResult<FeedListing> {
        let bucket = self.bucket()?;
        let after = after.and_then(|raw| {
            let parsed = parse_after(raw);
            if parsed.is_none() {
                warn!("ignoring malformed `after` value `{}`", raw);
            }
            parsed
        });

        let mut objects = self.store.list_objects(bucket).await?;
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

        let mut stats = FeedStats::default();
        let mut images = Vec::new();
        for object in objects {
            let resolution = self.cache.resolve(bucket, &object.etag, &object.key).await;
            stats.record(resolution.status());

            let Some(entry) = resolution.entry() else {
                continue;
            };
            let Some(status) = entry.status.filter(|s| s.is_visible()) else {
                continue;
            };

            let timestamp = object.timestamp();
            if after.is_some_and(|after| timestamp <= after) {
                continue;
            }

            images.push(ImageItem {
                id: object.key.clone(),
                url: entry.url.clone(),
                status,
                reason: entry.reason,
                uploaded_at: object.last_modified,
                timestamp,
            });
        }

        debug!(
            "listed {} visible of {} objects in {} ({} cached statuses)",
            images.len(),
            stats.total,
            bucket,
            self.cache.cached_entries()
        );
        Ok(FeedListing { images, stats })
    }

    /// Current status of one image, read from the store without the cache.
    ///
    /// Missing objects and objects without any tags are reported as
    /// [`FeedError::ImageNotFound`].
    pub async fn get_image_status(&self, key: &str) -> FeedResult<ImageStatusView> {
        let bucket = self.bucket()?;
        let not_found = |err: StorageError| match err {
            StorageError::ObjectNotFound { .. } | StorageError::InvalidObjectKey => {
                FeedError::ImageNotFound(key.to_string())
            }
            other => FeedError::Storage(other),
        };

        let tags = self.store.get_tags(bucket, key).await.map_err(not_found)?;
        if tags.is_empty() {
            return Err(FeedError::ImageNotFound(key.to_string()));
        }
        let status = tags.get(STATUS_TAG).and_then(|s| s.parse().ok());
        let reason = tags.get(REASON_TAG).and_then(|r| r.parse().ok());

        let url = self.store.sign_get_url(bucket, key, URL_VALIDITY).await?;
        let object = self.store.head_object(bucket, key).await.map_err(not_found)?;

        Ok(ImageStatusView {
            id: object.key.clone(),
            status,
            reason,
            url,
            uploaded_at: object.last_modified,
            timestamp: object.timestamp(),
        })
    }
}

/// Parse an `after` threshold: fractional Unix seconds, or RFC 3339.
pub fn parse_after(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return secs.is_finite().then_some(secs);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_micros() as f64 / 1_000_000.0)
}
