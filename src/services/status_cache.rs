//! Fingerprint-keyed cache of moderation status and signed download URLs.
//!
//! Listing the feed needs, per object, its `status`/`reason` tags and a
//! signed URL. Both are cached under the object's ETag so repeated listings
//! skip the store. Terminal statuses are cached for an hour; anything else
//! for a few seconds because classification is likely to land soon.
//!
//! Entries are overwritten, never removed, and live as long as the process.
//! Concurrent refreshes of the same fingerprint may both hit the store; the
//! last write wins and both writes carry equivalent data.

use crate::{
    models::{
        moderation::{Reason, Status},
        tag::{REASON_TAG, STATUS_TAG},
    },
    services::storage_service::{ObjectStore, StorageError, StorageResult},
};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// An entry is reused only while it has more than this left to live.
pub const SAFETY_BUFFER: TimeDelta = TimeDelta::seconds(60);
/// TTL for terminal statuses.
pub const TERMINAL_TTL: TimeDelta = TimeDelta::seconds(3600);
/// TTL for unset or `PROCESSING` statuses.
pub const TRANSIENT_TTL: TimeDelta = TimeDelta::seconds(5);
/// Validity of the download URLs handed out with the feed.
pub const URL_VALIDITY: TimeDelta = TimeDelta::seconds(3600);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Last-known moderation state of one fingerprint.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedStatus {
    pub status: Option<Status>,
    pub reason: Option<Reason>,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedStatus {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + SAFETY_BUFFER
    }
}

/// TTL for an entry holding `status`.
pub fn ttl_for(status: Option<Status>) -> TimeDelta {
    match status {
        Some(s) if s.is_terminal() => TERMINAL_TTL,
        _ => TRANSIENT_TTL,
    }
}

/// Storage for cache entries, keyed by fingerprint.
pub trait StatusCacheStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<CachedStatus>;
    fn put(&self, fingerprint: &str, entry: CachedStatus);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime cache entries held in a concurrent map.
#[derive(Default)]
pub struct InMemoryStatusCache {
    entries: DashMap<String, CachedStatus>,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusCacheStore for InMemoryStatusCache {
    fn get(&self, fingerprint: &str) -> Option<CachedStatus> {
        self.entries.get(fingerprint).map(|entry| entry.clone())
    }

    fn put(&self, fingerprint: &str, entry: CachedStatus) {
        self.entries.insert(fingerprint.to_string(), entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// What reading an object's tags produced.
///
/// All three variants fold to an unset status when no usable `status` tag
/// is present; they are kept apart for logging.
#[derive(Debug)]
pub enum TagFetch {
    Tagged(HashMap<String, String>),
    Untagged,
    Failed(StorageError),
}

impl TagFetch {
    pub fn from_result(result: StorageResult<HashMap<String, String>>) -> Self {
        match result {
            Ok(tags) if tags.is_empty() => TagFetch::Untagged,
            Ok(tags) => TagFetch::Tagged(tags),
            Err(err) => TagFetch::Failed(err),
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.parse(STATUS_TAG)
    }

    pub fn reason(&self) -> Option<Reason> {
        self.parse(REASON_TAG)
    }

    fn parse<T: std::str::FromStr>(&self, tag: &str) -> Option<T> {
        let TagFetch::Tagged(tags) = self else {
            return None;
        };
        let raw = tags.get(tag)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring unknown {} tag value `{}`", tag, raw);
                None
            }
        }
    }
}

/// Outcome of resolving one object.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Served from the cache without touching the store.
    Cached(CachedStatus),
    /// Fetched from the store and written back to the cache.
    Refreshed(CachedStatus),
    /// No download URL could be signed; nothing was cached.
    Unavailable,
}

impl Resolution {
    pub fn entry(&self) -> Option<&CachedStatus> {
        match self {
            Resolution::Cached(entry) | Resolution::Refreshed(entry) => Some(entry),
            Resolution::Unavailable => None,
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.entry().and_then(|entry| entry.status)
    }
}

/// Resolves objects to their moderation state, going to the store only on
/// a miss or when the cached entry is about to expire.
#[derive(Clone)]
pub struct StatusCache {
    store: Arc<dyn ObjectStore>,
    entries: Arc<dyn StatusCacheStore>,
    clock: Arc<dyn Clock>,
}

impl StatusCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        entries: Arc<dyn StatusCacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            entries,
            clock,
        }
    }

    /// Number of fingerprints currently cached, fresh or not.
    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    /// Resolve `bucket/key`, whose content fingerprint is `fingerprint`.
    ///
    /// Never fails: tag read errors resolve as an unset status and URL
    /// signing errors as [`Resolution::Unavailable`].
    pub async fn resolve(&self, bucket: &str, fingerprint: &str, key: &str) -> Resolution {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(fingerprint) {
            if entry.is_fresh(now) {
                debug!("status cache hit for {} ({})", key, fingerprint);
                return Resolution::Cached(entry);
            }
        }
        debug!("status cache miss for {} ({})", key, fingerprint);

        let tags = TagFetch::from_result(self.store.get_tags(bucket, key).await);
        match &tags {
            TagFetch::Failed(err) => warn!("tag fetch for {} failed: {}", key, err),
            TagFetch::Untagged => debug!("{} has no tags yet", key),
            TagFetch::Tagged(_) => {}
        }

        let url = match self.store.sign_get_url(bucket, key, URL_VALIDITY).await {
            Ok(url) => url,
            Err(err) => {
                warn!("signing download URL for {} failed: {}", key, err);
                return Resolution::Unavailable;
            }
        };

        let status = tags.status();
        let entry = CachedStatus {
            status,
            reason: tags.reason(),
            url,
            expires_at: now + ttl_for(status),
        };
        self.entries.put(fingerprint, entry.clone());
        Resolution::Refreshed(entry)
    }
}
