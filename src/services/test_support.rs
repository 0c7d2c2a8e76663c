//! Test doubles for the object store and the clock.

use crate::{
    models::object::StoredObject,
    services::{
        status_cache::Clock,
        storage_service::{ObjectStore, StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use dashmap::{DashMap, DashSet};
use std::{
    collections::HashMap,
    io,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory object store that counts tag reads and URL signings.
pub struct MockStore {
    objects: DashMap<String, StoredObject>,
    tags: DashMap<String, HashMap<String, String>>,
    failing_tags: DashSet<String>,
    failing_signing: DashSet<String>,
    fail_listing: Mutex<bool>,
    tag_calls: AtomicUsize,
    sign_calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            tags: DashMap::new(),
            failing_tags: DashSet::new(),
            failing_signing: DashSet::new(),
            fail_listing: Mutex::new(false),
            tag_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
        }
    }

    /// Add an object last modified `modified_secs` after the Unix epoch.
    pub fn add_object(&self, key: &str, etag: &str, modified_secs: i64) -> StoredObject {
        let object = StoredObject {
            id: Uuid::new_v4(),
            bucket_id: Uuid::nil(),
            key: key.to_string(),
            content_type: Some("image/jpeg".into()),
            size_bytes: 1,
            etag: etag.to_string(),
            last_modified: Utc.timestamp_opt(modified_secs, 0).unwrap(),
        };
        self.objects.insert(key.to_string(), object.clone());
        object
    }

    pub fn set_tags(&self, key: &str, tags: &[(&str, &str)]) {
        let map = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.tags.insert(key.to_string(), map);
    }

    pub fn fail_tags(&self, key: &str) {
        self.failing_tags.insert(key.to_string());
    }

    pub fn fail_signing(&self, key: &str) {
        self.failing_signing.insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn tag_calls(&self) -> usize {
        self.tag_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    fn unreachable() -> StorageError {
        StorageError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "store unreachable"))
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn list_objects(&self, _bucket: &str) -> StorageResult<Vec<StoredObject>> {
        if *self.fail_listing.lock().unwrap() {
            return Err(Self::unreachable());
        }
        // Key order, so callers cannot rely on the store for recency order.
        let mut objects: Vec<_> = self.objects.iter().map(|o| o.value().clone()).collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> StorageResult<HashMap<String, String>> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_tags.contains(key) {
            return Err(Self::unreachable());
        }
        if !self.objects.contains_key(key) {
            return Err(Self::not_found(bucket, key));
        }
        Ok(self.tags.get(key).map(|t| t.clone()).unwrap_or_default())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        self.objects
            .get(key)
            .map(|o| o.clone())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn sign_get_url(&self, bucket: &str, key: &str, ttl: TimeDelta) -> StorageResult<String> {
        let n = self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_signing.contains(key) {
            return Err(Self::unreachable());
        }
        Ok(format!(
            "http://store.test/objects/{}/{}?ttl={}&n={}",
            bucket,
            key,
            ttl.num_seconds(),
            n
        ))
    }
}
