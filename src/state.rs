//! Shared state handed to every handler.

use crate::services::{feed_service::FeedService, storage_service::StorageService};

#[derive(Clone)]
pub struct AppState {
    /// Concrete store, used for uploads, downloads and tag writes.
    pub storage: StorageService,

    /// Feed listing and status lookups, backed by the status cache.
    pub feed: FeedService,
}
