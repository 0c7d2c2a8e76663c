//! Read-only projections returned by the feed endpoints.

use super::moderation::{Reason, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One visible image in the feed.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub id: String,
    pub url: String,
    pub status: Status,
    pub reason: Option<Reason>,
    pub uploaded_at: DateTime<Utc>,
    /// `uploaded_at` as fractional Unix seconds, usable as the next `after`.
    pub timestamp: f64,
}

/// Aggregate counts over every object in the bucket, visible or not.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub total: u64,
    pub approved: u64,
    pub blurred: u64,
    pub blocked: u64,
    pub processing: u64,
}

impl FeedStats {
    /// Count one object. Unset statuses only contribute to `total`.
    pub fn record(&mut self, status: Option<Status>) {
        self.total += 1;
        match status {
            Some(Status::Approved) => self.approved += 1,
            Some(Status::Blurred) => self.blurred += 1,
            Some(Status::Blocked) => self.blocked += 1,
            Some(Status::Processing) => self.processing += 1,
            None => {}
        }
    }
}

/// Result of a listing request.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct FeedListing {
    pub images: Vec<ImageItem>,
    pub stats: FeedStats,
}

/// Fresh status of a single image.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatusView {
    pub id: String,
    pub status: Option<Status>,
    pub reason: Option<Reason>,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
    pub timestamp: f64,
}
