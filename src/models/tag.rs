//! Key-value tags attached to objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tag key holding the moderation status.
pub const STATUS_TAG: &str = "status";

/// Tag key holding the moderation reason code.
pub const REASON_TAG: &str = "reason";

/// A single tag row. The classifier writes `status` and `reason`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectTag {
    /// Reference to the tagged object.
    pub object_id: Uuid,

    /// Tag key (e.g. "status").
    pub key: String,

    /// Tag value as plain text.
    pub value: String,
}
