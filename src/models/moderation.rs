//! Moderation vocabulary shared by the decision mapper and the status cache.
//!
//! Both enums round-trip through their upper-case tag values
//! (`"APPROVED"`, `"HUMAN_DETECTED"`, ...) in JSON and in object tags.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Moderation status stored in an object's `status` tag.
///
/// An object with no status tag is *unset*, modelled as `Option<Status>::None`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Approved,
    Blurred,
    Blocked,
    Processing,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Approved => "APPROVED",
            Status::Blurred => "BLURRED",
            Status::Blocked => "BLOCKED",
            Status::Processing => "PROCESSING",
        }
    }

    /// Terminal statuses never change once the classifier has written them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Approved | Status::Blurred | Status::Blocked)
    }

    /// Whether an image with this status is shown in the public feed.
    pub fn is_visible(self) -> bool {
        matches!(self, Status::Approved | Status::Blurred)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(Status::Approved),
            "BLURRED" => Ok(Status::Blurred),
            "BLOCKED" => Ok(Status::Blocked),
            "PROCESSING" => Ok(Status::Processing),
            other => Err(UnknownCode(other.to_string())),
        }
    }
}

/// Reason code stored in an object's `reason` tag.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Momo,
    OtherFood,
    NotFood,
    HumanDetected,
    UnsafeContent,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Momo => "MOMO",
            Reason::OtherFood => "OTHER_FOOD",
            Reason::NotFood => "NOT_FOOD",
            Reason::HumanDetected => "HUMAN_DETECTED",
            Reason::UnsafeContent => "UNSAFE_CONTENT",
        }
    }

    /// Message shown to the uploader.
    pub fn message(self) -> &'static str {
        match self {
            Reason::Momo => "Delicious momo detected!",
            Reason::OtherFood => "This appears to be food, but not momo",
            Reason::NotFood => "This doesn't appear to be food",
            Reason::HumanDetected => "Human face detected in image",
            Reason::UnsafeContent => "Inappropriate or unsafe content detected",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOMO" => Ok(Reason::Momo),
            "OTHER_FOOD" => Ok(Reason::OtherFood),
            "NOT_FOOD" => Ok(Reason::NotFood),
            "HUMAN_DETECTED" => Ok(Reason::HumanDetected),
            "UNSAFE_CONTENT" => Ok(Reason::UnsafeContent),
            other => Err(UnknownCode(other.to_string())),
        }
    }
}

/// A tag value that is not part of the moderation vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown moderation code `{0}`")]
pub struct UnknownCode(pub String);

/// Outcome of classifying one image.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub status: Status,
    pub reason: Reason,
}

impl Decision {
    pub const fn new(status: Status, reason: Reason) -> Self {
        Self { status, reason }
    }
}
