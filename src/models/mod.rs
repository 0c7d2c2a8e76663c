//! Core data models for the image feed.
//!
//! Storage entities (`bucket`, `object`, `tag`) map to SQLite rows via
//! `sqlx::FromRow`. The moderation vocabulary and the feed projections
//! serialize as JSON via `serde`.

pub mod bucket;
pub mod feed;
pub mod moderation;
pub mod object;
pub mod tag;
