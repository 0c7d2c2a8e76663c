//! HTTP handlers for the image feed API under `/api`.

use crate::{
    errors::AppError,
    models::{
        feed::{FeedListing, ImageStatusView},
        moderation::{Reason, Status},
        tag::{REASON_TAG, STATUS_TAG},
    },
    services::decision_service,
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validity of upload URLs.
const UPLOAD_URL_VALIDITY: TimeDelta = TimeDelta::seconds(300);

#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageKeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlQuery {
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub file_id: String,
    pub bucket: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub id: String,
    pub status: Status,
    pub reason: Reason,
    pub message: &'static str,
}

/// `GET /api/list-images?after=<ts>`
pub async fn list_images(
    State(state): State<AppState>,
    Query(q): Query<ListImagesQuery>,
) -> Result<Json<FeedListing>, AppError> {
    let listing = state.feed.list_images(q.after.as_deref()).await?;
    Ok(Json(listing))
}

/// `GET /api/get-image-status?key=<key>`, always read fresh from the store.
pub async fn get_image_status(
    State(state): State<AppState>,
    Query(q): Query<ImageKeyQuery>,
) -> Result<Json<ImageStatusView>, AppError> {
    let key = q
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing key"))?;
    let view = state.feed.get_image_status(&key).await?;
    Ok(Json(view))
}

/// `GET /api/generate-presigned-url?contentType=<mime>`
///
/// Hands out a fresh object id and a short-lived URL to PUT the image to.
pub async fn generate_upload_url(
    State(state): State<AppState>,
    Query(q): Query<UploadUrlQuery>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let bucket = state.feed.bucket()?.to_string();
    let file_id = Uuid::new_v4().to_string();
    let upload_url = state
        .storage
        .sign_put_url(&bucket, &file_id, UPLOAD_URL_VALIDITY)?;

    tracing::debug!(
        "issued upload URL for {}/{} (content type {})",
        bucket,
        file_id,
        q.content_type.as_deref().unwrap_or("image/jpeg")
    );

    Ok(Json(UploadUrlResponse {
        upload_url,
        file_id,
        bucket,
    }))
}

/// `POST /api/classify?key=<key>` with `{"labels": [...]}`.
///
/// Callback for the classification pipeline: decides the outcome for the
/// labels and writes it to the object's tags.
pub async fn classify_image(
    State(state): State<AppState>,
    Query(q): Query<ImageKeyQuery>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, AppError> {
    let key = q
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing key"))?;
    let bucket = state.feed.bucket()?;

    let decision = decision_service::decide(&req.labels);
    state
        .storage
        .put_tags(
            bucket,
            &key,
            &[
                (STATUS_TAG, decision.status.as_str()),
                (REASON_TAG, decision.reason.as_str()),
            ],
        )
        .await?;
    tracing::info!(
        "classified {} as {} ({})",
        key,
        decision.status,
        decision.reason
    );

    Ok(Json(ClassifyResponse {
        id: key,
        status: decision.status,
        reason: decision.reason,
        message: decision.reason.message(),
    }))
}
