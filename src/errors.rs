use crate::services::{
    feed_service::FeedError, storage_service::StorageError, url_signer::SignatureError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Replaces the default `{error, status}` body when set.
    pub body: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            body: None,
        }
    }

    /// Same error, but answered with `body` instead of the default JSON.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.body.unwrap_or_else(|| {
            json!({
                "error": self.message,
                "status": self.status.as_u16()
            })
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::InvalidBucketName { .. } | StorageError::InvalidObjectKey => {
                AppError::bad_request(err.to_string())
            }
            StorageError::Sqlx(_) | StorageError::Io(_) => {
                tracing::error!("storage failure: {}", err);
                AppError::internal("Internal server error")
            }
        }
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::MissingBucket => AppError::internal(err.to_string()),
            // `status` in this body is the moderation status, which is unknown
            FeedError::ImageNotFound(_) => {
                let message = "Image not found or not ready";
                AppError::not_found(message).with_body(json!({
                    "status": null,
                    "error": message
                }))
            }
            FeedError::Storage(inner) => {
                tracing::error!("feed storage failure: {}", inner);
                AppError::internal("Object store request failed")
            }
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(err: SignatureError) -> Self {
        AppError::new(StatusCode::FORBIDDEN, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn default_body_carries_http_status() {
        let body = body_json(AppError::bad_request("Missing key")).await;
        assert_eq!(body, json!({"error": "Missing key", "status": 400}));
    }

    #[tokio::test]
    async fn missing_image_body_has_null_moderation_status() {
        let err = AppError::from(FeedError::ImageNotFound("ghost".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let body = body_json(err).await;
        assert!(body["status"].is_null());
        assert_eq!(body["error"], "Image not found or not ready");
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        assert_eq!(
            AppError::from(FeedError::MissingBucket).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(FeedError::ImageNotFound("k".into())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(StorageError::InvalidObjectKey).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SignatureError::Expired).status,
            StatusCode::FORBIDDEN
        );
    }
}
