//! Defines routes for the image feed.
//!
//! ## Structure
//! - **Feed API**
//!   - `GET  /api/list-images`: visible images plus stats (`?after=`)
//!   - `GET  /api/get-image-status`: fresh status of one image (`?key=`)
//!   - `GET  /api/generate-presigned-url`: new image id and upload URL
//!   - `POST /api/classify`: classifier callback writing moderation tags
//!
//! - **Signed object endpoints**
//!   - `PUT /objects/{bucket}/{*key}`: upload with a signed URL
//!   - `GET /objects/{bucket}/{*key}`: download with a signed URL

use crate::{
    handlers::{
        feed_handlers::{classify_image, generate_upload_url, get_image_status, list_images},
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/list-images", get(list_images))
        .route("/api/get-image-status", get(get_image_status))
        .route("/api/generate-presigned-url", get(generate_upload_url))
        .route("/api/classify", post(classify_image))
        .route("/objects/{bucket}/{*key}", put(upload_object).get(get_object))
}
