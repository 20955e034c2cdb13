//! Defines routes for the file API and the probes.
//!
//! ## Structure
//! - **Probes** (mounted at root)
//!   - `GET    /healthz`
//!   - `GET    /readyz`
//!
//! - **File endpoints** under `/api/s3bucket`
//!   - `POST   /save-file`: multipart upload, field `file`
//!   - `GET    /get-file/{*name}`: payload as base64
//!   - `GET    /get-file-url/{*name}`: public URL
//!   - `PUT    /rename-file`: copy then delete
//!   - `DELETE /delete-file/{*name}`
//!   - `PATCH  /make-file-public/{*name}`
//!   - `PATCH  /make-file-private/{*name}`
//!   - `POST   /get-temp-s3-url`: presigned upload URL
//!
//! The wildcard `*name` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        file_handlers::{
            delete_file, get_file, get_file_url, get_temp_url, make_file_private,
            make_file_public, rename_file, save_file,
        },
        health_handlers::{healthz, readyz},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};

/// Build and return the router carrying `StorageService` as shared state.
///
/// `max_upload_bytes` bounds request bodies, uploads included.
pub fn routes(max_upload_bytes: usize) -> Router<StorageService> {
    let files = Router::new()
        .route("/save-file", post(save_file))
        .route("/get-file/{*name}", get(get_file))
        .route("/get-file-url/{*name}", get(get_file_url))
        .route("/rename-file", put(rename_file))
        .route("/delete-file/{*name}", delete(delete_file))
        .route("/make-file-public/{*name}", patch(make_file_public))
        .route("/make-file-private/{*name}", patch(make_file_private))
        .route("/get-temp-s3-url", post(get_temp_url));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/s3bucket", files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
