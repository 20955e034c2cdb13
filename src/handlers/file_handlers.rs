//! HTTP handlers for the `/api/s3bucket` file endpoints.
//! Payloads travel as multipart on the way in and base64 JSON on the way
//! out; storage concerns are delegated to `StorageService`.

use crate::{
    config::SaveMode,
    errors::AppError,
    models::dto::{
        FileDataResponse, MessageResponse, PresignRequest, RenameRequest, UrlResponse,
    },
    services::storage_service::StorageService,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use tracing::debug;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The `file` part of a multipart upload.
struct Upload {
    file_name: String,
    content_type: String,
    data: Bytes,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("multipart field `file` has no file name"))?;
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field.bytes().await?;

        return Ok(Upload {
            file_name,
            content_type,
            data,
        });
    }

    Err(AppError::bad_request("The provided file is empty or null."))
}

/// POST `/save-file`: store the uploaded file publicly, return its URL.
pub async fn save_file(
    State(service): State<StorageService>,
    mut multipart: Multipart,
) -> Result<Json<UrlResponse>, AppError> {
    let upload = read_upload(&mut multipart).await?;

    let url = match service.save_mode() {
        SaveMode::Wait => {
            service
                .save_file(&upload.file_name, &upload.content_type, upload.data)
                .await?
        }
        SaveMode::Detach => {
            let task =
                service.spawn_save(&upload.file_name, &upload.content_type, upload.data)?;
            let url = task.url().to_string();
            debug!(task = %task.id(), file_name = %upload.file_name, "upload handed to save task");
            task.detach();
            url
        }
    };

    Ok(Json(UrlResponse { url }))
}

/// GET `/get-file/{*name}`: file bytes as base64.
pub async fn get_file(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<FileDataResponse>, AppError> {
    let bytes = service.get_file(&name).await?;
    Ok(Json(FileDataResponse {
        base64_data: general_purpose::STANDARD.encode(&bytes),
    }))
}

/// GET `/get-file-url/{*name}`
pub async fn get_file_url(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Json<UrlResponse> {
    Json(UrlResponse {
        url: service.file_url(&name),
    })
}

/// PUT `/rename-file`
pub async fn rename_file(
    State(service): State<StorageService>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    service
        .rename_file(&req.old_name, &req.new_name, &req.content_type)
        .await?;
    Ok(Json(MessageResponse::new("File renamed successfully")))
}

/// DELETE `/delete-file/{*name}`
pub async fn delete_file(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete_file(&name).await?;
    Ok(Json(MessageResponse::new("File deleted")))
}

/// PATCH `/make-file-public/{*name}`
pub async fn make_file_public(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    service.make_public(&name).await?;
    Ok(Json(MessageResponse::new("File made public")))
}

/// PATCH `/make-file-private/{*name}`
pub async fn make_file_private(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    service.make_private(&name).await?;
    Ok(Json(MessageResponse::new("File made private")))
}

/// POST `/get-temp-s3-url`: presigned upload URL.
pub async fn get_temp_url(
    State(service): State<StorageService>,
    Json(req): Json<PresignRequest>,
) -> Result<Json<UrlResponse>, AppError> {
    let grant = service
        .presign_upload(&req.file_name, &req.content_type)
        .await?;
    debug!(
        file_name = %req.file_name,
        issued_at = %grant.issued_at,
        expires_at = %grant.expires_at,
        "temp url issued"
    );
    Ok(Json(UrlResponse { url: grant.url }))
}
