//! JSON bodies of the `/api/s3bucket` endpoints.

use serde::{Deserialize, Serialize};

/// Body of `PUT /api/s3bucket/rename-file`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(alias = "oldFileName")]
    pub old_name: String,
    #[serde(alias = "newFileName")]
    pub new_name: String,
    pub content_type: String,
}

/// Body of `POST /api/s3bucket/get-temp-s3-url`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub file_name: String,
    pub content_type: String,
}

/// `{ "url": ... }`
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

/// `{ "base64Data": ... }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDataResponse {
    pub base64_data: String,
}

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
