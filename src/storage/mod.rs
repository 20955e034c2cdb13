//! Object-store capability used by the rest of the service.
//!
//! `ObjectStore` is the only seam to the backend: `s3::S3Store` talks to an
//! S3-compatible endpoint through `aws-sdk-s3`, and the test-only
//! `memory::MemoryStore` keeps objects in a map and can inject failures.

#[cfg(test)]
pub mod memory;
pub mod s3;

use crate::models::object::{PresignedUpload, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// Coarse classification of a storage failure.
///
/// The retry policy decides per kind whether another attempt is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    InvalidRequest,
    Timeout,
    Throttled,
    Connection,
    Unavailable,
    Other,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::NotFound,
        ErrorKind::AccessDenied,
        ErrorKind::InvalidRequest,
        ErrorKind::Timeout,
        ErrorKind::Throttled,
        ErrorKind::Connection,
        ErrorKind::Unavailable,
        ErrorKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::AccessDenied => "access-denied",
            ErrorKind::InvalidRequest => "invalid-request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Connection => "connection",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown storage error kind `{0}`")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownErrorKind(wanted.to_string()))
    }
}

#[derive(Clone, Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::ObjectNotFound { .. } => ErrorKind::NotFound,
            StorageError::AccessDenied(_) => ErrorKind::AccessDenied,
            StorageError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            StorageError::Timeout(_) => ErrorKind::Timeout,
            StorageError::Throttled(_) => ErrorKind::Throttled,
            StorageError::Connection(_) => ErrorKind::Connection,
            StorageError::Unavailable(_) => ErrorKind::Unavailable,
            StorageError::Backend(_) => ErrorKind::Other,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Operations the service needs from an S3-compatible backend.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full payload of `key`.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Write `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StorageResult<()>;

    /// Remove `key`. Absent keys follow the backend's conventions.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Overwrite the ACL of `key`.
    async fn set_visibility(
        &self,
        bucket: &str,
        key: &str,
        visibility: Visibility,
    ) -> StorageResult<()>;

    /// Sign a `PUT` for `key` bound to `content_type`, valid for `expires_in`.
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedUpload>;

    /// Confirm that `bucket` is reachable with the configured credentials.
    async fn check_bucket(&self, bucket: &str) -> StorageResult<()>;
}
