//! `ObjectStore` backed by an S3-compatible endpoint through `aws-sdk-s3`.

use super::{ObjectStore, StorageError, StorageResult};
use crate::{
    config::S3Settings,
    models::object::{PresignedUpload, Visibility},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{RequestChecksumCalculation, ResponseChecksumValidation},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// S3 client wrapper shared by every request.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Build a client from static credentials against `settings.endpoint`.
    pub async fn connect(settings: &S3Settings) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.expose().to_string(),
            None,
            None,
            "s3-gateway-static",
        );

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .load()
            .await;

        // Presigned PUTs and many S3-compatible backends break when the SDK
        // adds flexible checksums to every request.
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        Self::from_client(aws_sdk_s3::Client::from_conf(config))
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn canned_acl(visibility: Visibility) -> ObjectCannedAcl {
    match visibility {
        Visibility::PublicRead => ObjectCannedAcl::PublicRead,
        Visibility::Private => ObjectCannedAcl::Private,
    }
}

/// Map an SDK failure onto the service's error taxonomy.
fn classify<E>(err: SdkError<E>, bucket: &str, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => StorageError::Timeout(message),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            StorageError::Timeout(message)
        }
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Connection(message)
        }
        SdkError::ConstructionFailure(_) => StorageError::InvalidRequest(message),
        _ => {
            let status = err.raw_response().map(|raw| raw.status().as_u16());
            classify_service_error(err.code(), status, bucket, key, message)
        }
    }
}

/// Classify a response the backend did return, by error code first and
/// HTTP status second.
fn classify_service_error(
    code: Option<&str>,
    status: Option<u16>,
    bucket: &str,
    key: &str,
    message: String,
) -> StorageError {
    match (code, status) {
        (Some("NoSuchBucket"), _) => {
            StorageError::InvalidRequest(format!("bucket `{bucket}` does not exist"))
        }
        (Some("NoSuchKey" | "NotFound"), _) | (_, Some(404)) => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        (
            Some(
                "SlowDown"
                | "Throttling"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "TooManyRequests"
                | "TooManyRequestsException",
            ),
            _,
        )
        | (_, Some(429)) => StorageError::Throttled(message),
        (Some("RequestTimeout"), _) | (_, Some(408)) => StorageError::Timeout(message),
        (Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
        | (_, Some(401 | 403)) => StorageError::AccessDenied(message),
        (Some("InternalError" | "ServiceUnavailable"), _) | (_, Some(500 | 502 | 503 | 504)) => {
            StorageError::Unavailable(message)
        }
        (_, Some(400..=499)) => StorageError::InvalidRequest(message),
        _ => StorageError::Backend(message),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        debug!(bucket, key, "s3 get_object");
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StorageResult<()> {
        debug!(bucket, key, content_type, size = body.len(), %visibility, "s3 put_object");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .acl(canned_acl(visibility))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        debug!(bucket, key, "s3 delete_object");
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        Ok(())
    }

    async fn set_visibility(
        &self,
        bucket: &str,
        key: &str,
        visibility: Visibility,
    ) -> StorageResult<()> {
        debug!(bucket, key, %visibility, "s3 put_object_acl");
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(canned_acl(visibility))
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        Ok(())
    }

    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedUpload> {
        debug!(bucket, key, content_type, ?expires_in, "s3 presign put_object");
        let issued = SystemTime::now();
        let presigning = PresigningConfig::builder()
            .start_time(issued)
            .expires_in(expires_in)
            .build()
            .map_err(|err| StorageError::InvalidRequest(format!("presign config: {err}")))?;

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|err| classify(err, bucket, key))?;

        let issued_at = DateTime::<Utc>::from(issued);
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|err| StorageError::InvalidRequest(format!("presign expiry: {err}")))?;

        Ok(PresignedUpload {
            url: request.uri().to_string(),
            issued_at,
            expires_at: issued_at + ttl,
        })
    }

    async fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => match classify(err, bucket, "") {
                StorageError::ObjectNotFound { .. } => Err(StorageError::InvalidRequest(
                    format!("bucket `{bucket}` does not exist"),
                )),
                other => Err(other),
            },
        }
    }
}
