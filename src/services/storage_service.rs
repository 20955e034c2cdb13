//! src/services/storage_service.rs
//!
//! StorageService is the facade the HTTP handlers talk to. It validates keys,
//! applies the retry policy to backend-mutating calls (rename and visibility
//! changes), and runs saves either inline or as a spawned task whose failures
//! always reach the event reporter.

use super::{
    rename::{RenameError, rename_object},
    reporter::{Event, EventReporter, LogReporter},
    retry::RetryPolicy,
};
use crate::{
    config::SaveMode,
    models::object::{PresignedUpload, Visibility},
    storage::{ObjectStore, StorageError, StorageResult},
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Lifetime of presigned upload URLs.
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(15 * 60);

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("The provided file is empty or null.")]
    EmptyPayload,
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("cannot rename `{0}` onto itself")]
    SameKey(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Rename(#[from] RenameError),
    #[error("save task {id} did not complete: {reason}")]
    TaskFailed { id: Uuid, reason: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Handle to a save running on the runtime's worker pool.
///
/// Await it with [`SaveTask::wait`] or let it run with [`SaveTask::detach`];
/// either way a failure is reported to the service's [`EventReporter`].
pub struct SaveTask {
    id: Uuid,
    url: String,
    handle: JoinHandle<ServiceResult<String>>,
}

impl SaveTask {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Public URL the object will have once the save lands.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn wait(self) -> ServiceResult<String> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(ServiceError::TaskFailed {
                id: self.id,
                reason: err.to_string(),
            }),
        }
    }

    pub fn detach(self) {
        debug!(task = %self.id, url = %self.url, "save task detached");
    }
}

#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    cdn_endpoint: String,
    retry: RetryPolicy,
    reporter: Arc<dyn EventReporter>,
    save_mode: SaveMode,
}

impl StorageService {
    /// Create a service over `store` for a single `bucket`, with the default
    /// retry policy, log-only reporting and inline saves.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        cdn_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            cdn_endpoint: cdn_endpoint.into(),
            retry: RetryPolicy::default(),
            reporter: Arc::new(LogReporter),
            save_mode: SaveMode::Wait,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn EventReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_save_mode(mut self, save_mode: SaveMode) -> Self {
        self.save_mode = save_mode;
        self
    }

    pub fn save_mode(&self) -> SaveMode {
        self.save_mode
    }

    /// Basic key validation before anything reaches the backend.
    ///
    /// Rejects empty keys, keys longer than S3's 1024-byte limit, and keys
    /// with control characters.
    fn ensure_key_safe(key: &str) -> ServiceResult<()> {
        if key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.chars().any(|c| c.is_control())
        {
            return Err(ServiceError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Public URL of `key` behind the CDN endpoint. No backend call.
    ///
    /// Each path segment is percent-encoded; `/` separators are kept.
    pub fn file_url(&self, key: &str) -> String {
        let path = key
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}",
            self.cdn_endpoint.trim_end_matches('/'),
            self.bucket,
            path
        )
    }

    fn ensure_saveable(key: &str, body: &Bytes) -> ServiceResult<()> {
        if body.is_empty() {
            return Err(ServiceError::EmptyPayload);
        }
        Self::ensure_key_safe(key)
    }

    async fn put_public(&self, key: &str, content_type: &str, body: Bytes) -> ServiceResult<String> {
        self.reporter.report(
            Event::info("New save file request")
                .details(format!("{} {} {}", self.bucket, key, content_type))
                .tag("bucket", self.bucket.clone())
                .tag("filename", key),
        );

        self.store
            .put_object(&self.bucket, key, body, content_type, Visibility::PublicRead)
            .await?;

        Ok(self.file_url(key))
    }

    /// Write `body` under `key` as a public object and return its URL.
    pub async fn save_file(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> ServiceResult<String> {
        Self::ensure_saveable(key, &body)?;
        debug!(bucket = %self.bucket, key, content_type, size = body.len(), "save_file");
        self.put_public(key, content_type, body).await.map_err(|err| {
            error!(bucket = %self.bucket, key, error = %err, "save_file failed");
            err
        })
    }

    /// Start a save on the worker pool. Input is validated before spawning,
    /// so empty payloads and bad keys still fail synchronously.
    pub fn spawn_save(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> ServiceResult<SaveTask> {
        Self::ensure_saveable(key, &body)?;

        let id = Uuid::new_v4();
        let url = self.file_url(key);
        let service = self.clone();
        let key = key.to_string();
        let content_type = content_type.to_string();
        debug!(task = %id, bucket = %self.bucket, key = %key, "spawning save task");

        let handle = tokio::spawn(async move {
            let result = service.put_public(&key, &content_type, body).await;
            if let Err(err) = &result {
                service.reporter.report(
                    Event::error("Save file failed")
                        .details(err.to_string())
                        .tag("bucket", service.bucket.clone())
                        .tag("filename", key.clone())
                        .tag("task", id.to_string()),
                );
            }
            result
        });

        Ok(SaveTask {
            id,
            url,
            handle,
        })
    }

    pub async fn get_file(&self, key: &str) -> ServiceResult<Bytes> {
        Self::ensure_key_safe(key)?;
        debug!(bucket = %self.bucket, key, "get_file");
        self.store
            .get_object(&self.bucket, key)
            .await
            .map_err(|err| {
                error!(bucket = %self.bucket, key, error = %err, "get_file failed");
                err.into()
            })
    }

    /// Copy `old_key` to `new_key` then delete `old_key`, retrying the whole
    /// sequence on transient errors.
    pub async fn rename_file(
        &self,
        old_key: &str,
        new_key: &str,
        content_type: &str,
    ) -> ServiceResult<()> {
        Self::ensure_key_safe(old_key)?;
        Self::ensure_key_safe(new_key)?;
        if old_key == new_key {
            return Err(ServiceError::SameKey(old_key.to_string()));
        }
        debug!(bucket = %self.bucket, old_key, new_key, "rename_file");

        self.retry
            .run("rename_file", || {
                rename_object(
                    self.store.as_ref(),
                    &self.bucket,
                    old_key,
                    new_key,
                    content_type,
                )
            })
            .await
            .map_err(|err| {
                error!(
                    bucket = %self.bucket,
                    old_key,
                    new_key,
                    stage = ?err.stage(),
                    error = %err,
                    "rename_file failed"
                );
                err.into()
            })
    }

    pub async fn delete_file(&self, key: &str) -> ServiceResult<()> {
        Self::ensure_key_safe(key)?;
        debug!(bucket = %self.bucket, key, "delete_file");
        self.store
            .delete_object(&self.bucket, key)
            .await
            .map_err(|err| {
                error!(bucket = %self.bucket, key, error = %err, "delete_file failed");
                err.into()
            })
    }

    pub async fn make_public(&self, key: &str) -> ServiceResult<()> {
        self.set_visibility(key, Visibility::PublicRead).await
    }

    pub async fn make_private(&self, key: &str) -> ServiceResult<()> {
        self.set_visibility(key, Visibility::Private).await
    }

    async fn set_visibility(&self, key: &str, visibility: Visibility) -> ServiceResult<()> {
        Self::ensure_key_safe(key)?;
        debug!(bucket = %self.bucket, key, %visibility, "set_visibility");

        self.retry
            .run("set_visibility", || {
                self.store.set_visibility(&self.bucket, key, visibility)
            })
            .await
            .map_err(|err| {
                error!(bucket = %self.bucket, key, %visibility, error = %err, "set_visibility failed");
                err.into()
            })
    }

    /// Issue a presigned `PUT` for `key`, valid for [`PRESIGN_EXPIRY`].
    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> ServiceResult<PresignedUpload> {
        Self::ensure_key_safe(key)?;
        let grant = self
            .store
            .presign_put(&self.bucket, key, content_type, PRESIGN_EXPIRY)
            .await?;
        debug!(bucket = %self.bucket, key, expires_at = %grant.expires_at, "presigned upload issued");
        Ok(grant)
    }

    /// Readiness probe: the configured bucket answers a HEAD request.
    pub async fn check_ready(&self) -> StorageResult<()> {
        self.store.check_bucket(&self.bucket).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{rename::RenameStage, reporter::testing::RecordingReporter},
        storage::{
            ErrorKind,
            memory::{MemoryStore, Op},
        },
    };

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(10, Duration::from_millis(1), RetryPolicy::DEFAULT_RETRY_ON)
    }

    fn service(store: &Arc<MemoryStore>) -> StorageService {
        StorageService::new(store.clone(), "docs", "https://cdn.example.com/")
            .with_retry(fast_retry())
    }

    #[tokio::test]
    async fn saved_file_reads_back_identically() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);

        let url = svc
            .save_file("report.pdf", "application/pdf", Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/docs/report.pdf");
        assert_eq!(&svc.get_file("report.pdf").await.unwrap()[..], b"%PDF-1.7");
        let stored = store.object("docs", "report.pdf").unwrap();
        assert_eq!(stored.visibility, Visibility::PublicRead);
        assert_eq!(stored.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn empty_upload_never_reaches_backend() {
        let store = Arc::new(MemoryStore::new());
        let err = service(&store)
            .save_file("empty.txt", "text/plain", Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::EmptyPayload));
        assert_eq!(store.calls(Op::Put), 0);
    }

    #[tokio::test]
    async fn control_characters_in_keys_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = service(&store).get_file("bad\nkey").await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidKey(_)));
        assert_eq!(store.calls(Op::Get), 0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = service(&store).get_file("ghost.txt").await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Storage(StorageError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn file_url_encodes_each_segment() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);

        assert_eq!(
            svc.file_url("photos/2025/img.jpg"),
            "https://cdn.example.com/docs/photos/2025/img.jpg"
        );
        assert_eq!(
            svc.file_url("q&a/my file?v=1#top.txt"),
            "https://cdn.example.com/docs/q%26a/my%20file%3Fv%3D1%23top.txt"
        );
    }

    #[tokio::test]
    async fn rename_onto_same_key_is_rejected_before_backend() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"hello", "text/plain");
        let svc = service(&store);

        let err = svc
            .rename_file("a.txt", "a.txt", "text/plain")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::SameKey(_)));
        assert_eq!(store.calls(Op::Get), 0);
        assert_eq!(store.calls(Op::Put), 0);
        assert_eq!(store.calls(Op::Delete), 0);
        assert_eq!(&svc.get_file("a.txt").await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn save_then_rename_scenario() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);

        svc.save_file("report.pdf", "application/pdf", Bytes::from_static(b"v1"))
            .await
            .unwrap();
        svc.rename_file("report.pdf", "report-final.pdf", "application/pdf")
            .await
            .unwrap();

        assert_eq!(&svc.get_file("report-final.pdf").await.unwrap()[..], b"v1");
        let err = svc.get_file("report.pdf").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Storage(StorageError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn permanent_delete_failure_leaves_both_keys() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"payload", "text/plain");
        store.fail_always(Op::Delete, StorageError::AccessDenied("no delete".into()));

        let err = service(&store)
            .rename_file("a.txt", "b.txt", "text/plain")
            .await
            .unwrap_err();

        let ServiceError::Rename(rename) = err else {
            panic!("expected a rename error");
        };
        assert_eq!(rename.stage(), RenameStage::Delete);
        assert!(rename.cleanup_pending());
        assert_eq!(store.calls(Op::Delete), 1);
        assert_eq!(
            store.object("docs", "a.txt").unwrap().body,
            store.object("docs", "b.txt").unwrap().body
        );
    }

    #[tokio::test]
    async fn transient_delete_failure_reruns_whole_rename() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"payload", "text/plain");
        store.fail_next(Op::Delete, 2, StorageError::Timeout("delete".into()));

        service(&store)
            .rename_file("a.txt", "b.txt", "text/plain")
            .await
            .unwrap();

        assert_eq!(store.calls(Op::Get), 3);
        assert_eq!(store.calls(Op::Put), 3);
        assert_eq!(store.calls(Op::Delete), 3);
        assert!(store.object("docs", "a.txt").is_none());
        assert_eq!(&store.object("docs", "b.txt").unwrap().body[..], b"payload");
    }

    #[tokio::test]
    async fn rename_of_missing_key_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let err = service(&store)
            .rename_file("ghost.txt", "b.txt", "text/plain")
            .await
            .unwrap_err();

        let ServiceError::Rename(rename) = err else {
            panic!("expected a rename error");
        };
        assert_eq!(rename.stage(), RenameStage::Fetch);
        assert_eq!(store.calls(Op::Get), 1);
    }

    #[tokio::test]
    async fn make_public_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"payload", "text/plain");
        let svc = service(&store);

        svc.make_public("a.txt").await.unwrap();
        let once = store.object("docs", "a.txt").unwrap();
        svc.make_public("a.txt").await.unwrap();
        let twice = store.object("docs", "a.txt").unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.visibility, Visibility::PublicRead);
    }

    #[tokio::test]
    async fn visibility_change_retries_until_success() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"payload", "text/plain");
        store.fail_next(
            Op::SetVisibility,
            4,
            StorageError::Throttled("slow down".into()),
        );

        service(&store).make_private("a.txt").await.unwrap();

        assert_eq!(store.calls(Op::SetVisibility), 5);
        assert_eq!(
            store.object("docs", "a.txt").unwrap().visibility,
            Visibility::Private
        );
    }

    #[tokio::test]
    async fn visibility_change_gives_up_after_ten_attempts() {
        let store = Arc::new(MemoryStore::new());
        store.insert("docs", "a.txt", b"payload", "text/plain");
        store.fail_always(
            Op::SetVisibility,
            StorageError::Connection("reset by peer".into()),
        );

        let err = service(&store).make_public("a.txt").await.unwrap_err();

        assert_eq!(store.calls(Op::SetVisibility), 10);
        let ServiceError::Storage(storage) = err else {
            panic!("expected a storage error");
        };
        assert_eq!(storage.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn presigned_upload_lasts_fifteen_minutes() {
        let store = Arc::new(MemoryStore::new());
        let grant = service(&store)
            .presign_upload("upload.png", "image/png")
            .await
            .unwrap();

        assert!(grant.url.contains("/docs/upload.png"));
        assert_eq!(
            grant.expires_at - grant.issued_at,
            chrono::Duration::minutes(15)
        );
    }

    #[tokio::test]
    async fn awaited_save_task_returns_url() {
        let store = Arc::new(MemoryStore::new());
        let task = service(&store)
            .spawn_save("a.txt", "text/plain", Bytes::from_static(b"hi"))
            .unwrap();

        assert_eq!(task.url(), "https://cdn.example.com/docs/a.txt");
        assert_eq!(
            task.wait().await.unwrap(),
            "https://cdn.example.com/docs/a.txt"
        );
        assert!(store.object("docs", "a.txt").is_some());
    }

    #[tokio::test]
    async fn detached_save_failure_reaches_reporter() {
        let store = Arc::new(MemoryStore::new());
        store.fail_always(Op::Put, StorageError::Unavailable("down".into()));
        let reporter = Arc::new(RecordingReporter::default());
        let svc = service(&store).with_reporter(reporter.clone());

        svc.spawn_save("a.txt", "text/plain", Bytes::from_static(b"hi"))
            .unwrap()
            .detach();

        let mut failure = None;
        for _ in 0..100 {
            failure = reporter
                .events()
                .into_iter()
                .find(|event| event.title == "Save file failed");
            if failure.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let failure = failure.expect("failure was reported");
        assert_eq!(
            failure.tags.get("filename").map(String::as_str),
            Some("a.txt")
        );
        assert!(failure.details.contains("down"));
    }

    #[tokio::test]
    async fn spawn_save_rejects_empty_payload_synchronously() {
        let store = Arc::new(MemoryStore::new());
        let result = service(&store).spawn_save("a.txt", "text/plain", Bytes::new());

        assert!(matches!(result, Err(ServiceError::EmptyPayload)));
    }
}
