//! In-memory `ObjectStore` with scriptable failures, used by the tests.

use super::{ObjectStore, StorageError, StorageResult};
use crate::models::object::{PresignedUpload, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Put,
    Delete,
    SetVisibility,
    Presign,
    CheckBucket,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub visibility: Visibility,
}

#[derive(Default)]
struct Faults {
    queued: VecDeque<StorageError>,
    always: Option<StorageError>,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    faults: Mutex<HashMap<Op, Faults>>,
    calls: Mutex<HashMap<Op, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `op` with `err`, then behave normally.
    pub fn fail_next(&self, op: Op, times: usize, err: StorageError) {
        let mut faults = self.faults.lock().unwrap();
        let entry = faults.entry(op).or_default();
        entry.queued.extend(std::iter::repeat_n(err, times));
    }

    /// Fail every call of `op` with `err`.
    pub fn fail_always(&self, op: Op, err: StorageError) {
        self.faults.lock().unwrap().entry(op).or_default().always = Some(err);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &'static [u8], content_type: &str) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: Bytes::from_static(body),
                content_type: content_type.to_string(),
                visibility: Visibility::Private,
            },
        );
    }

    fn enter(&self, op: Op) -> StorageResult<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let mut faults = self.faults.lock().unwrap();
        let Some(entry) = faults.get_mut(&op) else {
            return Ok(());
        };
        if let Some(err) = entry.queued.pop_front() {
            return Err(err);
        }
        match &entry.always {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.enter(Op::Get)?;
        self.object(bucket, key)
            .map(|obj| obj.body)
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StorageResult<()> {
        self.enter(Op::Put)?;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                visibility,
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.enter(Op::Delete)?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn set_visibility(
        &self,
        bucket: &str,
        key: &str,
        visibility: Visibility,
    ) -> StorageResult<()> {
        self.enter(Op::SetVisibility)?;
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| Self::not_found(bucket, key))?;
        obj.visibility = visibility;
        Ok(())
    }

    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedUpload> {
        self.enter(Op::Presign)?;
        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|err| StorageError::InvalidRequest(err.to_string()))?;
        Ok(PresignedUpload {
            url: format!(
                "http://memory.local/{bucket}/{key}?X-Amz-Expires={}&content-type={content_type}",
                expires_in.as_secs()
            ),
            issued_at,
            expires_at: issued_at + ttl,
        })
    }

    async fn check_bucket(&self, _bucket: &str) -> StorageResult<()> {
        self.enter(Op::CheckBucket)
    }
}
