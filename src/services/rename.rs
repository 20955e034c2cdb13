//! Rename implemented as copy-then-delete.
//!
//! Object stores have no atomic rename. The payload is read, written under
//! the new key, and only then is the old key deleted, so the new key is
//! readable before the old one disappears. A failed delete leaves both keys
//! in place and is reported as [`RenameError::Delete`].

use super::retry::Retryable;
use crate::{
    models::object::Visibility,
    storage::{ErrorKind, ObjectStore, StorageError},
};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenameStage {
    Fetch,
    Write,
    Delete,
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("rename failed reading `{key}`: {source}")]
    Fetch { key: String, source: StorageError },
    #[error("rename failed writing `{key}`: {source}")]
    Write { key: String, source: StorageError },
    #[error("`{new_key}` was written but `{old_key}` could not be deleted: {source}")]
    Delete {
        old_key: String,
        new_key: String,
        source: StorageError,
    },
}

impl RenameError {
    pub fn stage(&self) -> RenameStage {
        match self {
            RenameError::Fetch { .. } => RenameStage::Fetch,
            RenameError::Write { .. } => RenameStage::Write,
            RenameError::Delete { .. } => RenameStage::Delete,
        }
    }

    /// The backend error that stopped the rename.
    pub fn storage_error(&self) -> &StorageError {
        match self {
            RenameError::Fetch { source, .. }
            | RenameError::Write { source, .. }
            | RenameError::Delete { source, .. } => source,
        }
    }

    /// True when the copy landed and only removal of the old key is left.
    pub fn cleanup_pending(&self) -> bool {
        self.stage() == RenameStage::Delete
    }
}

impl Retryable for RenameError {
    fn error_kind(&self) -> ErrorKind {
        self.storage_error().kind()
    }
}

/// Move `old_key` to `new_key` inside `bucket`, rewriting the copy with
/// `content_type` and public-read visibility.
pub async fn rename_object(
    store: &dyn ObjectStore,
    bucket: &str,
    old_key: &str,
    new_key: &str,
    content_type: &str,
) -> Result<(), RenameError> {
    // Copying onto itself and then deleting would drop the object.
    if old_key == new_key {
        debug!(bucket, old_key, "rename: source and target are the same key");
        return Ok(());
    }

    debug!(bucket, old_key, new_key, "rename: copying payload");

    let payload = store
        .get_object(bucket, old_key)
        .await
        .map_err(|source| RenameError::Fetch {
            key: old_key.to_string(),
            source,
        })?;

    store
        .put_object(bucket, new_key, payload, content_type, Visibility::PublicRead)
        .await
        .map_err(|source| RenameError::Write {
            key: new_key.to_string(),
            source,
        })?;

    debug!(bucket, new_key, "rename: copy written");

    if let Err(source) = store.delete_object(bucket, old_key).await {
        error!(bucket, old_key, new_key, error = %source, "rename: old key left behind");
        return Err(RenameError::Delete {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
            source,
        });
    }

    debug!(bucket, old_key, "rename: old key deleted");
    Ok(())
}
