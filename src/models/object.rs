//! Represents the attributes of a stored object that this service manages.

use chrono::{DateTime, Utc};
use std::fmt;

/// Who may read an object, applied through the backend's canned ACLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Anyone may read the object (`public-read`).
    PublicRead,
    /// Only the bucket owner may read the object (`private`).
    Private,
}

impl Visibility {
    /// Canned ACL name as understood by S3-compatible backends.
    pub fn as_acl(&self) -> &'static str {
        match self {
            Visibility::PublicRead => "public-read",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_acl())
    }
}

/// A time-bounded URL that lets a client upload one object directly.
///
/// Grants are created on demand and never stored by this service.
#[derive(Clone, Debug)]
pub struct PresignedUpload {
    /// Fully signed `PUT` URL.
    pub url: String,

    /// Moment the signature was computed.
    pub issued_at: DateTime<Utc>,

    /// Moment after which the backend rejects the URL.
    pub expires_at: DateTime<Utc>,
}
