//! Data models shared by the storage layer and the HTTP handlers.
//!
//! `object` holds the backend-facing types (visibility, presigned grants);
//! `dto` holds the JSON request and response bodies of the public API.

pub mod dto;
pub mod object;
