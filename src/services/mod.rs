//! Service layer: the storage façade used by handlers plus the rename,
//! retry and reporting pieces it is built from.

pub mod rename;
pub mod reporter;
pub mod retry;
pub mod storage_service;
