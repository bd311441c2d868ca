//! File drop storage for filedrop.
//!
//! This module provides the storage and retention core:
//! - Raw blob storage keyed by identifier
//! - JSON metadata bookkeeping with atomic replacement
//! - Short collision-checked identifiers
//! - Lazy expiry and orphan reconciliation on every access

mod id;
mod metadata;
mod retention;
mod service;
mod storage;

pub use id::IdAllocator;
pub use metadata::{format_timestamp, parse_timestamp, FileIndex, FileRecord, MetadataStore};
pub use retention::{CleanupReport, RetentionManager, RetentionPolicy};
pub use service::{build_share_link, DropService, ResolvedFile};
pub use storage::{BlobEntry, BlobStore};
