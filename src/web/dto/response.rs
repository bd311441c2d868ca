//! Response DTOs for the HTTP transport.

use serde::Serialize;

use crate::file::{format_timestamp, FileRecord};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Metadata of a live file.
#[derive(Debug, Serialize)]
pub struct FileInfoResponse {
    /// File identifier.
    pub id: String,
    /// Original filename.
    pub original_name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Upload time (ISO-8601, UTC).
    pub uploaded_at: String,
    /// Time the file stops being downloadable.
    pub expires_at: Option<String>,
}

impl FileInfoResponse {
    /// Build from a record and the service retention window.
    pub fn from_record(record: FileRecord, retention: chrono::Duration) -> Self {
        let expires_at = record
            .expires_at(retention)
            .map(|at| format_timestamp(&at));
        Self {
            id: record.id,
            original_name: record.original_name,
            size_bytes: record.size_bytes,
            uploaded_at: record.uploaded_at,
            expires_at,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    /// Committed file metadata.
    #[serde(flatten)]
    pub file: FileInfoResponse,
    /// Shareable link (bare id when no base URL is configured).
    pub link: String,
}
