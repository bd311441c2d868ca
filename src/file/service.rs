//! Drop service for filedrop.
//!
//! The façade the transport layer talks to. Every entry point takes the
//! service lock and runs a retention pass first, so callers never see a
//! record that is past its window.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::{DropError, Result};

use super::id::IdAllocator;
use super::metadata::{FileIndex, FileRecord, MetadataStore};
use super::retention::{CleanupReport, RetentionManager, RetentionPolicy};
use super::storage::BlobStore;

/// A file returned by [`DropService::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Metadata of the file.
    pub record: FileRecord,
    /// File content.
    pub content: Vec<u8>,
}

/// Upload, resolve and expire dropped files.
pub struct DropService {
    blobs: BlobStore,
    metadata: MetadataStore,
    ids: IdAllocator,
    policy: RetentionPolicy,
    clock: Arc<dyn Clock>,
    max_file_size: u64,
    base_url: Option<String>,
    /// Guards every load-modify-save of the metadata file.
    lock: Mutex<()>,
}

impl DropService {
    /// Create a service over the configured upload directory using the wall clock.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a service with an explicit clock.
    pub fn with_clock(config: &StorageConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let blobs = BlobStore::new(&config.upload_directory)?;
        let metadata = MetadataStore::new(config.metadata_path())?;

        tracing::info!(
            directory = %blobs.base_path().display(),
            retention_hours = config.retention_hours,
            id_length = config.id_length,
            "File drop storage ready"
        );

        Ok(Self {
            blobs,
            metadata,
            ids: IdAllocator::new(config.id_length, config.max_id_attempts),
            policy: RetentionPolicy {
                retention: config.retention_window(),
                orphan_grace: config.orphan_grace(),
            },
            clock,
            max_file_size: config.max_upload_bytes(),
            base_url: None,
            lock: Mutex::new(()),
        })
    }

    /// Set the base URL used by [`share_link`](Self::share_link).
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Retention window applied to every record.
    pub fn retention(&self) -> chrono::Duration {
        self.policy.retention
    }

    /// Largest accepted upload in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Store a file and return its committed record.
    ///
    /// On success the record is durable and immediately resolvable. If the
    /// metadata commit fails the blob is deleted again; should that delete
    /// fail too, the orphan sweep removes it later.
    pub fn upload(&self, original_name: &str, content: &[u8]) -> Result<FileRecord> {
        let _guard = self.lock();
        let now = self.clock.now();
        let live = self.retention_manager().cleanup(now)?;

        if content.len() as u64 > self.max_file_size {
            let max_mb = self.max_file_size / 1024 / 1024;
            return Err(DropError::Validation(format!(
                "file too large (max {max_mb}MB)"
            )));
        }

        let id = self.ids.allocate(live.len(), |candidate| {
            live.contains_key(candidate) || self.blobs.exists(candidate)
        })?;

        self.blobs.write(&id, content)?;

        // Keep upload times non-decreasing even if the clock steps back.
        let latest = live.values().filter_map(FileRecord::uploaded_at).max();
        let uploaded_at = latest.map_or(now, |latest| latest.max(now));
        let record = FileRecord::new(&id, original_name, uploaded_at, content.len() as u64);

        if let Err(e) = self.metadata.put(record.clone()) {
            tracing::error!(id = %id, error = %e, "Metadata commit failed, rolling back blob");
            if let Err(rollback) = self.blobs.delete(&id) {
                tracing::warn!(id = %id, error = %rollback, "Rollback failed, leaving blob for orphan sweep");
            }
            return Err(e);
        }

        tracing::info!(id = %id, size = record.size_bytes, "File uploaded");
        Ok(record)
    }

    /// Look up a live file and read its content.
    ///
    /// Both an unknown id and a record whose blob has vanished are reported
    /// in the not-found family; the latter also drops the stale record.
    pub fn resolve(&self, id: &str) -> Result<ResolvedFile> {
        let _guard = self.lock();
        let live = self.retention_manager().cleanup(self.clock.now())?;

        let record = live
            .get(id)
            .cloned()
            .ok_or_else(|| DropError::NotFound(format!("file {id}")))?;

        match self.blobs.read(id) {
            Ok(content) => Ok(ResolvedFile { record, content }),
            Err(DropError::BlobMissing(_)) => {
                tracing::warn!(id = %id, "Blob vanished after cleanup, dropping record");
                self.metadata.remove(id)?;
                Err(DropError::BlobMissing(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a live file's metadata without reading its content.
    pub fn info(&self, id: &str) -> Result<FileRecord> {
        let _guard = self.lock();
        let live = self.retention_manager().cleanup(self.clock.now())?;

        live.get(id)
            .cloned()
            .ok_or_else(|| DropError::NotFound(format!("file {id}")))
    }

    /// Run a retention pass now.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let _guard = self.lock();
        self.retention_manager()
            .cleanup_with_report(self.clock.now())
            .map(|(_, report)| report)
    }

    /// Current live set, after a retention pass.
    pub fn live_files(&self) -> Result<FileIndex> {
        let _guard = self.lock();
        self.retention_manager().cleanup(self.clock.now())
    }

    /// Share link for `id` using the configured base URL.
    pub fn share_link(&self, id: &str) -> String {
        build_share_link(id, self.base_url.as_deref())
    }

    fn retention_manager(&self) -> RetentionManager<'_> {
        RetentionManager::new(&self.metadata, &self.blobs, self.ids, self.policy)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock holds no broken state.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format a share link.
///
/// With a base URL the id is appended after a single `/`; without one (or
/// with an empty one) the bare id is returned and the caller supplies context.
pub fn build_share_link(id: &str, base_url: Option<&str>) -> String {
    match base_url.map(|url| url.trim_end_matches('/')) {
        Some(base) if !base.is_empty() => format!("{base}/{id}"),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn setup_service() -> (TempDir, Arc<ManualClock>, DropService) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            upload_directory: temp_dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(t0()));
        let service = DropService::with_clock(&config, clock.clone()).unwrap();
        (temp_dir, clock, service)
    }

    #[test]
    fn test_upload_and_resolve() {
        let (_temp_dir, _clock, service) = setup_service();

        let record = service.upload("hello.txt", b"Hello, World!").unwrap();

        assert_eq!(record.id.len(), 4);
        assert_eq!(record.original_name, "hello.txt");
        assert_eq!(record.size_bytes, 13);
        assert_eq!(record.uploaded_at(), Some(t0()));

        let resolved = service.resolve(&record.id).unwrap();
        assert_eq!(resolved.content, b"Hello, World!");
        assert_eq!(resolved.record, record);
    }

    #[test]
    fn test_empty_and_binary_round_trip() {
        let (_temp_dir, _clock, service) = setup_service();

        let empty = service.upload("empty", b"").unwrap();
        let binary: Vec<u8> = (0..=255).rev().collect();
        let bin = service.upload("blob.bin", &binary).unwrap();

        assert!(service.resolve(&empty.id).unwrap().content.is_empty());
        assert_eq!(service.resolve(&bin.id).unwrap().content, binary);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let (_temp_dir, _clock, service) = setup_service();

        let err = service.resolve("ffff").unwrap_err();

        assert!(matches!(err, DropError::NotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_rejects_traversal_as_not_found() {
        let (_temp_dir, _clock, service) = setup_service();

        let err = service.resolve("../metadata.json").unwrap_err();

        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_after_expiry() {
        let (_temp_dir, clock, service) = setup_service();
        let record = service.upload("report.pdf", &[7u8; 1024]).unwrap();

        clock.advance(Duration::hours(1));
        assert!(service.resolve(&record.id).is_ok());

        clock.advance(Duration::hours(96));
        let err = service.resolve(&record.id).unwrap_err();
        assert!(matches!(err, DropError::NotFound(_)));
    }

    #[test]
    fn test_resolve_missing_blob() {
        let (temp_dir, _clock, service) = setup_service();
        let record = service.upload("a.txt", b"abc").unwrap();
        fs::remove_file(temp_dir.path().join(&record.id)).unwrap();

        let err = service.resolve(&record.id).unwrap_err();

        assert!(err.is_not_found());
        assert!(service.live_files().unwrap().is_empty());
    }

    #[test]
    fn test_upload_too_large() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            upload_directory: temp_dir.path().to_string_lossy().into_owned(),
            max_upload_size_mb: 1,
            ..Default::default()
        };
        let service = DropService::new(&config).unwrap();

        let err = service.upload("big.bin", &vec![0u8; 1024 * 1024 + 1]).unwrap_err();

        assert!(matches!(err, DropError::Validation(_)));
        assert!(service.live_files().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_upload_still_expires_old_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            upload_directory: temp_dir.path().to_string_lossy().into_owned(),
            max_upload_size_mb: 1,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(t0()));
        let service = DropService::with_clock(&config, clock.clone()).unwrap();
        let old = service.upload("old.txt", b"old").unwrap();

        clock.advance(Duration::hours(97));
        let err = service.upload("big.bin", &vec![0u8; 1024 * 1024 + 1]).unwrap_err();

        assert!(matches!(err, DropError::Validation(_)));
        assert!(!temp_dir.path().join(&old.id).exists());
    }

    #[test]
    fn test_upload_rolls_back_blob_on_metadata_failure() {
        let (temp_dir, _clock, service) = setup_service();
        // A directory where the metadata file should be makes every save fail.
        fs::create_dir(temp_dir.path().join("metadata.json")).unwrap();

        let err = service.upload("a.txt", b"abc").unwrap_err();

        assert!(err.is_persistence());
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "metadata.json")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_upload_times_never_go_backwards() {
        let (_temp_dir, clock, service) = setup_service();

        let first = service.upload("a", b"a").unwrap();
        clock.advance(Duration::minutes(-5));
        let second = service.upload("b", b"b").unwrap();

        assert!(second.uploaded_at() >= first.uploaded_at());
    }

    #[test]
    fn test_cleanup_reports_expired() {
        let (_temp_dir, clock, service) = setup_service();
        let record = service.upload("a", b"a").unwrap();

        assert!(service.cleanup().unwrap().is_empty());

        clock.advance(Duration::hours(97));
        let report = service.cleanup().unwrap();
        assert_eq!(report.expired, vec![record.id]);
    }

    #[test]
    fn test_info() {
        let (_temp_dir, _clock, service) = setup_service();
        let record = service.upload("notes.md", b"# hi").unwrap();

        assert_eq!(service.info(&record.id).unwrap(), record);
        assert!(service.info("zzzz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_build_share_link() {
        assert_eq!(build_share_link("ab12", None), "ab12");
        assert_eq!(build_share_link("ab12", Some("")), "ab12");
        assert_eq!(
            build_share_link("ab12", Some("https://drop.example.com")),
            "https://drop.example.com/ab12"
        );
        assert_eq!(
            build_share_link("ab12", Some("https://drop.example.com/f//")),
            "https://drop.example.com/f/ab12"
        );
    }

    #[test]
    fn test_share_link_uses_configured_base() {
        let (_temp_dir, _clock, service) = setup_service();
        assert_eq!(service.share_link("ab12"), "ab12");

        let service = service.with_base_url(Some("http://localhost:8080/".to_string()));
        assert_eq!(service.share_link("ab12"), "http://localhost:8080/ab12");
    }
}
