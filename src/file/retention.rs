//! Expiry and consistency sweep.
//!
//! A pass removes every record past its retention window, every record whose
//! blob has vanished, and every blob that no record points at. After a pass
//! the metadata set and the blob directory agree again, whatever state a
//! crash left them in.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use super::id::IdAllocator;
use super::metadata::{FileIndex, MetadataStore};
use super::storage::BlobStore;
use crate::Result;

/// How long files live and how long unreferenced blobs are tolerated.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Age at which a record expires.
    pub retention: chrono::Duration,
    /// Age at which a blob with no record is deleted.
    pub orphan_grace: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::hours(96),
            orphan_grace: Duration::from_secs(3600),
        }
    }
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Records removed because they were past the retention window.
    pub expired: Vec<String>,
    /// Records removed because their blob was missing.
    pub dangling: Vec<String>,
    /// Blobs removed because no record referenced them.
    pub orphans: Vec<String>,
}

impl CleanupReport {
    /// Whether the pass removed anything at all.
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.dangling.is_empty() && self.orphans.is_empty()
    }

    /// Number of metadata records removed.
    pub fn removed_records(&self) -> usize {
        self.expired.len() + self.dangling.len()
    }
}

/// Runs retention passes over one metadata store and blob store.
///
/// Not synchronized: callers hold the service lock for the whole pass.
pub struct RetentionManager<'a> {
    metadata: &'a MetadataStore,
    blobs: &'a BlobStore,
    ids: IdAllocator,
    policy: RetentionPolicy,
}

impl<'a> RetentionManager<'a> {
    /// Create a new RetentionManager.
    ///
    /// `ids` decides which directory entries count as blobs for the orphan sweep.
    pub fn new(
        metadata: &'a MetadataStore,
        blobs: &'a BlobStore,
        ids: IdAllocator,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            metadata,
            blobs,
            ids,
            policy,
        }
    }

    /// Run a pass at `now` and return the live set.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<FileIndex> {
        self.cleanup_with_report(now).map(|(live, _)| live)
    }

    /// Run a pass at `now` and return the live set together with what was removed.
    ///
    /// Metadata is only rewritten when a record was removed. A failed
    /// metadata write is returned; failed blob deletions are logged and
    /// retried by the next pass's orphan sweep.
    pub fn cleanup_with_report(&self, now: DateTime<Utc>) -> Result<(FileIndex, CleanupReport)> {
        let index = self.metadata.load()?;
        let mut report = CleanupReport::default();
        let mut live = FileIndex::new();

        for (id, record) in index {
            if record.is_expired(now, self.policy.retention) {
                self.delete_blob(&id);
                report.expired.push(id);
            } else if !self.blobs.exists(&id) {
                tracing::warn!(id = %id, "Metadata record without blob, dropping it");
                report.dangling.push(id);
            } else {
                live.insert(id, record);
            }
        }

        if report.removed_records() > 0 {
            self.metadata.save(&live)?;
            tracing::info!(
                expired = report.expired.len(),
                dangling = report.dangling.len(),
                remaining = live.len(),
                "Removed expired files"
            );
        }

        report.orphans = self.sweep_orphans(now, &live);

        Ok((live, report))
    }

    /// Delete blobs that no live record references and that are older than the grace period.
    fn sweep_orphans(&self, now: DateTime<Utc>, live: &FileIndex) -> Vec<String> {
        let entries = match self.blobs.list() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list blobs for orphan sweep");
                return Vec::new();
            }
        };

        let now = SystemTime::from(now);
        let mut removed = Vec::new();

        for entry in entries {
            if !self.ids.is_valid_id(&entry.id) || live.contains_key(&entry.id) {
                continue;
            }
            let old_enough = entry
                .modified
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= self.policy.orphan_grace);
            if !old_enough {
                continue;
            }
            if self.delete_blob(&entry.id) {
                tracing::info!(id = %entry.id, size = entry.size, "Removed orphaned blob");
                removed.push(entry.id);
            }
        }

        removed
    }

    /// Delete one blob, logging instead of failing. Returns whether a blob was removed.
    fn delete_blob(&self, id: &str) -> bool {
        match self.blobs.delete(id) {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Failed to delete blob");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileRecord;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        metadata: MetadataStore,
        blobs: BlobStore,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let blobs = BlobStore::new(temp_dir.path()).unwrap();
            let metadata = MetadataStore::new(temp_dir.path().join("metadata.json")).unwrap();
            Self {
                _temp_dir: temp_dir,
                metadata,
                blobs,
            }
        }

        fn manager(&self) -> RetentionManager<'_> {
            RetentionManager::new(
                &self.metadata,
                &self.blobs,
                IdAllocator::default(),
                RetentionPolicy::default(),
            )
        }

        fn add(&self, id: &str, uploaded_at: DateTime<Utc>) {
            self.blobs.write(id, id.as_bytes()).unwrap();
            self.metadata
                .put(FileRecord::new(id, format!("{id}.txt"), uploaded_at, 4))
                .unwrap();
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let fx = Fixture::new();
        let now = t0();
        let window = chrono::Duration::hours(96);
        fx.add("0001", now - window - chrono::Duration::seconds(1));
        fx.add("0002", now - window + chrono::Duration::seconds(1));

        let (live, report) = fx.manager().cleanup_with_report(now).unwrap();

        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["0002"]);
        assert_eq!(report.expired, vec!["0001"]);
        assert!(!fx.blobs.exists("0001"));
        assert!(fx.blobs.exists("0002"));
        assert_eq!(fx.metadata.load().unwrap(), live);
    }

    #[test]
    fn test_exactly_at_window_is_expired() {
        let fx = Fixture::new();
        fx.add("0001", t0());

        let live = fx.manager().cleanup(t0() + chrono::Duration::hours(96)).unwrap();

        assert!(live.is_empty());
    }

    #[test]
    fn test_no_write_when_nothing_expired() {
        let fx = Fixture::new();
        fx.add("0001", t0());
        // Poison the file contents: a rewrite would replace them.
        let raw = fs::read_to_string(fx.metadata.path()).unwrap();
        let marker = format!("{raw}\n");
        fs::write(fx.metadata.path(), &marker).unwrap();

        let (live, report) = fx.manager().cleanup_with_report(t0()).unwrap();

        assert_eq!(live.len(), 1);
        assert!(report.is_empty());
        assert_eq!(fs::read_to_string(fx.metadata.path()).unwrap(), marker);
    }

    #[test]
    fn test_unparseable_timestamp_is_removed() {
        let fx = Fixture::new();
        fx.blobs.write("0001", b"data").unwrap();
        fs::write(
            fx.metadata.path(),
            r#"{"0001": {"original_name": "a.txt", "uploaded_at": "not a date", "size_bytes": 4}}"#,
        )
        .unwrap();

        let (live, report) = fx.manager().cleanup_with_report(t0()).unwrap();

        assert!(live.is_empty());
        assert_eq!(report.expired, vec!["0001"]);
        assert!(!fx.blobs.exists("0001"));
    }

    #[test]
    fn test_record_without_blob_is_dropped() {
        let fx = Fixture::new();
        fx.add("0001", t0());
        fx.add("0002", t0());
        fx.blobs.delete("0001").unwrap();

        let (live, report) = fx.manager().cleanup_with_report(t0()).unwrap();

        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["0002"]);
        assert_eq!(report.dangling, vec!["0001"]);
        assert!(!fx.metadata.load().unwrap().contains_key("0001"));
    }

    #[test]
    fn test_expired_record_with_missing_blob() {
        let fx = Fixture::new();
        fx.add("0001", t0());
        fx.blobs.delete("0001").unwrap();

        let (live, report) = fx
            .manager()
            .cleanup_with_report(t0() + chrono::Duration::hours(100))
            .unwrap();

        assert!(live.is_empty());
        assert_eq!(report.expired, vec!["0001"]);
    }

    #[test]
    fn test_orphan_blob_swept_after_grace() {
        let fx = Fixture::new();
        fx.blobs.write("beef", b"orphan").unwrap();
        fx.add("0001", Utc::now());

        let early = fx.manager().cleanup_with_report(Utc::now()).unwrap().1;
        assert!(early.orphans.is_empty());
        assert!(fx.blobs.exists("beef"));

        let later = Utc::now() + chrono::Duration::hours(2);
        let (live, report) = fx.manager().cleanup_with_report(later).unwrap();

        assert_eq!(report.orphans, vec!["beef"]);
        assert!(!fx.blobs.exists("beef"));
        assert!(live.contains_key("0001"));
        assert!(fx.blobs.exists("0001"));
    }

    #[test]
    fn test_orphan_sweep_ignores_non_blob_files() {
        let fx = Fixture::new();
        fx.add("0001", Utc::now());
        fs::write(fx.blobs.base_path().join("README"), b"keep me").unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        let (_, report) = fx.manager().cleanup_with_report(later).unwrap();

        assert!(report.orphans.is_empty());
        assert!(fx.metadata.path().exists());
        assert!(fx.blobs.base_path().join("README").exists());
    }

    #[test]
    fn test_consistency_after_cleanup() {
        let fx = Fixture::new();
        let now = Utc::now();
        fx.add("0001", now - chrono::Duration::hours(200));
        fx.add("0002", now - chrono::Duration::hours(1));
        fx.add("0003", now);
        fx.blobs.delete("0003").unwrap();

        let (live, report) = fx.manager().cleanup_with_report(now).unwrap();

        for id in live.keys() {
            assert!(fx.blobs.exists(id));
        }
        for id in report.expired.iter().chain(report.dangling.iter()) {
            assert!(!fx.blobs.exists(id));
            assert!(!live.contains_key(id));
        }
        assert_eq!(report.removed_records(), 2);
    }
}
