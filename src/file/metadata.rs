//! File metadata types and the JSON-backed metadata store.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{DropError, Result};

/// Metadata for one stored file.
///
/// On disk the identifier is the JSON object key, so it is not part of the
/// serialized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File identifier (also the blob key).
    #[serde(skip)]
    pub id: String,
    /// Client-supplied filename, stored verbatim.
    #[serde(default)]
    pub original_name: String,
    /// Upload time as an ISO-8601 UTC string.
    #[serde(default)]
    pub uploaded_at: String,
    /// Size of the blob in bytes.
    #[serde(default)]
    pub size_bytes: u64,
}

impl FileRecord {
    /// Create a record stamped with `uploaded_at`.
    pub fn new(
        id: impl Into<String>,
        original_name: impl Into<String>,
        uploaded_at: DateTime<Utc>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            original_name: original_name.into(),
            uploaded_at: format_timestamp(&uploaded_at),
            size_bytes,
        }
    }

    /// Parsed upload time, or `None` if the stored string is unreadable.
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.uploaded_at)
    }

    /// When the record stops being live, or `None` if it already counts as expired.
    pub fn expires_at(&self, retention: chrono::Duration) -> Option<DateTime<Utc>> {
        self.uploaded_at().map(|at| at + retention)
    }

    /// Whether the record is past its retention window at `now`.
    ///
    /// An unparseable timestamp counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        match self.uploaded_at() {
            Some(at) => now - at >= retention,
            None => true,
        }
    }
}

/// Format a timestamp the way the metadata file stores it.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 with any offset, or an offset-less ISO-8601 string which
/// is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The full record set, ordered by identifier.
pub type FileIndex = BTreeMap<String, FileRecord>;

/// Metadata store backed by a single JSON file.
///
/// The store does not lock: every load-modify-save sequence must run under
/// the caller's lock (see [`DropService`](super::DropService)).
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Create a store persisting to `path`.
    ///
    /// The parent directory will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current record set.
    ///
    /// A missing file means no files yet. A file whose content is not valid
    /// UTF-8 JSON is logged and treated the same way. Any other read failure
    /// is returned, so a transient I/O error never replaces stored records.
    /// Entries with missing or ill-typed fields load with an empty timestamp,
    /// so the next retention pass removes them.
    pub fn load(&self) -> Result<FileIndex> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileIndex::new()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(path = %self.path.display(), error = %e, "Metadata file is not UTF-8, starting empty");
                return Ok(FileIndex::new());
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to read metadata file");
                return Err(DropError::Persistence(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt metadata file, starting empty");
                return Ok(FileIndex::new());
            }
        };

        Ok(raw
            .into_iter()
            .map(|(id, value)| {
                let mut record = serde_json::from_value::<FileRecord>(value).unwrap_or_else(|e| {
                    tracing::warn!(id = %id, error = %e, "Malformed metadata entry");
                    FileRecord {
                        id: String::new(),
                        original_name: String::new(),
                        uploaded_at: String::new(),
                        size_bytes: 0,
                    }
                });
                record.id = id.clone();
                (id, record)
            })
            .collect())
    }

    /// Replace the persisted record set with `index`.
    ///
    /// Written to a sibling temporary file and renamed over the target, so a
    /// reader sees either the old set or the new one, never a partial write.
    pub fn save(&self, index: &FileIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| DropError::Persistence(format!("failed to encode metadata: {e}")))?;
        let tmp_path = self.tmp_path();

        let written = (|| -> io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(DropError::Persistence(format!(
                "failed to write {}: {e}",
                self.path.display()
            )));
        }

        tracing::debug!(records = index.len(), "Metadata saved");
        Ok(())
    }

    /// Insert or replace one record.
    pub fn put(&self, record: FileRecord) -> Result<()> {
        let mut index = self.load()?;
        index.insert(record.id.clone(), record);
        self.save(&index)
    }

    /// Remove one record. Returns whether it was present.
    ///
    /// Nothing is written when the record is already absent.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut index = self.load()?;
        if index.remove(id).is_none() {
            return Ok(false);
        }
        self.save(&index)?;
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "metadata".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}
