//! Blob storage for filedrop.
//!
//! Raw upload bytes live in a flat directory, one file per identifier:
//! ```text
//! {base_path}/
//! ├── 3f9a
//! ├── c01d
//! └── metadata.json   (owned by the metadata store, never listed as a blob)
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{DropError, Result};

/// A blob found on disk.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    /// Blob key (file name).
    pub id: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the filesystem reports one.
    pub modified: Option<SystemTime>,
}

/// Blob store keyed by file identifier.
#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Directory holding the blobs.
    base_path: PathBuf,
}

impl BlobStore {
    /// Create a new BlobStore rooted at `base_path`.
    ///
    /// The directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Store `content` under `id`, replacing any previous blob.
    ///
    /// The bytes land in a temporary file first and are renamed into place,
    /// so a concurrent reader sees either the old blob or the new one.
    pub fn write(&self, id: &str, content: &[u8]) -> Result<()> {
        let file_path = self.get_file_path(id)?;
        let tmp_path = self.base_path.join(format!(".{id}.tmp"));

        let written = (|| -> io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &file_path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(DropError::Persistence(format!(
                "failed to write blob {id}: {e}"
            )));
        }

        tracing::debug!(id, size = content.len(), "Blob written");
        Ok(())
    }

    /// Read the blob stored under `id`.
    pub fn read(&self, id: &str) -> Result<Vec<u8>> {
        let file_path = self.get_file_path(id)?;

        match fs::read(&file_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DropError::BlobMissing(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob stored under `id`.
    ///
    /// Returns `true` if a blob was removed, `false` if there was none.
    /// Deleting an absent blob is not an error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let file_path = self.get_file_path(id)?;

        match fs::remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a blob exists.
    pub fn exists(&self, id: &str) -> bool {
        match self.get_file_path(id) {
            Ok(path) => path.is_file(),
            Err(_) => false,
        }
    }

    /// List every regular file in the store.
    ///
    /// Dot-files (temporary writes) are skipped. Callers decide which
    /// entries are actually blobs.
    pub fn list(&self) -> Result<Vec<BlobEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(BlobEntry {
                id: name,
                size: metadata.len(),
                modified: metadata.modified().ok(),
            });
        }

        Ok(entries)
    }

    /// Get the full file path for a blob key.
    pub fn get_file_path(&self, id: &str) -> Result<PathBuf> {
        Self::validate_key(id)?;
        Ok(self.base_path.join(id))
    }

    /// Reject keys that could escape the store directory.
    fn validate_key(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(DropError::Validation(format!("invalid blob key: {id:?}")))
        }
    }
}
