//! File-based session storage.
//!
//! Stores each record as a JSON file in a directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::storage::SessionStorage;
use crate::AuthError;

/// File-based session storage.
///
/// The record for `key` lives at `{directory}/{key}.json`. Writes go to a
/// temporary file in the same directory that is then renamed over the
/// target, so a crash mid-write leaves the previous record intact.
///
/// # Example
///
/// ```rust,ignore
/// use ats_session::session::FileSessionStorage;
///
/// let storage = FileSessionStorage::new(dirs::data_dir().unwrap().join("ats"))?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    directory: PathBuf,
}

impl FileSessionStorage {
    /// Creates the storage, creating the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let dir = directory.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AuthError::StorageError(format!("Failed to create session directory: {e}"))
        })?;
        Ok(Self { directory: dir })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the path for a key, or `None` if the key could escape the
    /// directory.
    fn record_path(&self, key: &str) -> Option<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| self.directory.join(format!("{key}.json")))
    }

    fn checked_path(&self, key: &str) -> Result<PathBuf, AuthError> {
        self.record_path(key)
            .ok_or_else(|| AuthError::StorageError(format!("Invalid storage key: {key:?}")))
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        let path = self.checked_path(key)?;

        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::StorageError(format!(
                "Failed to read session file: {e}"
            ))),
        }
    }

    async fn write(&self, key: &str, record: &str) -> Result<(), AuthError> {
        let path = self.checked_path(key)?;

        let mut file = NamedTempFile::new_in(&self.directory)
            .map_err(|e| AuthError::StorageError(format!("Failed to create temp file: {e}")))?;
        file.write_all(record.as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| AuthError::StorageError(format!("Failed to write session file: {e}")))?;
        file.persist(&path)
            .map_err(|e| AuthError::StorageError(format!("Failed to replace session file: {e}")))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        let path = self.checked_path(key)?;

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::StorageError(format!(
                "Failed to delete session file: {e}"
            ))),
        }
    }
}
