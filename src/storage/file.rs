//! JSON state files written with temp-file-and-rename

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, trace};

use super::error::{StorageError, StorageResult};

/// A single JSON document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// State file named `name` inside `dir`
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. `Ok(None)` if the file does not exist.
    pub fn load<T: DeserializeOwned>(&self) -> StorageResult<Option<T>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// Like [`StateFile::load`], but logs failures and falls back to `T::default()`.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self.load() {
            Ok(Some(value)) => {
                trace!("loaded state from {}", self.path.display());
                value
            }
            Ok(None) => {
                debug!("no state at {}", self.path.display());
                T::default()
            }
            Err(e) => {
                error!("failed to load {}: {e}", self.path.display());
                T::default()
            }
        }
    }

    /// Writes the document atomically: the new content is written to a sibling temp file
    /// which then replaces the old one.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path, &bytes)
    }

    /// Like [`StateFile::save`], but the file is written on tokio's blocking pool.
    ///
    /// The value is encoded before returning to the caller's task, so concurrent saves that
    /// are awaited under the owner's lock land on disk in order.
    pub async fn save_async<T: Serialize + ?Sized>(&self, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StorageError::IoError(std::io::Error::other(e)))?
    }

    /// Saves and logs failures instead of returning them.
    pub fn save_logged<T: Serialize + ?Sized>(&self, value: &T) {
        if let Err(e) = self.save(value) {
            error!("failed to save {}: {e}", self.path.display());
        }
    }

    /// Async counterpart of [`StateFile::save_logged`]
    pub async fn save_logged_async<T: Serialize + ?Sized>(&self, value: &T) {
        if let Err(e) = self.save_async(value).await {
            error!("failed to save {}: {e}", self.path.display());
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
