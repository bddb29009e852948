//! Persistent key-value blob store.
//!
//! Each key holds one whole JSON document. Writes replace the document;
//! there are no partial updates, migrations or versions. Two documents are
//! kept: the round history list ([`GAMES_KEY`]) and the settings object
//! ([`SETTINGS_KEY`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Key of the round history document.
pub const GAMES_KEY: &str = "jacktrack_games";

/// Key of the settings document.
pub const SETTINGS_KEY: &str = "jacktrack_settings";

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Keys become file names, so only `[A-Za-z0-9_-]` is allowed.
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    /// A document could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A document could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored document is not valid JSON, or not of the expected shape.
    #[error("Failed to parse document '{key}': {source}")]
    ParseError {
        /// Document key.
        key: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized.
    #[error("Failed to serialize document: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Flat get/set store of JSON documents.
pub trait BlobStore: Send + Sync {
    /// Read the document under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read.
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Replace the document under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    fn set(&self, key: &str, value: &Value) -> StoreResult<()>;

    /// Delete the document under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be removed.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Read and deserialize the document under `key`.
///
/// # Errors
///
/// Returns [`StoreError::ParseError`] if the document has the wrong shape.
pub fn load_document<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> StoreResult<Option<T>> {
    store
        .get(key)?
        .map(|value| {
            serde_json::from_value(value).map_err(|source| StoreError::ParseError {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

/// Serialize `document` and store it under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_document<T: Serialize>(
    store: &dyn BlobStore,
    key: &str,
    document: &T,
) -> StoreResult<()> {
    let value = serde_json::to_value(document)?;
    store.set(key, &value)
}

fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Store that keeps each document in `<data_dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    data_dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `data_dir`. The directory is created on the
    /// first write.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of this store.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        validate_key(key)?;
        let path = self.path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::ReadError { path, source }),
        };
        let value = serde_json::from_str(&content).map_err(|source| StoreError::ParseError {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        validate_key(key)?;
        std::fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::CreateDirError {
            path: self.data_dir.clone(),
            source,
        })?;
        let path = self.path(key);
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, content).map_err(|source| StoreError::WriteError {
            path: path.clone(),
            source,
        })?;
        debug!(key, path = %path.display(), "document saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::WriteError { path, source }),
        }
    }
}

/// Store that keeps documents in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    documents: Mutex<HashMap<String, Value>>,
    read_only: AtomicBool,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following `set` and `remove` while `read_only` holds.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    fn check_writable(&self, key: &str) -> StoreResult<()> {
        if self.read_only.load(Ordering::Acquire) {
            return Err(StoreError::WriteError {
                path: PathBuf::from(key),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "store is read-only",
                ),
            });
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        validate_key(key)?;
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        validate_key(key)?;
        self.check_writable(key)?;
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.check_writable(key)?;
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/jacktrack`
/// Elsewhere: the platform data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/jacktrack")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "jacktrack")
            .map_or_else(|| PathBuf::from("data"), |dirs| dirs.data_dir().to_path_buf())
    }
}
