//! File-backed [`KeyValueStore`]: one file per key inside a cache directory.
//!
//! File names are derived from the key with a configurable [`KeyHasher`].
//! Nothing is ever invalidated or expired.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::contract::{CacheError, KeyValueStore};

/// How a cache key is turned into a file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyHasher {
    /// URL-safe base64 of the key (padded).
    #[default]
    Base64Url,
    /// Lower-case hex SHA-256 of the key.
    Sha256,
}

impl KeyHasher {
    pub fn file_name(&self, key: &str) -> String {
        match self {
            KeyHasher::Base64Url => URL_SAFE.encode(key.as_bytes()),
            KeyHasher::Sha256 => format!("{:x}", Sha256::digest(key.as_bytes())),
        }
    }
}

pub struct FileCache {
    dir: PathBuf,
    hasher: KeyHasher,
}

impl FileCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, hasher: KeyHasher) -> Result<Self, CacheError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| {
                error!(error = ?source, path = %dir.display(), "Failed to create cache directory");
                CacheError::Io {
                    path: dir.clone(),
                    source,
                }
            })?;
            info!(path = %dir.display(), "Created cache directory");
        }
        Ok(Self { dir, hasher })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(self.hasher.file_name(key))
    }
}

impl KeyValueStore for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            debug!(key, "Cache miss");
            return Ok(None);
        }
        let value = fs::read_to_string(&path).map_err(|source| {
            error!(error = ?source, path = %path.display(), "Failed to read cache entry");
            CacheError::Io {
                path: path.clone(),
                source,
            }
        })?;
        debug!(key, size = value.len(), "Cache hit");
        Ok(Some(value))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        fs::write(&path, value).map_err(|source| {
            error!(error = ?source, path = %path.display(), "Failed to write cache entry");
            CacheError::Io {
                path: path.clone(),
                source,
            }
        })?;
        debug!(key, size = value.len(), "Saved cache entry");
        Ok(())
    }
}
