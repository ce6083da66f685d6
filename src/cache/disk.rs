//! On-disk cache store.
//!
//! Layout inside the cache directory:
//!
//! ```text
//! .image-loader-cache/
//! ├── manifest.json          # {version, entries: {key: {timestamp, file}}}
//! ├── 3f2a…e1.dat            # encoded image data, one file per key
//! └── 9b04…7c.dat
//! ```
//!
//! The manifest is the source of truth for freshness. An entry whose data
//! file has gone missing is treated as a miss and dropped from the manifest.
//! A missing, corrupt or wrong-version manifest loads as empty, which simply
//! means every image is fetched again.
//!
//! The manifest lock covers manifest updates and file deletions only. Data
//! files are read and written outside it, so requests for different keys do
//! not wait on each other's I/O. Data files are written to a unique temp file
//! and renamed into place; a reader sees the old content or the new, never a
//! partial write.

use super::{CacheError, CacheKey, ImageCache, is_fresh};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const MANIFEST_FILENAME: &str = "manifest.json";

/// Bump to invalidate every existing cache directory when the layout or key
/// derivation changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DiskEntry {
    timestamp: i64,
    file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: HashMap<String, DiskEntry>,
}

impl Manifest {
    fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }

    async fn load(dir: &Path) -> Self {
        let content = match tokio::fs::read_to_string(dir.join(MANIFEST_FILENAME)).await {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!("Ignoring corrupt cache manifest in {}: {}", dir.display(), e);
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            debug!(
                "Cache manifest version {} != {}, starting empty",
                manifest.version, MANIFEST_VERSION
            );
            return Self::empty();
        }
        manifest
    }

    /// Write through a temp file so a crash never leaves a torn manifest.
    async fn save(&self, dir: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = dir.join(format!("{MANIFEST_FILENAME}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, dir.join(MANIFEST_FILENAME)).await?;
        Ok(())
    }
}

/// Persistent cache rooted at a directory.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    manifest: Mutex<Manifest>,
    tmp_seq: AtomicU64,
}

impl DiskCache {
    /// Open (creating if needed) the cache in `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let manifest = Manifest::load(&dir).await;
        Ok(Self {
            dir,
            manifest: Mutex::new(manifest),
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_file(key: &CacheKey) -> String {
        format!("{}.dat", key.as_str())
    }

    async fn write_data_file(&self, file: &str, data: &str) -> io::Result<()> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{file}.{seq}.tmp"));
        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, self.dir.join(file)).await
    }

    /// Drop `key` from the manifest if it still points at `expected`, and
    /// delete its data file.
    async fn evict(&self, key: &CacheKey, expected: &DiskEntry) -> Result<(), CacheError> {
        let mut manifest = self.manifest.lock().await;
        if manifest.entries.get(key.as_str()) != Some(expected) {
            return Ok(());
        }
        manifest.entries.remove(key.as_str());
        remove_file_if_present(&self.dir.join(&expected.file)).await?;
        manifest.save(&self.dir).await
    }
}

async fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl ImageCache for DiskCache {
    async fn load(&self, key: &CacheKey, timestamp: i64) -> Result<Option<String>, CacheError> {
        let entry = self.manifest.lock().await.entries.get(key.as_str()).cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };

        if !is_fresh(entry.timestamp, timestamp) {
            debug!(
                "Evicting stale entry {} (stored {}, requested {})",
                key, entry.timestamp, timestamp
            );
            self.evict(key, &entry).await?;
            return Ok(None);
        }

        match tokio::fs::read_to_string(self.dir.join(&entry.file)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.evict(key, &entry).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &CacheKey, data: &str, timestamp: i64) -> Result<(), CacheError> {
        let file = Self::data_file(key);
        self.write_data_file(&file, data).await?;
        let mut manifest = self.manifest.lock().await;
        manifest
            .entries
            .insert(key.as_str().to_string(), DiskEntry { timestamp, file });
        manifest.save(&self.dir).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut manifest = self.manifest.lock().await;
        let Some(entry) = manifest.entries.remove(key.as_str()) else {
            return Ok(());
        };
        remove_file_if_present(&self.dir.join(&entry.file)).await?;
        manifest.save(&self.dir).await
    }
}
