//! Persistent cache for rendered images.
//!
//! The controller talks to the store only through [`ImageCache`]: load by key
//! and freshness timestamp, save, remove. Keys are derived here
//! ([`CacheKey::derive`]); how entries are stored is up to the implementation.
//!
//! ## Freshness
//!
//! Every entry is saved together with the request's freshness timestamp. A
//! load with timestamp `t` hits only when the stored timestamp is `>= t`.
//! Older entries are stale: the store evicts them and reports a miss, so the
//! image is fetched again and the fresh render replaces it.
//!
//! ## Implementations
//!
//! | Store | Use |
//! |---|---|
//! | [`MemoryCache`] | In-process map, shared by all requests of one loader |
//! | [`DiskCache`] | One file per entry plus a JSON manifest, survives restarts |
//!
//! Cache failures never fail a request. The controller logs them and carries
//! on as if the entry was missing.

mod disk;
mod key;
mod memory;

pub use disk::DiskCache;
pub use key::CacheKey;
pub use memory::MemoryCache;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Key-value store for encoded images, addressed by [`CacheKey`].
///
/// Implementations must tolerate concurrent calls for different keys; no
/// cross-key ordering is assumed.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// Return the data stored under `key` if it is at least as fresh as
    /// `timestamp`.
    async fn load(&self, key: &CacheKey, timestamp: i64) -> Result<Option<String>, CacheError>;

    /// Store `data` under `key`, replacing any previous entry.
    async fn save(&self, key: &CacheKey, data: &str, timestamp: i64) -> Result<(), CacheError>;

    /// Drop the entry under `key`, if any.
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
}

/// Whether an entry saved at `stored` satisfies a request at `requested`.
pub(crate) fn is_fresh(stored: i64, requested: i64) -> bool {
    stored >= requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_or_equal_entries_are_fresh() {
        assert!(is_fresh(1000, 1000));
        assert!(is_fresh(2000, 1000));
        assert!(!is_fresh(999, 1000));
    }
}
