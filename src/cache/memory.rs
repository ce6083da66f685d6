use super::{CacheError, CacheKey, ImageCache, is_fresh};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    data: String,
    timestamp: i64,
}

/// In-process cache. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ImageCache for MemoryCache {
    async fn load(&self, key: &CacheKey, timestamp: i64) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if is_fresh(entry.timestamp, timestamp) => Ok(Some(entry.data.clone())),
            Some(entry) => {
                debug!(
                    "Evicting stale entry {} (stored {}, requested {})",
                    key, entry.timestamp, timestamp
                );
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &CacheKey, data: &str, timestamp: i64) -> Result<(), CacheError> {
        self.entries.lock().await.insert(
            key.clone(),
            Entry {
                data: data.to_string(),
                timestamp,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
