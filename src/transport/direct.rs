use super::data_url::{self, is_data_url};
use super::{FetchError, RawImage};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Loads locators that need no network round trip.
#[async_trait]
pub trait DirectLoader: Send + Sync {
    async fn load(&self, locator: &str) -> Result<RawImage, FetchError>;
}

/// Default direct loader: `data:` URLs, `file://` URLs and plain paths.
#[derive(Debug, Default, Clone)]
pub struct FsLoader {
    root: Option<PathBuf>,
}

impl FsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root` instead of the working directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl DirectLoader for FsLoader {
    async fn load(&self, locator: &str) -> Result<RawImage, FetchError> {
        if is_data_url(locator) {
            let url = data_url::decode(locator)?;
            return Ok(RawImage {
                bytes: url.bytes,
                content_type: Some(url.content_type),
            });
        }

        let path = self.resolve(locator);
        debug!("Loading {} from disk", path.display());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Load {
                locator: locator.to_string(),
                source,
            })?;
        Ok(RawImage {
            bytes,
            content_type: None,
        })
    }
}
