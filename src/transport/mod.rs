//! Transport selection: how the original bytes of an image are obtained.
//!
//! | Locator | Strategy | Collaborator |
//! |---|---|---|
//! | `http://…`, `https://…` | Binary fetch, status check, body read | [`HttpFetcher`] |
//! | anything else (`data:`, `file://`, paths, custom schemes) | Direct load | [`DirectLoader`] |
//!
//! [`TransportSelector::fetch_raw`] reports exactly one outcome per call and
//! never retries; retry policy belongs to whoever schedules requests.
//!
//! A fetch can be aborted through its [`TransportHandle`]. The aborted fetch
//! resolves to [`FetchError::Aborted`] and whatever the collaborator was doing
//! is dropped mid-flight.

pub mod data_url;
mod direct;
mod http;

pub use data_url::DataUrlError;
pub use direct::{DirectLoader, FsLoader};
pub use http::{HttpFetcher, HttpResponse, ReqwestFetcher, ResponseBody};

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Every way obtaining the original bytes can fail. All of them end the
/// request with the same error response.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to load {locator}: {source}")]
    Load {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid data URL: {0}")]
    DataUrl(#[from] DataUrlError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("failed to read response body: {0}")]
    Conversion(String),
    #[error("fetch aborted")]
    Aborted,
}

/// Original, still-encoded image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    /// Media type reported by the source, when it reports one.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Direct,
    Network,
}

impl Scheme {
    pub fn of(locator: &str) -> Self {
        let scheme = locator.split_once(':').map(|(s, _)| s);
        match scheme {
            Some(s) if s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https") => {
                Scheme::Network
            }
            _ => Scheme::Direct,
        }
    }
}

/// Abort switch for one in-flight fetch.
#[derive(Debug, Clone, Default)]
pub struct TransportHandle {
    token: CancellationToken,
}

impl TransportHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that is also aborted when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Picks the strategy for a locator and runs it.
#[derive(Clone)]
pub struct TransportSelector {
    direct: Arc<dyn DirectLoader>,
    http: Arc<dyn HttpFetcher>,
}

impl TransportSelector {
    pub fn new(direct: Arc<dyn DirectLoader>, http: Arc<dyn HttpFetcher>) -> Self {
        Self { direct, http }
    }

    /// Obtain the original bytes behind `locator`.
    pub async fn fetch_raw(
        &self,
        locator: &str,
        handle: &TransportHandle,
    ) -> Result<RawImage, FetchError> {
        if handle.is_aborted() {
            return Err(FetchError::Aborted);
        }
        tokio::select! {
            biased;
            () = handle.token.cancelled() => {
                debug!("Fetch of {} aborted", locator);
                Err(FetchError::Aborted)
            }
            result = self.fetch_unguarded(locator) => result,
        }
    }

    async fn fetch_unguarded(&self, locator: &str) -> Result<RawImage, FetchError> {
        match Scheme::of(locator) {
            Scheme::Direct => self.direct.load(locator).await,
            Scheme::Network => {
                let response = self.http.get(locator).await?;
                if response.status != 200 {
                    return Err(FetchError::Status(response.status));
                }
                let bytes = response.body.bytes().await?;
                Ok(RawImage {
                    bytes,
                    content_type: response.content_type,
                })
            }
        }
    }
}
