//! # Image Loader
//!
//! Drives one image request from descriptor to response: look it up in the
//! persistent cache, otherwise fetch the original, decode it, downscale it,
//! pick a compact encoding, write it back to the cache and deliver exactly one
//! terminal response. A scheduler owns many of these at once and decides their
//! order through [`ImageRequest::priority`]; this crate only handles the life
//! of a single request.
//!
//! # Request Lifecycle
//!
//! ```text
//! Idle ──load_from_cache_and_process──▶ CacheLookup ──hit──▶ Delivered
//!   ▲                                        │
//!   └──────────────miss / disabled───────────┘
//!
//! Idle ──download_and_process──▶ Fetching ──▶ Decoding ──▶ Resizing ──▶ Encoding ──▶ Delivered
//!                                    │            │            │            │
//!                                    └────────────┴──error─────┴────────────┴──▶ Delivered(error)
//!
//! any non-terminal phase ──cancel──▶ Cancelled
//! ```
//!
//! Every exit path (success, error, cancel) runs the [`guard::ResourceGuard`]
//! exactly once, and the response callback fires at most once.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`controller`] | The lifecycle state machine ([`ImageRequest`]) |
//! | [`guard`] | Releases transport and render resources on every terminal path |
//! | [`request`] | Immutable request descriptor and transform parameters |
//! | [`response`] | Tagged success / error response delivered to the caller |
//! | [`cache`] | Cache key derivation, the [`cache::ImageCache`] trait, memory and disk stores |
//! | [`transport`] | Direct-load vs. network fetch selection, `data:` URL codec |
//! | [`imaging`] | Target-size math, render surface, resizer, lossless/lossy encoder |
//! | [`config`] | TOML configuration for encoding policy, network and cache |
//!
//! # Design Decisions
//!
//! ## One Owning Task Per Request
//!
//! [`ImageRequest::download_and_process`] spawns a single tokio task that owns
//! the whole fetch → decode → resize → encode chain. The chain races a
//! [`tokio_util::sync::CancellationToken`]; `cancel()` trips the token, so a
//! late network completion is dropped on the floor instead of reaching a dead
//! request.
//!
//! ## Pixel Work Off The Event Loop
//!
//! Decode, resize and encode are CPU-bound and run as one job on tokio's
//! blocking pool. The job re-checks the cancellation state between stages and
//! frees its buffers as soon as it notices the request is gone.
//!
//! ## Lossless Unless It Costs Too Much
//!
//! Every rendered image is encoded twice, as PNG and as JPEG at quality 90. PNG
//! wins unless it is at least twice the size of the JPEG. This keeps icons and
//! screenshots crisp while photos stay small, without inspecting the content.
//! Both numbers are configurable, see [`imaging::EncodePolicy`].

pub mod cache;
pub mod config;
pub mod controller;
pub mod guard;
pub mod imaging;
pub mod request;
pub mod response;
pub mod transport;

pub use controller::{CacheOutcome, DownloadHandle, ImageRequest, Phase, Pipeline, RequestError};
pub use request::{DEFAULT_PRIORITY, RequestDescriptor, TaskId, TransformParams};
pub use response::Response;

#[cfg(test)]
pub(crate) mod test_helpers;
