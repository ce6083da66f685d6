//! Request lifecycle controller.
//!
//! An [`ImageRequest`] is created per incoming request and driven by the
//! scheduler through three entry points:
//!
//! 1. [`load_from_cache_and_process`](ImageRequest::load_from_cache_and_process)
//!    tries the persistent cache. A hit delivers the response and ends the
//!    request; anything else leaves it idle for the scheduler to download.
//! 2. [`download_and_process`](ImageRequest::download_and_process) spawns the
//!    one task that owns fetch, decode, resize, encode, delivery and
//!    write-through, then runs the scheduler's completion hook.
//! 3. [`cancel`](ImageRequest::cancel) ends the request from outside, at any
//!    time, without waiting for anything in flight.
//!
//! ## Phases
//!
//! ```text
//! Idle ─▶ CacheLookup ─hit─▶ Delivered
//!   ▲          │
//!   └──miss────┘
//! Idle ─▶ Fetching ─▶ Decoding ─▶ Resizing ─▶ Encoding ─▶ Delivered
//! (any non-terminal) ─cancel─▶ Cancelled
//! ```
//!
//! `Delivered` and `Cancelled` are terminal. The state lives behind a
//! `std::sync::Mutex` that is only held for short, non-async sections; the
//! response callback and the completion hook always run after the lock is
//! released.
//!
//! ## Single-fire guarantees
//!
//! - The response callback runs at most once, and never after `cancel()`.
//! - The completion hook runs exactly once per `download_and_process`, after
//!   the response and the cache write-through.
//! - The [`ResourceGuard`] is released on the first terminal transition and
//!   again (as a no-op) when the request is dropped.
//!
//! A panic in a collaborator (loader, fetcher, resizer, cache) or in the
//! response callback is caught on the download task. It becomes an error
//! response where one is still owed, and the completion hook still runs.

use crate::cache::{CacheKey, ImageCache};
use crate::guard::{ResourceGuard, SurfaceGuard};
use crate::imaging::{self, EncodeError, EncodedImage, Encoder, ResizeError, Resizer, Surface};
use crate::request::{CacheUnavailable, RequestDescriptor, TaskId};
use crate::response::Response;
use crate::transport::{FetchError, RawImage, TransportHandle, TransportSelector};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type ResponseCallback = Box<dyn FnOnce(Response) + Send>;
type CompletionHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CacheLookup,
    Fetching,
    Decoding,
    Resizing,
    Encoding,
    Delivered,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Delivered | Phase::Cancelled)
    }
}

/// Misuse of the controller API.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("download already started for this request")]
    AlreadyStarted,
    #[error("a terminal response was already delivered")]
    AlreadyDelivered,
}

/// Why the download pipeline produced no image. Logged, then collapsed into
/// [`Response::Error`].
#[derive(Error, Debug)]
pub(crate) enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Resize(#[from] ResizeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("render job failed: {0}")]
    RenderJob(String),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The cached image was delivered; the request is finished.
    Hit,
    /// Nothing usable in the cache; the request is idle again.
    Miss,
    /// The request was cancelled before or during the lookup.
    Cancelled,
}

/// Collaborators that turn a locator into an encoded image.
///
/// Shared by every request a loader creates.
pub struct Pipeline {
    pub transport: TransportSelector,
    pub resizer: Arc<dyn Resizer>,
    pub encoder: Encoder,
}

impl Pipeline {
    pub fn new(transport: TransportSelector, resizer: Arc<dyn Resizer>, encoder: Encoder) -> Self {
        Self {
            transport,
            resizer,
            encoder,
        }
    }
}

/// Handle on the task spawned by [`ImageRequest::download_and_process`].
#[derive(Debug)]
pub struct DownloadHandle {
    task: Option<JoinHandle<()>>,
}

impl DownloadHandle {
    /// Whether the task has run to completion. Always true when nothing was
    /// started.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task, including delivery, write-through and the
    /// completion hook.
    pub async fn wait(self) {
        if let Some(task) = self.task
            && let Err(err) = task.await
        {
            error!("Download task failed: {}", err);
        }
    }
}

struct RequestState {
    phase: Phase,
    respond: Option<ResponseCallback>,
    on_complete: Option<CompletionHook>,
    download_started: bool,
    guard: ResourceGuard,
}

struct Shared {
    descriptor: RequestDescriptor,
    key: CacheKey,
    cache: Arc<dyn ImageCache>,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
    state: Mutex<RequestState>,
}

/// One image request. Clones share the same state.
#[derive(Clone)]
pub struct ImageRequest {
    shared: Arc<Shared>,
}

impl ImageRequest {
    pub fn new(
        descriptor: RequestDescriptor,
        cache: Arc<dyn ImageCache>,
        pipeline: Arc<Pipeline>,
        respond: impl FnOnce(Response) + Send + 'static,
    ) -> Self {
        let key = CacheKey::derive(&descriptor);
        Self {
            shared: Arc::new(Shared {
                descriptor,
                key,
                cache,
                pipeline,
                cancel: CancellationToken::new(),
                state: Mutex::new(RequestState {
                    phase: Phase::Idle,
                    respond: Some(Box::new(respond)),
                    on_complete: None,
                    download_started: false,
                    guard: ResourceGuard::new(),
                }),
            }),
        }
    }

    /// Scheduling priority; lower is more urgent.
    pub fn priority(&self) -> i32 {
        self.shared.descriptor.priority()
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.shared.descriptor
    }

    pub fn task_id(&self) -> &TaskId {
        &self.shared.descriptor.task_id
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.shared.key
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Try to satisfy the request from the cache.
    ///
    /// With caching disabled the entry for this key is removed and the
    /// lookup misses. Without a timestamp the cache is not touched at all.
    /// Cache failures are logged and count as a miss.
    pub async fn load_from_cache_and_process(&self) -> CacheOutcome {
        {
            let mut state = self.lock();
            let phase = state.phase;
            match phase {
                Phase::Idle => state.phase = Phase::CacheLookup,
                Phase::Cancelled => return CacheOutcome::Cancelled,
                phase => {
                    debug!("Request {} is {:?}, skipping cache lookup", self.task_id(), phase);
                    return CacheOutcome::Miss;
                }
            }
        }

        let shared = &self.shared;
        let cached = match shared.descriptor.cache_access() {
            Err(CacheUnavailable::Disabled) => {
                debug!("Caching disabled for {}, removing {}", self.task_id(), shared.key);
                match self.unless_cancelled(shared.cache.remove(&shared.key)).await {
                    None => return CacheOutcome::Cancelled,
                    Some(Err(err)) => warn!("Failed to remove cache entry {}: {}", shared.key, err),
                    Some(Ok(())) => {}
                }
                None
            }
            Err(CacheUnavailable::MissingTimestamp) => {
                debug!("Request {} has no timestamp, bypassing cache", self.task_id());
                None
            }
            Ok(timestamp) => {
                match self.unless_cancelled(shared.cache.load(&shared.key, timestamp)).await {
                    None => return CacheOutcome::Cancelled,
                    Some(Ok(hit)) => hit,
                    Some(Err(err)) => {
                        warn!("Cache lookup for {} failed: {}", shared.key, err);
                        None
                    }
                }
            }
        };

        let Some(data) = cached else {
            let mut state = self.lock();
            let phase = state.phase;
            return match phase {
                Phase::CacheLookup => {
                    debug!("Cache miss for {}", self.task_id());
                    state.phase = Phase::Idle;
                    CacheOutcome::Miss
                }
                Phase::Cancelled => CacheOutcome::Cancelled,
                _ => CacheOutcome::Miss,
            };
        };

        debug!("Cache hit for {}", self.task_id());
        let response = Response::Success {
            data,
            task_id: self.task_id().clone(),
        };
        match self.deliver(response) {
            Ok(true) => CacheOutcome::Hit,
            Ok(false) => CacheOutcome::Cancelled,
            Err(_) => CacheOutcome::Miss,
        }
    }

    /// Fetch, render and deliver the image on a spawned task, then run
    /// `on_complete`.
    ///
    /// Must be called from within a tokio runtime. On a request that is
    /// already delivered or cancelled nothing is started and `on_complete`
    /// runs before this returns.
    pub fn download_and_process(
        &self,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Result<DownloadHandle, RequestError> {
        let mut state = self.lock();
        if state.download_started {
            error!("download_and_process called twice for {}", self.task_id());
            return Err(RequestError::AlreadyStarted);
        }
        state.download_started = true;

        if state.phase.is_terminal() {
            drop(state);
            debug!("Request {} already finished, nothing to download", self.task_id());
            on_complete();
            return Ok(DownloadHandle { task: None });
        }

        debug!("Request {}: {:?} -> Fetching", self.task_id(), state.phase);
        state.phase = Phase::Fetching;
        state.on_complete = Some(Box::new(on_complete));
        let transport = TransportHandle::child_of(&self.shared.cancel);
        state.guard.attach_transport(transport.clone());
        drop(state);

        let request = self.clone();
        let task = tokio::spawn(async move { request.run_download(transport).await });
        Ok(DownloadHandle { task: Some(task) })
    }

    /// Abandon the request.
    ///
    /// Synchronous and idempotent. On a live request this releases every
    /// resource, suppresses the response and runs the completion hook if a
    /// download was started. On a finished request it does nothing.
    pub fn cancel(&self) {
        let (respond, hook) = {
            let mut state = self.lock();
            if state.phase.is_terminal() {
                debug!("Request {} already {:?}, ignoring cancel", self.task_id(), state.phase);
                return;
            }
            debug!("Request {}: {:?} -> Cancelled", self.task_id(), state.phase);
            state.phase = Phase::Cancelled;
            state.guard.release();
            (state.respond.take(), state.on_complete.take())
        };
        self.shared.cancel.cancel();
        drop(respond);
        if let Some(hook) = hook {
            hook();
        }
    }

    async fn run_download(self, transport: TransportHandle) {
        let rendered = AssertUnwindSafe(self.fetch_and_render(transport))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(LoadError::Panicked(panic_message(&*payload))));

        match rendered {
            Ok(encoded) => {
                let data = encoded.to_data_url();
                let response = Response::Success {
                    data: data.clone(),
                    task_id: self.task_id().clone(),
                };
                if let Ok(true) = self.deliver(response) {
                    self.write_through(&data).await;
                }
            }
            Err(LoadError::Cancelled) => {
                debug!("Request {} cancelled, dropping result", self.task_id());
            }
            Err(err) => {
                warn!("Request {} failed: {}", self.task_id(), err);
                let response = Response::Error {
                    task_id: self.task_id().clone(),
                };
                if let Err(err) = self.deliver(response) {
                    error!("Error response for {} not delivered: {}", self.task_id(), err);
                }
            }
        }

        let hook = self.lock().on_complete.take();
        if let Some(hook) = hook {
            hook();
        }
    }

    async fn fetch_and_render(&self, transport: TransportHandle) -> Result<EncodedImage, LoadError> {
        let shared = &self.shared;
        let fetched = shared
            .pipeline
            .transport
            .fetch_raw(&shared.descriptor.source, &transport)
            .await;
        self.lock().guard.detach_transport();
        let raw = match fetched {
            Err(FetchError::Aborted) => return Err(LoadError::Cancelled),
            other => other?,
        };
        self.enter(Phase::Decoding)?;

        let job_request = self.clone();
        let job = tokio::task::spawn_blocking(move || job_request.render(raw));
        self.lock().guard.attach_render(job.abort_handle());

        let joined = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return Err(LoadError::Cancelled),
            joined = job => joined,
        };
        self.lock().guard.detach_render();
        match joined {
            Ok(rendered) => rendered,
            Err(err) if err.is_cancelled() => Err(LoadError::Cancelled),
            Err(err) => Err(LoadError::RenderJob(err.to_string())),
        }
    }

    /// Decode, resize and encode. Runs on the blocking pool and stops at the
    /// first stage boundary after the request is cancelled.
    fn render(&self, raw: RawImage) -> Result<EncodedImage, LoadError> {
        let pipeline = &self.shared.pipeline;
        let image = imaging::decode(&raw)?;
        drop(raw);

        self.enter(Phase::Resizing)?;
        let mut target = Surface::new();
        let mut surface = SurfaceGuard::new(&mut target);
        pipeline
            .resizer
            .resize(&image, &mut surface, &self.shared.descriptor.transform)?;
        drop(image);

        self.enter(Phase::Encoding)?;
        Ok(pipeline.encoder.encode(&surface)?)
    }

    async fn write_through(&self, data: &str) {
        let shared = &self.shared;
        let timestamp = match shared.descriptor.cache_access() {
            Ok(timestamp) => timestamp,
            Err(reason) => {
                debug!("Not caching {}: {}", self.task_id(), reason);
                return;
            }
        };
        let saved = AssertUnwindSafe(shared.cache.save(&shared.key, data, timestamp))
            .catch_unwind()
            .await;
        match saved {
            Ok(Ok(())) => debug!("Cached {} at {}", shared.key, timestamp),
            Ok(Err(err)) => warn!("Failed to cache {}: {}", shared.key, err),
            Err(payload) => error!(
                "Cache save for {} panicked: {}",
                shared.key,
                panic_message(&*payload)
            ),
        }
    }

    /// Hand the terminal response to the callback.
    ///
    /// Returns `Ok(false)` when the request was cancelled and the response
    /// is dropped instead.
    fn deliver(&self, response: Response) -> Result<bool, RequestError> {
        let respond = {
            let mut state = self.lock();
            match state.phase {
                Phase::Cancelled => {
                    debug!("Request {} cancelled, response suppressed", self.task_id());
                    return Ok(false);
                }
                Phase::Delivered => {
                    error!("Request {} already delivered a response", self.task_id());
                    return Err(RequestError::AlreadyDelivered);
                }
                phase => debug!("Request {}: {:?} -> Delivered", self.task_id(), phase),
            }
            state.phase = Phase::Delivered;
            state.guard.release();
            state.respond.take()
        };
        if let Some(respond) = respond
            && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| respond(response)))
        {
            error!(
                "Response callback for {} panicked: {}",
                self.task_id(),
                panic_message(&*payload)
            );
        }
        Ok(true)
    }

    fn enter(&self, next: Phase) -> Result<(), LoadError> {
        let mut state = self.lock();
        if state.phase.is_terminal() {
            return Err(LoadError::Cancelled);
        }
        debug!("Request {}: {:?} -> {:?}", self.task_id(), state.phase, next);
        state.phase = next;
        Ok(())
    }

    async fn unless_cancelled<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
