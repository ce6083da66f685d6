//! Shared test utilities for the image-loader test suite.
//!
//! Provides recording mocks for every collaborator the controller talks to,
//! plus image fixtures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let cache = Arc::new(MockCache::new());
//! let direct = Arc::new(MockDirect::with("local:img1", png_bytes(8, 8)));
//! let responses = ResponseLog::new();
//!
//! // ... build an ImageRequest with responses.callback() and run it ...
//!
//! assert_eq!(responses.all().len(), 1);
//! assert!(matches!(cache.ops()[0], CacheOp::Load(_, 1000)));
//! ```

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::sync::{Notify, oneshot};

use crate::cache::{CacheError, CacheKey, ImageCache, is_fresh};
use crate::imaging::{LanczosResizer, ResizeError, Resizer, Surface};
use crate::request::TransformParams;
use crate::response::Response;
use crate::transport::{
    DirectLoader, FetchError, HttpFetcher, HttpResponse, RawImage, ResponseBody,
};

// =========================================================================
// Cache
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    Load(CacheKey, i64),
    Save(CacheKey, String, i64),
    Remove(CacheKey),
}

/// In-memory cache that records every call. Uses the same freshness rule as
/// the real stores but never evicts.
///
/// A gated cache records each `load` and then holds it until
/// [`open_gate`](MockCache::open_gate); never opening it leaves the lookup
/// pending forever.
#[derive(Default)]
pub struct MockCache {
    entries: Mutex<HashMap<CacheKey, (String, i64)>>,
    operations: Mutex<Vec<CacheOp>>,
    failing: bool,
    gated: bool,
    gate: Notify,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose every call fails with an IO error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    /// Let one held `load` answer.
    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub fn with_entry(self, key: &CacheKey, data: &str, timestamp: i64) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.clone(), (data.to_string(), timestamp));
        self
    }

    pub fn ops(&self) -> Vec<CacheOp> {
        self.operations.lock().unwrap().clone()
    }

    fn record(&self, op: CacheOp) -> Result<(), CacheError> {
        self.operations.lock().unwrap().push(op);
        if self.failing {
            return Err(CacheError::Io(std::io::Error::other("mock cache failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageCache for MockCache {
    async fn load(&self, key: &CacheKey, timestamp: i64) -> Result<Option<String>, CacheError> {
        self.record(CacheOp::Load(key.clone(), timestamp))?;
        if self.gated {
            self.gate.notified().await;
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|(_, stored)| is_fresh(*stored, timestamp))
            .map(|(data, _)| data.clone()))
    }

    async fn save(&self, key: &CacheKey, data: &str, timestamp: i64) -> Result<(), CacheError> {
        self.record(CacheOp::Save(key.clone(), data.to_string(), timestamp))?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.clone(), (data.to_string(), timestamp));
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.record(CacheOp::Remove(key.clone()))?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// =========================================================================
// Transport
// =========================================================================

/// Direct loader serving fixed bytes per locator. Unknown locators fail
/// with `NotFound`.
#[derive(Default)]
pub struct MockDirect {
    files: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl MockDirect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(locator: &str, bytes: Vec<u8>) -> Self {
        let mut mock = Self::default();
        mock.files.insert(locator.to_string(), bytes);
        mock
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectLoader for MockDirect {
    async fn load(&self, locator: &str) -> Result<RawImage, FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        match self.files.get(locator) {
            Some(bytes) => Ok(RawImage {
                bytes: bytes.clone(),
                content_type: None,
            }),
            None => Err(FetchError::Load {
                locator: locator.to_string(),
                source: std::io::ErrorKind::NotFound.into(),
            }),
        }
    }
}

/// Direct loader that panics on every load.
pub struct PanickingDirect;

#[async_trait]
impl DirectLoader for PanickingDirect {
    async fn load(&self, locator: &str) -> Result<RawImage, FetchError> {
        panic!("loader blew up on {locator}");
    }
}

enum Scripted {
    Ok {
        content_type: String,
        bytes: Vec<u8>,
    },
    Status(u16),
    BrokenBody,
}

struct StaticBody(Vec<u8>);

#[async_trait]
impl ResponseBody for StaticBody {
    async fn bytes(self: Box<Self>) -> Result<Vec<u8>, FetchError> {
        Ok(self.0)
    }
}

struct BrokenBody;

#[async_trait]
impl ResponseBody for BrokenBody {
    async fn bytes(self: Box<Self>) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Conversion("connection reset mid-body".into()))
    }
}

/// HTTP fetcher with scripted responses per URL. Unknown URLs fail with a
/// transport error; a hanging fetcher never answers at all.
#[derive(Default)]
pub struct MockHttp {
    responses: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
    hang: bool,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ok(url: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self::scripted(
            url,
            Scripted::Ok {
                content_type: content_type.to_string(),
                bytes,
            },
        )
    }

    pub fn with_status(url: &str, status: u16) -> Self {
        Self::scripted(url, Scripted::Status(status))
    }

    pub fn with_broken_body(url: &str) -> Self {
        Self::scripted(url, Scripted::BrokenBody)
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn scripted(url: &str, response: Scripted) -> Self {
        let mut mock = Self::default();
        mock.responses.insert(url.to_string(), response);
        mock
    }
}

#[async_trait]
impl HttpFetcher for MockHttp {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        match self.responses.get(url) {
            Some(Scripted::Ok {
                content_type,
                bytes,
            }) => Ok(HttpResponse {
                status: 200,
                content_type: Some(content_type.clone()),
                body: Box::new(StaticBody(bytes.clone())),
            }),
            Some(Scripted::Status(status)) => Ok(HttpResponse {
                status: *status,
                content_type: None,
                body: Box::new(StaticBody(Vec::new())),
            }),
            Some(Scripted::BrokenBody) => Ok(HttpResponse {
                status: 200,
                content_type: Some("image/png".into()),
                body: Box::new(BrokenBody),
            }),
            None => Err(FetchError::Transport(format!("no route to {url}"))),
        }
    }
}

// =========================================================================
// Imaging
// =========================================================================

pub struct FailingResizer;

impl Resizer for FailingResizer {
    fn resize(
        &self,
        _source: &DynamicImage,
        _target: &mut Surface,
        _params: &TransformParams,
    ) -> Result<(), ResizeError> {
        Err(ResizeError::Failed("mock resizer failure".into()))
    }
}

/// Resizer that signals when it starts and then blocks its thread until
/// released, so a request can be observed mid-render.
pub struct GatedResizer {
    entered: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl GatedResizer {
    /// Returns the resizer, a receiver that fires once resizing starts and
    /// the sender that lets it finish.
    pub fn new() -> (Self, oneshot::Receiver<()>, std::sync::mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let resizer = Self {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        (resizer, entered_rx, release_tx)
    }
}

impl Resizer for GatedResizer {
    fn resize(
        &self,
        source: &DynamicImage,
        target: &mut Surface,
        params: &TransformParams,
    ) -> Result<(), ResizeError> {
        if let Some(entered) = self.entered.lock().unwrap().take() {
            let _ = entered.send(());
        }
        let _ = self.release.lock().unwrap().recv();
        LanczosResizer::new().resize(source, target, params)
    }
}

/// A PNG-encoded gradient of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 96, 255])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// A single-color surface: compresses extremely well losslessly.
pub fn flat_surface(width: u32, height: u32) -> Surface {
    let mut surface = Surface::new();
    surface.draw(RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255])));
    surface
}

/// A surface of deterministic pseudo-random noise.
pub fn noisy_surface(width: u32, height: u32) -> Surface {
    let mut state: u32 = 0x9e37_79b9;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };
    let mut surface = Surface::new();
    surface.draw(RgbaImage::from_fn(width, height, |_, _| {
        let v = next().to_le_bytes();
        Rgba([v[0], v[1], v[2], 255])
    }));
    surface
}

// =========================================================================
// Callbacks
// =========================================================================

/// Collects responses delivered through the callback it hands out.
#[derive(Clone, Default)]
pub struct ResponseLog {
    responses: Arc<Mutex<Vec<Response>>>,
}

impl ResponseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl FnOnce(Response) + Send + 'static {
        let responses = Arc::clone(&self.responses);
        move |response| responses.lock().unwrap().push(response)
    }

    pub fn all(&self) -> Vec<Response> {
        self.responses.lock().unwrap().clone()
    }
}

/// Counts completion hook invocations.
#[derive(Clone, Default)]
pub struct HookCounter {
    count: Arc<AtomicUsize>,
}

impl HookCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
