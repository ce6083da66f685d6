//! Resource release on every terminal path.
//!
//! A request in flight owns two kinds of resources: the transport operation
//! fetching its bytes, and the render job decoding, resizing and encoding
//! them. [`ResourceGuard`] holds the handles to both while the request is
//! active and tears them down exactly once, whether the request ends in
//! success, error or cancellation.
//!
//! | Resource | Attached | Released by |
//! |---|---|---|
//! | [`TransportHandle`] | when the fetch starts | token cancelled, in-flight fetch dropped |
//! | render job [`AbortHandle`] | when the job is spawned | abort (effective only before the job starts running) |
//! | [`Surface`] | inside the render job | [`SurfaceGuard`] on scope exit |
//!
//! A render job that is already running cannot be interrupted from outside.
//! It checks the request phase between stages and stops on its own; its
//! result, if any, is discarded by the controller.

use crate::imaging::Surface;
use crate::transport::TransportHandle;
use std::ops::{Deref, DerefMut};
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ResourceGuard {
    transport: Option<TransportHandle>,
    render: Option<AbortHandle>,
    released: bool,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the in-flight fetch. Attaching to a released guard aborts the
    /// handle on the spot.
    pub fn attach_transport(&mut self, handle: TransportHandle) {
        if self.released {
            handle.abort();
            return;
        }
        self.transport = Some(handle);
    }

    /// Stop tracking the fetch once it has produced its result.
    pub fn detach_transport(&mut self) -> Option<TransportHandle> {
        self.transport.take()
    }

    /// Track the render job. Attaching to a released guard aborts the job.
    pub fn attach_render(&mut self, handle: AbortHandle) {
        if self.released {
            handle.abort();
            return;
        }
        self.render = Some(handle);
    }

    pub fn detach_render(&mut self) -> Option<AbortHandle> {
        self.render.take()
    }

    pub fn has_attachments(&self) -> bool {
        self.transport.is_some() || self.render.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Abort and drop everything attached. Returns `false` if the guard had
    /// already been released, in which case nothing happens.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        if let Some(transport) = self.transport.take() {
            debug!("Aborting in-flight fetch");
            transport.abort();
        }
        if let Some(render) = self.render.take() {
            debug!("Aborting pending render job");
            render.abort();
        }
        true
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scoped release of a render surface: the surface is emptied when the guard
/// goes out of scope, on success and on early return alike.
pub struct SurfaceGuard<'a> {
    surface: &'a mut Surface,
}

impl<'a> SurfaceGuard<'a> {
    pub fn new(surface: &'a mut Surface) -> Self {
        Self { surface }
    }
}

impl Deref for SurfaceGuard<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        self.surface
    }
}

impl DerefMut for SurfaceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Surface {
        self.surface
    }
}

impl Drop for SurfaceGuard<'_> {
    fn drop(&mut self) {
        self.surface.release();
    }
}
