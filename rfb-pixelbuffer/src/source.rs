//! Per-render-pass framebuffer factory.

use crate::host::HostSurface;
use crate::{FramebufferReference, PixelBufferError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Produces a fresh [`FramebufferReference`] over a host surface for every
/// render pass.
///
/// Only one reference per surface should be live at a time. That is a
/// cooperative rule: the source counts live references and warns when it is
/// broken, but leaves the host's own lock to refuse a second lock.
pub struct FramebufferSource<S: ?Sized> {
    surface: Arc<S>,
    live: Arc<AtomicUsize>,
}

impl<S: ?Sized> Clone for FramebufferSource<S> {
    fn clone(&self) -> Self {
        Self {
            surface: Arc::clone(&self.surface),
            live: Arc::clone(&self.live),
        }
    }
}

impl<S: HostSurface + ?Sized + 'static> FramebufferSource<S> {
    /// Create a source over `surface`.
    pub fn new(surface: Arc<S>) -> Self {
        Self {
            surface,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The wrapped host surface.
    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    /// Number of references handed out and not yet released.
    pub fn live_references(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Lock the host surface and wrap the lock for one render pass.
    ///
    /// Disposing the returned reference unlocks the surface and asks it to
    /// redraw the covered region.
    pub fn acquire(&self) -> Result<FramebufferReference, PixelBufferError> {
        let outstanding = self.live.load(Ordering::SeqCst);
        if outstanding > 0 {
            warn!(
                "acquiring a framebuffer while {} reference(s) are still live",
                outstanding
            );
        }

        let buffer = self.surface.lock()?;
        self.live.fetch_add(1, Ordering::SeqCst);

        let surface = Arc::clone(&self.surface);
        let live = Arc::clone(&self.live);
        let reference = FramebufferReference::new(buffer, move |region| {
            live.fetch_sub(1, Ordering::SeqCst);
            surface.invalidate(region);
        });
        trace!("{} acquired", reference.name());
        Ok(reference)
    }

    /// Run one render pass: acquire, hand the reference to `paint`, dispose.
    ///
    /// The reference is released whether `paint` returns `Ok`, returns `Err`
    /// or panics.
    pub fn render_pass<T, E>(
        &self,
        paint: impl FnOnce(&FramebufferReference) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<PixelBufferError>,
    {
        let reference = self.acquire()?;
        let result = paint(&reference);
        reference.dispose();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostPixelFormat, MemorySurface};
    use rfb_common::{Rect, Size};

    fn source() -> (FramebufferSource<MemorySurface>, MemorySurface) {
        let surface = MemorySurface::new(8, 4, HostPixelFormat::Bgra8888);
        (FramebufferSource::new(Arc::new(surface.clone())), surface)
    }

    #[test]
    fn test_render_pass_releases_and_invalidates() {
        let (source, surface) = source();
        let size = source.render_pass(|fb| fb.size()).unwrap();
        assert_eq!(size, Size::new(8, 4));
        assert_eq!(source.live_references(), 0);
        assert_eq!(surface.unlock_count(), 1);
        assert_eq!(surface.invalidated(), vec![Rect::new(0, 0, 8, 4)]);
    }

    #[test]
    fn test_render_pass_releases_on_error() {
        let (source, surface) = source();
        let result: Result<(), PixelBufferError> =
            source.render_pass(|_| Err(PixelBufferError::Lock("boom".into())));
        assert!(result.is_err());
        assert!(!surface.is_locked());
        assert_eq!(surface.invalidated().len(), 1);
    }

    #[test]
    fn test_render_pass_releases_on_panic() {
        let (source, surface) = source();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), PixelBufferError> = source.render_pass(|_| panic!("decoder bug"));
        }));
        assert!(outcome.is_err());
        assert!(!surface.is_locked());
        assert_eq!(source.live_references(), 0);
    }

    #[test]
    fn test_second_reference_fails_safely() {
        let (source, _surface) = source();
        let first = source.acquire().unwrap();
        assert_eq!(source.live_references(), 1);

        // The host refuses a second lock instead of aliasing memory.
        assert!(matches!(source.acquire(), Err(PixelBufferError::Lock(_))));

        first.dispose();
        assert_eq!(source.live_references(), 0);
        let second = source.acquire().unwrap();
        assert!(first.size().is_err());
        assert!(second.size().is_ok());
    }

    #[test]
    fn test_lock_failure_propagates() {
        let (source, surface) = source();
        let _held = surface.lock().unwrap();
        let err = source.render_pass(|fb| fb.size()).unwrap_err();
        assert!(matches!(err, PixelBufferError::Lock(_)));
        assert_eq!(source.live_references(), 0);
    }
}
