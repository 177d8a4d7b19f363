//! Single-use access to one locked host framebuffer.
//!
//! A [`FramebufferReference`] wraps the [`LockedBuffer`] the host toolkit
//! hands over for one render pass. The protocol engine reads the geometry and
//! writes pixels through it; when the pass ends the reference is disposed,
//! which unlocks the host buffer and schedules a redraw.
//!
//! # Release Discipline
//!
//! The render thread and the UI thread may both try to end a reference's life
//! (end of frame versus forced disconnect). Disposal swaps the held lock out
//! under a mutex, so exactly one caller observes the lock and performs the
//! release; every other caller sees an empty slot and returns without effect.
//! Once released, every accessor fails with
//! [`PixelBufferError::ObjectDisposed`].
//!
//! Geometry is captured when the reference is created and read without the
//! mutex, so accessors may be called from inside
//! [`with_pixels`](FramebufferReference::with_pixels).
//!
//! Dropping a reference disposes it, so the host lock is returned on every
//! exit path, including an error or panic in the middle of a render pass.
//!
//! # Example
//!
//! ```
//! use rfb_common::{Rect, Size};
//! use rfb_pixelbuffer::{FramebufferReference, HostPixelFormat, HostSurface, MemorySurface};
//!
//! let surface = MemorySurface::new(800, 600, HostPixelFormat::Bgra8888);
//! let lock = surface.lock().unwrap();
//! let fb = FramebufferReference::new(lock, |_region: Rect| {});
//!
//! assert_eq!(fb.size().unwrap(), Size::new(800, 600));
//! assert_eq!(fb.row_bytes().unwrap(), 3200);
//!
//! fb.dispose();
//! assert!(fb.size().is_err());
//! ```

use crate::convert;
use crate::host::{Dpi, HostPixelFormat, HostSize, LockedBuffer};
use crate::{PixelBufferError, PixelFormat};
use parking_lot::Mutex;
use rfb_common::{Rect, Size};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

type InvalidateFn = Box<dyn FnOnce(Rect) + Send>;

/// The lock and the redraw hook, released together.
struct Held {
    buffer: Box<dyn LockedBuffer>,
    invalidate: InvalidateFn,
}

/// Layout of the locked buffer; fixed for the lifetime of the lock.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    address: usize,
    size: HostSize,
    row_bytes: usize,
    format: HostPixelFormat,
    dpi: Dpi,
}

/// A lifetime-guarded view over one locked host pixel buffer.
pub struct FramebufferReference {
    id: u64,
    geometry: Geometry,
    released: AtomicBool,
    held: Mutex<Option<Held>>,
}

impl FramebufferReference {
    /// Wrap an already-locked host buffer.
    ///
    /// `invalidate` is called exactly once, after the buffer has been
    /// unlocked, with the region covered by the buffer.
    pub fn new<F>(buffer: Box<dyn LockedBuffer>, invalidate: F) -> Self
    where
        F: FnOnce(Rect) + Send + 'static,
    {
        let geometry = Geometry {
            address: buffer.address() as usize,
            size: buffer.size(),
            row_bytes: buffer.row_bytes(),
            format: buffer.format(),
            dpi: buffer.dpi(),
        };
        Self {
            id: NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed),
            geometry,
            released: AtomicBool::new(false),
            held: Mutex::new(Some(Held {
                buffer,
                invalidate: Box::new(invalidate),
            })),
        }
    }

    /// Name used in diagnostics and in [`PixelBufferError::ObjectDisposed`].
    pub fn name(&self) -> String {
        format!("FramebufferReference#{}", self.id)
    }

    /// Address of the first pixel.
    pub fn address(&self) -> Result<*mut u8, PixelBufferError> {
        self.geometry().map(|g| g.address as *mut u8)
    }

    /// Framebuffer dimensions in protocol terms.
    pub fn size(&self) -> Result<Size, PixelBufferError> {
        self.geometry().map(|g| convert::size_to_protocol(g.size))
    }

    /// Length of one row in bytes.
    pub fn row_bytes(&self) -> Result<usize, PixelBufferError> {
        self.geometry().map(|g| g.row_bytes)
    }

    /// Pixel format in protocol terms.
    ///
    /// Fails with [`PixelBufferError::UnsupportedPixelFormat`] if the host
    /// buffer uses a layout the engine cannot render into.
    pub fn format(&self) -> Result<PixelFormat, PixelBufferError> {
        convert::format_to_protocol(self.geometry()?.format)
    }

    /// Horizontal and vertical resolution.
    pub fn dpi(&self) -> Result<Dpi, PixelBufferError> {
        self.geometry().map(|g| g.dpi)
    }

    /// Run `f` over the locked pixel memory.
    ///
    /// The reference cannot be released while `f` runs; a concurrent
    /// [`dispose`](Self::dispose) waits for it. The geometry accessors are
    /// usable inside `f`, but disposing this reference from inside `f`
    /// deadlocks.
    pub fn with_pixels<T>(&self, f: impl FnOnce(&mut [u8]) -> T) -> Result<T, PixelBufferError> {
        let mut slot = self.held.lock();
        match slot.as_mut() {
            Some(held) => Ok(f(held.buffer.pixels_mut())),
            None => Err(self.disposed()),
        }
    }

    /// True once the reference has been disposed.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Unlock the host buffer and schedule a redraw.
    ///
    /// Safe to call from any thread and any number of times; only the first
    /// call has an effect. Returns `true` for the call that performed the
    /// release.
    pub fn dispose(&self) -> bool {
        let Some(held) = self.take_held() else {
            return false;
        };

        let region = Rect::from_size(convert::size_to_protocol(held.buffer.size()));
        held.buffer.unlock();
        (held.invalidate)(region);
        tracing::trace!("{} released", self.name());
        true
    }

    fn take_held(&self) -> Option<Held> {
        let mut slot = self.held.lock();
        let held = slot.take()?;
        self.released.store(true, Ordering::Release);
        Some(held)
    }

    fn geometry(&self) -> Result<Geometry, PixelBufferError> {
        if self.is_released() {
            Err(self.disposed())
        } else {
            Ok(self.geometry)
        }
    }

    fn disposed(&self) -> PixelBufferError {
        PixelBufferError::ObjectDisposed { name: self.name() }
    }
}

impl Drop for FramebufferReference {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for FramebufferReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferReference")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct FakeLock {
        data: Vec<u8>,
        size: HostSize,
        row_bytes: usize,
        format: HostPixelFormat,
        unlocks: Arc<AtomicUsize>,
    }

    impl LockedBuffer for FakeLock {
        fn address(&self) -> *mut u8 {
            self.data.as_ptr().cast_mut()
        }
        fn size(&self) -> HostSize {
            self.size
        }
        fn row_bytes(&self) -> usize {
            self.row_bytes
        }
        fn format(&self) -> HostPixelFormat {
            self.format
        }
        fn dpi(&self) -> Dpi {
            Dpi::new(144.0, 120.0)
        }
        fn pixels_mut(&mut self) -> &mut [u8] {
            &mut self.data
        }
        fn unlock(self: Box<Self>) {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Counters {
        unlocks: Arc<AtomicUsize>,
        invalidations: Arc<AtomicUsize>,
    }

    fn reference(
        width: u32,
        height: u32,
        row_bytes: usize,
        format: HostPixelFormat,
    ) -> (FramebufferReference, Counters) {
        let unlocks = Arc::new(AtomicUsize::new(0));
        let invalidations = Arc::new(AtomicUsize::new(0));
        let lock = FakeLock {
            data: vec![0; row_bytes * height as usize],
            size: HostSize::new(width, height),
            row_bytes,
            format,
            unlocks: Arc::clone(&unlocks),
        };
        let hits = Arc::clone(&invalidations);
        let fb = FramebufferReference::new(Box::new(lock), move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (
            fb,
            Counters {
                unlocks,
                invalidations,
            },
        )
    }

    #[test]
    fn test_accessors_reflect_wrapped_buffer() {
        let (fb, _) = reference(800, 600, 3200, HostPixelFormat::Bgra8888);
        assert_eq!(fb.size().unwrap(), Size::new(800, 600));
        assert_eq!(fb.row_bytes().unwrap(), 3200);
        assert_eq!(fb.format().unwrap(), PixelFormat::bgra8888());
        assert_eq!(fb.dpi().unwrap(), Dpi::new(144.0, 120.0));
        assert!(!fb.address().unwrap().is_null());
        assert_eq!(fb.with_pixels(|px| px.len()).unwrap(), 3200 * 600);
    }

    #[test]
    fn test_accessors_fail_after_dispose() {
        let (fb, _) = reference(4, 4, 16, HostPixelFormat::Rgba8888);
        assert!(fb.dispose());

        let expected = PixelBufferError::ObjectDisposed { name: fb.name() };
        assert_eq!(fb.address().unwrap_err(), expected);
        assert_eq!(fb.size().unwrap_err(), expected);
        assert_eq!(fb.row_bytes().unwrap_err(), expected);
        assert_eq!(fb.format().unwrap_err(), expected);
        assert_eq!(fb.dpi().unwrap_err(), expected);
        assert_eq!(fb.with_pixels(|_| ()).unwrap_err(), expected);
        assert!(fb.is_released());
    }

    #[test]
    fn test_accessors_inside_with_pixels() {
        let (fb, _) = reference(8, 4, 40, HostPixelFormat::Bgra8888);
        let fb = Arc::new(fb);
        let worker = Arc::clone(&fb);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let seen = worker.with_pixels(|px| {
                let stride = worker.row_bytes().unwrap();
                px[stride..stride + 4].fill(0xAB);
                (px.len(), stride, worker.size().unwrap(), worker.format().unwrap())
            });
            let _ = tx.send(seen);
        });

        let seen = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("accessor inside with_pixels blocked")
            .unwrap();
        assert_eq!(seen, (160, 40, Size::new(8, 4), PixelFormat::bgra8888()));
        assert!(!fb.is_released());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (fb, counters) = reference(4, 4, 16, HostPixelFormat::Rgb565);
        assert!(fb.dispose());
        assert!(!fb.dispose());
        assert!(!fb.dispose());
        drop(fb);
        assert_eq!(counters.unlocks.load(Ordering::SeqCst), 1);
        assert_eq!(counters.invalidations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_dispose_releases_once() {
        let (fb, counters) = reference(64, 64, 256, HostPixelFormat::Bgra8888);
        let fb = Arc::new(fb);

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let fb = Arc::clone(&fb);
                    scope.spawn(move || usize::from(fb.dispose()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
        assert_eq!(counters.unlocks.load(Ordering::SeqCst), 1);
        assert_eq!(counters.invalidations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_lock() {
        let (fb, counters) = reference(2, 2, 8, HostPixelFormat::Rgba8888);
        drop(fb);
        assert_eq!(counters.unlocks.load(Ordering::SeqCst), 1);
        assert_eq!(counters.invalidations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_format_is_reported() {
        let (fb, _) = reference(2, 2, 6, HostPixelFormat::Rgb888);
        assert_eq!(
            fb.format().unwrap_err(),
            PixelBufferError::UnsupportedPixelFormat(HostPixelFormat::Rgb888)
        );
        // Other accessors still work; only the format is out of range.
        assert_eq!(fb.size().unwrap(), Size::new(2, 2));
    }

    #[test]
    fn test_invalidated_region_covers_buffer() {
        let unlocks = Arc::new(AtomicUsize::new(0));
        let lock = FakeLock {
            data: vec![0; 40 * 10],
            size: HostSize::new(10, 10),
            row_bytes: 40,
            format: HostPixelFormat::Bgra8888,
            unlocks,
        };
        let region = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&region);
        let fb = FramebufferReference::new(Box::new(lock), move |r| {
            *seen.lock() = Some(r);
        });
        fb.dispose();
        assert_eq!(*region.lock(), Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn test_names_are_unique() {
        let (a, _) = reference(1, 1, 4, HostPixelFormat::Rgba8888);
        let (b, _) = reference(1, 1, 4, HostPixelFormat::Rgba8888);
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with("FramebufferReference#"));
    }
}
