//! In-memory host surface.
//!
//! [`MemorySurface`] plays the host toolkit's part without a window: it owns
//! a pixel buffer, hands out exclusive locks on it, and records redraw
//! requests. Headless clients render into it, and it backs the lifecycle
//! tests.
//!
//! # Memory Layout
//!
//! Rows are `row_bytes` long, which may exceed `width * bytes_per_pixel` when
//! the surface is created with padding:
//!
//! ```text
//! Total size = row_bytes * height
//! Pixel at (x, y) starts at offset: y * row_bytes + x * bytes_per_pixel
//! ```

use crate::host::{Dpi, HostPixelFormat, HostSize, HostSurface, LockedBuffer};
use crate::PixelBufferError;
use parking_lot::Mutex;
use rfb_common::Rect;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bytes one pixel occupies in a host format, if the format is known.
pub fn host_bytes_per_pixel(format: HostPixelFormat) -> Option<usize> {
    match format {
        HostPixelFormat::Rgb565 => Some(2),
        HostPixelFormat::Rgba8888 | HostPixelFormat::Bgra8888 => Some(4),
        HostPixelFormat::Rgb888 => Some(3),
        HostPixelFormat::Gray8 => Some(1),
        HostPixelFormat::Other(_) => None,
    }
}

#[derive(Debug)]
struct Shared {
    /// `None` while a lock is outstanding.
    pixels: Mutex<Option<Vec<u8>>>,
    invalidated: Mutex<Vec<Rect>>,
    locks: AtomicUsize,
    unlocks: AtomicUsize,
}

/// A host surface backed by a `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    size: HostSize,
    row_bytes: usize,
    format: HostPixelFormat,
    dpi: Dpi,
    shared: Arc<Shared>,
}

impl MemorySurface {
    /// Create a zero-filled surface with tightly packed rows.
    ///
    /// Formats with an unknown pixel size are given 4 bytes per pixel.
    pub fn new(width: u32, height: u32, format: HostPixelFormat) -> Self {
        let bpp = host_bytes_per_pixel(format).unwrap_or(4);
        Self::with_row_bytes(width, height, format, width as usize * bpp)
    }

    /// Create a zero-filled surface whose rows are `row_bytes` long.
    pub fn with_row_bytes(
        width: u32,
        height: u32,
        format: HostPixelFormat,
        row_bytes: usize,
    ) -> Self {
        Self {
            size: HostSize::new(width, height),
            row_bytes,
            format,
            dpi: Dpi::default(),
            shared: Arc::new(Shared {
                pixels: Mutex::new(Some(vec![0u8; row_bytes * height as usize])),
                invalidated: Mutex::new(Vec::new()),
                locks: AtomicUsize::new(0),
                unlocks: AtomicUsize::new(0),
            }),
        }
    }

    /// Report `dpi` from every lock.
    #[must_use]
    pub fn with_dpi(mut self, dpi: Dpi) -> Self {
        self.dpi = dpi;
        self
    }

    /// Surface dimensions.
    pub fn size(&self) -> HostSize {
        self.size
    }

    /// True while a lock is outstanding.
    pub fn is_locked(&self) -> bool {
        self.shared.pixels.lock().is_none()
    }

    /// Number of locks handed out so far.
    pub fn lock_count(&self) -> usize {
        self.shared.locks.load(Ordering::SeqCst)
    }

    /// Number of locks returned so far.
    pub fn unlock_count(&self) -> usize {
        self.shared.unlocks.load(Ordering::SeqCst)
    }

    /// Regions passed to [`HostSurface::invalidate`], oldest first.
    pub fn invalidated(&self) -> Vec<Rect> {
        self.shared.invalidated.lock().clone()
    }

    /// Copy of the current pixels, or `None` while locked.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.shared.pixels.lock().clone()
    }
}

impl HostSurface for MemorySurface {
    fn lock(&self) -> Result<Box<dyn LockedBuffer>, PixelBufferError> {
        let data = self
            .shared
            .pixels
            .lock()
            .take()
            .ok_or_else(|| PixelBufferError::Lock("surface is already locked".to_string()))?;
        self.shared.locks.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryLock {
            data,
            size: self.size,
            row_bytes: self.row_bytes,
            format: self.format,
            dpi: self.dpi,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn invalidate(&self, region: Rect) {
        self.shared.invalidated.lock().push(region);
    }
}

/// Exclusive lock on a [`MemorySurface`]; the pixels travel with it.
struct MemoryLock {
    data: Vec<u8>,
    size: HostSize,
    row_bytes: usize,
    format: HostPixelFormat,
    dpi: Dpi,
    shared: Arc<Shared>,
}

impl LockedBuffer for MemoryLock {
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
        self.dpi
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn unlock(self: Box<Self>) {
        let MemoryLock { data, shared, .. } = *self;
        *shared.pixels.lock() = Some(data);
        shared.unlocks.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let surface = MemorySurface::new(4, 4, HostPixelFormat::Bgra8888);
        let lock = surface.lock().unwrap();
        assert!(surface.is_locked());
        assert!(matches!(surface.lock(), Err(PixelBufferError::Lock(_))));

        lock.unlock();
        assert!(!surface.is_locked());
        assert!(surface.lock().is_ok());
        assert_eq!(surface.lock_count(), 2);
        assert_eq!(surface.unlock_count(), 1);
    }

    #[test]
    fn test_writes_survive_unlock() {
        let surface = MemorySurface::new(2, 1, HostPixelFormat::Rgba8888);
        let mut lock = surface.lock().unwrap();
        lock.pixels_mut()[0] = 0xAB;
        lock.unlock();
        assert_eq!(surface.snapshot().unwrap()[0], 0xAB);
    }

    #[test]
    fn test_row_padding() {
        let surface = MemorySurface::with_row_bytes(3, 2, HostPixelFormat::Rgb565, 8);
        let mut lock = surface.lock().unwrap();
        assert_eq!(lock.row_bytes(), 8);
        assert_eq!(lock.pixels_mut().len(), 16);
        lock.unlock();
    }

    #[test]
    fn test_host_bytes_per_pixel() {
        assert_eq!(host_bytes_per_pixel(HostPixelFormat::Rgb565), Some(2));
        assert_eq!(host_bytes_per_pixel(HostPixelFormat::Bgra8888), Some(4));
        assert_eq!(host_bytes_per_pixel(HostPixelFormat::Other(99)), None);
    }
}
