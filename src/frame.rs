use crate::types::{MediaTime, PixelFormat, Size};

/// A decoded, uncompressed frame in CPU/GPU-shared memory.
///
/// The seam between a frame source and a texture cache: the cache reads
/// format and geometry through this trait to validate a conversion before
/// touching the backing memory.
pub trait ImageBuffer {
    fn pixel_format(&self) -> PixelFormat;

    /// Full-buffer geometry. For planar buffers this is the geometry of
    /// the whole image, not of any single plane.
    fn size(&self) -> Size;

    /// Number of planes; `0` for packed (non-planar) buffers.
    fn plane_count(&self) -> usize;

    /// Geometry of one plane, or `None` when the index is out of bounds
    /// or the buffer is packed.
    fn plane_size(&self, plane: usize) -> Option<Size>;
}

/// An image buffer paired with its presentation timestamp.
#[derive(Debug, Clone, Copy)]
pub struct TimedBuffer<B> {
    pub buffer: B,
    pub timestamp: MediaTime,
}
