use crate::error::Error;
use crate::frame::ImageBuffer;
use crate::types::{PixelFormat, Size};

/// A reusable conversion context bridging image buffers to GPU textures.
///
/// Despite the name this caches no texture *results*: every
/// [`convert`](TextureCache::convert) call produces a fresh texture view.
/// What is reused is the device-bound context (and, on platforms with a
/// zero-copy bridge, the backing memory behind successive views).
///
/// A cache instance belongs to exactly one pipeline and must not be shared
/// across pipelines.
pub trait TextureCache {
    type Buffer: ImageBuffer;
    type Texture;

    /// Produce a GPU-sampleable texture view over one plane of `buffer`.
    ///
    /// The returned texture is only guaranteed valid for the duration of
    /// the observer callback it is delivered through; callers that need it
    /// longer must retain it themselves.
    fn convert(
        &mut self,
        buffer: &Self::Buffer,
        plane_index: usize,
        format: PixelFormat,
    ) -> Result<Self::Texture, Error>;
}

/// Validate a conversion request and resolve its geometry.
///
/// On planar buffers width/height come from the indexed plane, not the
/// whole buffer; a plane index past the buffer's plane count is rejected
/// rather than clamped. Packed buffers only accept plane 0 and must match
/// the requested pixel format exactly.
pub fn conversion_geometry<B: ImageBuffer>(
    buffer: &B,
    plane_index: usize,
    format: PixelFormat,
) -> Result<Size, Error> {
    let plane_count = buffer.plane_count();
    if plane_count == 0 {
        if plane_index != 0 {
            return Err(Error::PlaneOutOfBounds {
                plane: plane_index,
                plane_count,
            });
        }
        let actual = buffer.pixel_format();
        if actual != format {
            return Err(Error::FormatMismatch {
                requested: format,
                actual,
            });
        }
        return Ok(buffer.size());
    }
    buffer
        .plane_size(plane_index)
        .ok_or(Error::PlaneOutOfBounds {
            plane: plane_index,
            plane_count,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBuffer {
        format: PixelFormat,
        planes: usize,
    }

    impl ImageBuffer for FakeBuffer {
        fn pixel_format(&self) -> PixelFormat {
            self.format
        }

        fn size(&self) -> Size {
            Size {
                width: 64,
                height: 48,
            }
        }

        fn plane_count(&self) -> usize {
            self.planes
        }

        fn plane_size(&self, plane: usize) -> Option<Size> {
            (plane < self.planes).then(|| Size {
                width: 64 >> plane,
                height: 48 >> plane,
            })
        }
    }

    #[test]
    fn packed_buffer_uses_full_geometry() {
        let buf = FakeBuffer {
            format: PixelFormat::Bgra32,
            planes: 0,
        };
        let size = conversion_geometry(&buf, 0, PixelFormat::Bgra32).unwrap();
        assert_eq!(
            size,
            Size {
                width: 64,
                height: 48
            }
        );
    }

    #[test]
    fn packed_buffer_rejects_format_mismatch() {
        let buf = FakeBuffer {
            format: PixelFormat::Nv12,
            planes: 0,
        };
        assert!(matches!(
            conversion_geometry(&buf, 0, PixelFormat::Bgra32),
            Err(Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn planar_buffer_uses_plane_geometry() {
        let buf = FakeBuffer {
            format: PixelFormat::Nv12,
            planes: 2,
        };
        let size = conversion_geometry(&buf, 1, PixelFormat::Nv12).unwrap();
        assert_eq!(
            size,
            Size {
                width: 32,
                height: 24
            }
        );
    }

    #[test]
    fn plane_index_out_of_bounds_is_rejected() {
        let packed = FakeBuffer {
            format: PixelFormat::Bgra32,
            planes: 0,
        };
        assert!(matches!(
            conversion_geometry(&packed, 1, PixelFormat::Bgra32),
            Err(Error::PlaneOutOfBounds { .. })
        ));

        let planar = FakeBuffer {
            format: PixelFormat::Nv12,
            planes: 2,
        };
        assert!(matches!(
            conversion_geometry(&planar, 2, PixelFormat::Nv12),
            Err(Error::PlaneOutOfBounds {
                plane: 2,
                plane_count: 2
            })
        ));
    }
}
