use core::ptr;
use core::ptr::NonNull;

use log::warn;
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_core_foundation::CFRetained;
use objc2_core_video::{
    CVMetalTexture, CVMetalTextureCache, CVMetalTextureCacheCreate,
    CVMetalTextureCacheCreateTextureFromImage, CVMetalTextureGetTexture, CVPixelBuffer,
    CVPixelBufferGetHeight, CVPixelBufferGetHeightOfPlane, CVPixelBufferGetPixelFormatType,
    CVPixelBufferGetPlaneCount, CVPixelBufferGetWidth, CVPixelBufferGetWidthOfPlane,
    kCVReturnSuccess,
};
use objc2_metal::{MTLDevice, MTLPixelFormat, MTLTexture};

use crate::cache::{TextureCache, conversion_geometry};
use crate::error::{Error, PlatformError};
use crate::frame::ImageBuffer;
use crate::platform::macos::fourcc_to_pixel_format;
use crate::types::{PixelFormat, Size};

/// A decoded frame backed by a `CVPixelBuffer`.
pub struct PixelBuffer {
    inner: CFRetained<CVPixelBuffer>,
}

// CoreVideo buffers are reference-counted and not tied to the thread that
// created them; a pipeline owns each buffer exclusively.
unsafe impl Send for PixelBuffer {}

impl PixelBuffer {
    pub(crate) fn new(inner: CFRetained<CVPixelBuffer>) -> Self {
        PixelBuffer { inner }
    }

    /// The backing `CVPixelBuffer`.
    pub fn as_inner(&self) -> &CVPixelBuffer {
        &self.inner
    }
}

impl ImageBuffer for PixelBuffer {
    fn pixel_format(&self) -> PixelFormat {
        let fourcc = unsafe { CVPixelBufferGetPixelFormatType(&self.inner) };
        fourcc_to_pixel_format(fourcc).unwrap_or(PixelFormat::Bgra32)
    }

    fn size(&self) -> Size {
        Size {
            width: unsafe { CVPixelBufferGetWidth(&self.inner) } as u32,
            height: unsafe { CVPixelBufferGetHeight(&self.inner) } as u32,
        }
    }

    fn plane_count(&self) -> usize {
        unsafe { CVPixelBufferGetPlaneCount(&self.inner) }
    }

    fn plane_size(&self, plane: usize) -> Option<Size> {
        if plane >= self.plane_count() {
            return None;
        }
        Some(Size {
            width: unsafe { CVPixelBufferGetWidthOfPlane(&self.inner, plane) } as u32,
            height: unsafe { CVPixelBufferGetHeightOfPlane(&self.inner, plane) } as u32,
        })
    }
}

/// A GPU texture view over a `CVPixelBuffer`, created without a copy.
///
/// Keeps the underlying cache entry retained, so the view stays valid for
/// as long as the value is held.
pub struct MetalTexture {
    texture: Retained<ProtocolObject<dyn MTLTexture>>,
    _backing: CFRetained<CVMetalTexture>,
}

// The texture is an immutable view; MTLTexture objects may be used from
// any thread.
unsafe impl Send for MetalTexture {}

impl MetalTexture {
    /// The Metal texture, ready to bind in a render pass.
    pub fn as_metal(&self) -> &ProtocolObject<dyn MTLTexture> {
        &self.texture
    }
}

/// `CVMetalTextureCache`-backed conversion context.
///
/// Created once per pipeline configuration from an explicit Metal device
/// and owned exclusively by that pipeline.
pub struct MetalTextureCache {
    cache: CFRetained<CVMetalTextureCache>,
}

// The cache is only touched from one pipeline's tick context at a time.
unsafe impl Send for MetalTextureCache {}

impl MetalTextureCache {
    /// Create the buffer-to-texture bridge for `device`.
    ///
    /// Fails with [`Error::CacheUnavailable`] where CoreVideo cannot
    /// provide the bridge (e.g. simulator or headless targets) rather
    /// than silently degrading to a copying path.
    pub fn new(device: &ProtocolObject<dyn MTLDevice>) -> Result<Self, Error> {
        let mut raw: *mut CVMetalTextureCache = ptr::null_mut();
        let status = unsafe {
            CVMetalTextureCacheCreate(None, None, device, None, NonNull::from(&mut raw))
        };
        if status != kCVReturnSuccess {
            warn!("CVMetalTextureCacheCreate failed with status {status}");
            return Err(Error::CacheUnavailable);
        }
        let raw = NonNull::new(raw).ok_or(Error::CacheUnavailable)?;
        Ok(MetalTextureCache {
            cache: unsafe { CFRetained::from_raw(raw) },
        })
    }

    fn metal_pixel_format(format: PixelFormat) -> Option<MTLPixelFormat> {
        match format {
            PixelFormat::Bgra32 => Some(MTLPixelFormat::BGRA8Unorm),
            _ => None,
        }
    }
}

impl TextureCache for MetalTextureCache {
    type Buffer = PixelBuffer;
    type Texture = MetalTexture;

    fn convert(
        &mut self,
        buffer: &PixelBuffer,
        plane_index: usize,
        format: PixelFormat,
    ) -> Result<MetalTexture, Error> {
        let geometry = conversion_geometry(buffer, plane_index, format)?;
        let mtl_format = Self::metal_pixel_format(format).ok_or(Error::FormatMismatch {
            requested: format,
            actual: buffer.pixel_format(),
        })?;

        let mut raw: *mut CVMetalTexture = ptr::null_mut();
        let status = unsafe {
            CVMetalTextureCacheCreateTextureFromImage(
                None,
                &self.cache,
                buffer.as_inner(),
                None,
                mtl_format,
                geometry.width as usize,
                geometry.height as usize,
                plane_index,
                NonNull::from(&mut raw),
            )
        };
        if status != kCVReturnSuccess {
            return Err(Error::Platform(PlatformError::CvReturn(status)));
        }
        let raw = NonNull::new(raw).ok_or(Error::ConversionFailed)?;
        let backing = unsafe { CFRetained::from_raw(raw) };
        let texture = unsafe { CVMetalTextureGetTexture(&backing) }.ok_or(Error::ConversionFailed)?;

        Ok(MetalTexture {
            texture,
            _backing: backing,
        })
    }
}
