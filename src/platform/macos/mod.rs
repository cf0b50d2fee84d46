use objc2::rc::Retained;
use objc2::runtime::{AnyObject, ProtocolObject};
use objc2_core_video::{
    kCVPixelBufferMetalCompatibilityKey, kCVPixelBufferPixelFormatTypeKey,
};
use objc2_foundation::{NSMutableDictionary, NSNumber, NSString};

use crate::error::{Error, PlatformError};
use crate::types::PixelFormat;

pub mod cache;
pub mod capture;
pub mod session;
pub mod source;

pub use cache::{MetalTexture, MetalTextureCache, PixelBuffer};
pub use capture::CaptureSession;
pub use session::PlaybackSession;
pub use source::AssetReaderSource;

/// Catch Objective-C exceptions and convert them to our Error type.
fn catch_objc<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> Result<R, Error> {
    objc2::exception::catch(f)
        .map_err(|exception| Error::Platform(PlatformError::ObjCException(exception)))
}

pub(crate) fn fourcc_to_pixel_format(fourcc: u32) -> Option<PixelFormat> {
    // kCVPixelFormatType values
    #[allow(clippy::mistyped_literal_suffixes)]
    match fourcc {
        0x34_32_30_76 => Some(PixelFormat::Nv12),   // '420v'
        0x34_32_30_66 => Some(PixelFormat::Nv12),   // '420f'
        0x79_75_76_32 => Some(PixelFormat::Yuyv),   // 'yuvs' / 'yuv2'
        0x32_76_75_79 => Some(PixelFormat::Uyvy),   // '2vuy'
        0x42_47_52_41 => Some(PixelFormat::Bgra32), // 'BGRA'
        0x6A_70_65_67 => Some(PixelFormat::Jpeg),   // 'jpeg'
        _ => None,
    }
}

pub(crate) fn pixel_format_to_fourcc(pf: PixelFormat) -> u32 {
    #[allow(clippy::mistyped_literal_suffixes)]
    match pf {
        PixelFormat::Nv12 => 0x34_32_30_76,   // '420v'
        PixelFormat::Yuyv => 0x79_75_76_32,   // 'yuvs'
        PixelFormat::Uyvy => 0x32_76_75_79,   // '2vuy'
        PixelFormat::Bgra32 => 0x42_47_52_41, // 'BGRA'
        PixelFormat::Jpeg => 0x6A_70_65_67,   // 'jpeg'
        _ => 0x42_47_52_41,
    }
}

/// Buffer settings requesting packed BGRA, Metal-compatible output.
///
/// Shared by the asset-reader and capture sources so both feed the
/// texture cache the exact format it expects.
pub(crate) fn bgra_output_settings() -> Retained<NSMutableDictionary<NSString, AnyObject>> {
    unsafe {
        let settings = NSMutableDictionary::<NSString, AnyObject>::new();

        let format_key: &NSString = core::mem::transmute::<
            &objc2_core_foundation::CFString,
            &NSString,
        >(kCVPixelBufferPixelFormatTypeKey);
        let format_value = NSNumber::new_u32(pixel_format_to_fourcc(PixelFormat::Bgra32));
        settings.setObject_forKey(&format_value, ProtocolObject::from_ref(format_key));

        let compat_key: &NSString = core::mem::transmute::<
            &objc2_core_foundation::CFString,
            &NSString,
        >(kCVPixelBufferMetalCompatibilityKey);
        let compat_value = NSNumber::new_bool(true);
        settings.setObject_forKey(&compat_value, ProtocolObject::from_ref(compat_key));

        settings
    }
}
