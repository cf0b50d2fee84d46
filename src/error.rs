use core::fmt;

use crate::types::PixelFormat;

#[cfg(target_os = "macos")]
use objc2::exception::Exception;
#[cfg(target_os = "macos")]
use objc2::rc::Retained;
#[cfg(target_os = "macos")]
use objc2_foundation::NSError;

/// Platform-specific error details.
///
/// On platforms that provide native error objects (e.g. `NSError` on macOS),
/// the original object is preserved. Use [`Display`](fmt::Display) to obtain
/// a human-readable description.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformError {
    Message(&'static str),
    #[cfg(target_os = "macos")]
    NsError(Retained<NSError>),
    #[cfg(target_os = "macos")]
    ObjCException(Option<Retained<Exception>>),
    /// A CoreVideo status code other than success.
    #[cfg(target_os = "macos")]
    CvReturn(i32),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            #[cfg(target_os = "macos")]
            Self::NsError(e) => write!(f, "{e}"),
            #[cfg(target_os = "macos")]
            Self::ObjCException(Some(e)) => write!(f, "{e:?}"),
            #[cfg(target_os = "macos")]
            Self::ObjCException(None) => f.write_str("unknown Objective-C exception"),
            #[cfg(target_os = "macos")]
            Self::CvReturn(status) => write!(f, "CoreVideo status {status}"),
        }
    }
}

impl core::error::Error for PlatformError {}

/// Top-level crate error.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The media location does not exist or cannot be opened.
    NotFound,
    /// The container was opened but holds no video-typed track.
    TrackMissing,
    /// The sequential reader over the track could not be constructed.
    ReaderInitFailed,
    /// The reader entered a failed state while decoding.
    ReadFailed,
    /// The device does not support the buffer-to-texture bridge.
    CacheUnavailable,
    /// A conversion addressed a plane the buffer does not have.
    PlaneOutOfBounds { plane: usize, plane_count: usize },
    /// The buffer's pixel format does not match the requested one.
    FormatMismatch {
        requested: PixelFormat,
        actual: PixelFormat,
    },
    /// The platform reported failure creating a texture from a buffer.
    ConversionFailed,
    /// `start` was called before a successful `configure`.
    NotConfigured,
    AlreadyStarted,
    Platform(PlatformError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("media location not found"),
            Self::TrackMissing => f.write_str("no video track in container"),
            Self::ReaderInitFailed => f.write_str("failed to construct track reader"),
            Self::ReadFailed => f.write_str("reader entered failed state"),
            Self::CacheUnavailable => f.write_str("texture cache unavailable on this device"),
            Self::PlaneOutOfBounds { plane, plane_count } => {
                write!(f, "plane {plane} out of bounds ({plane_count} plane(s))")
            }
            Self::FormatMismatch { requested, actual } => {
                write!(f, "requested {requested:?} from a {actual:?} buffer")
            }
            Self::ConversionFailed => f.write_str("texture creation failed"),
            Self::NotConfigured => f.write_str("pipeline not configured"),
            Self::AlreadyStarted => f.write_str("already started"),
            Self::Platform(e) => write!(f, "platform error: {e}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Platform(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PlatformError> for Error {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}
