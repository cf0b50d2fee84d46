use std::path::Path;

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLCreateSystemDefaultDevice, MTLDevice};

use crate::clock::TickSource;
use crate::error::Error;
use crate::pipeline::{PipelineObserver, VideoPipeline};
use crate::platform::macos::cache::{MetalTexture, MetalTextureCache};
use crate::platform::macos::source::AssetReaderSource;
use crate::types::{FrameRateProfile, PipelineState};

/// File playback against a Metal device: `AVAssetReader` decode, paced
/// delivery, `CVMetalTextureCache` conversion.
///
/// Thin binding of [`VideoPipeline`] to the macOS backend. The Metal
/// device is an explicit context captured at construction; each
/// [`configure`](PlaybackSession::configure) opens a fresh reader and
/// creates a fresh texture cache for it, so a stale cache can never
/// outlive a source change.
pub struct PlaybackSession {
    device: Retained<ProtocolObject<dyn MTLDevice>>,
    pipeline: VideoPipeline<AssetReaderSource, MetalTextureCache>,
}

impl PlaybackSession {
    pub fn new(
        device: Retained<ProtocolObject<dyn MTLDevice>>,
        observer: Box<dyn PipelineObserver<MetalTexture>>,
    ) -> Self {
        PlaybackSession {
            device,
            pipeline: VideoPipeline::new(observer),
        }
    }

    /// Like [`new`](PlaybackSession::new), using the system default Metal
    /// device.
    pub fn with_default_device(
        observer: Box<dyn PipelineObserver<MetalTexture>>,
    ) -> Result<Self, Error> {
        let device = MTLCreateSystemDefaultDevice().ok_or(Error::CacheUnavailable)?;
        Ok(Self::new(device, observer))
    }

    /// Pipeline driven by a caller-supplied tick source instead of the
    /// built-in thread timer.
    pub fn with_clock(
        device: Retained<ProtocolObject<dyn MTLDevice>>,
        observer: Box<dyn PipelineObserver<MetalTexture>>,
        clock: Box<dyn TickSource>,
    ) -> Self {
        PlaybackSession {
            device,
            pipeline: VideoPipeline::with_clock(observer, clock),
        }
    }

    /// Open the container at `location` and ready the pipeline.
    ///
    /// Any previous configuration is stopped first. Failures are fatal to
    /// this configure attempt and leave no partial pipeline running; the
    /// session can be re-configured afterwards.
    pub fn configure(&mut self, location: &Path) -> Result<FrameRateProfile, Error> {
        self.pipeline.stop();
        let source = AssetReaderSource::open(location)?;
        let cache = MetalTextureCache::new(&self.device)?;
        Ok(self.pipeline.configure_with(source, cache))
    }

    pub fn start(&mut self) -> Result<(), Error> {
        self.pipeline.start()
    }

    pub fn stop(&mut self) {
        self.pipeline.stop();
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn frame_rate_profile(&self) -> Option<FrameRateProfile> {
        self.pipeline.frame_rate_profile()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.pipeline.frames_delivered()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.pipeline.frames_dropped()
    }
}
