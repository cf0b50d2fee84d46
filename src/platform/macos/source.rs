use std::panic::AssertUnwindSafe;
use std::path::Path;

use log::{debug, error, warn};
use objc2::rc::Retained;
use objc2_av_foundation::{
    AVAssetReader, AVAssetReaderStatus, AVAssetReaderTrackOutput, AVMediaTypeVideo, AVURLAsset,
};
use objc2_foundation::{NSString, NSURL};

use crate::error::{Error, PlatformError};
use crate::frame::TimedBuffer;
use crate::platform::macos::cache::PixelBuffer;
use crate::platform::macos::{bgra_output_settings, catch_objc};
use crate::source::FrameSource;
use crate::types::{MediaTime, Ratio, SourceStatus};

/// Sequential decoder over a local media container, backed by
/// `AVAssetReader`.
///
/// Output is pinned to 32-bit packed BGRA tagged as Metal-compatible, so
/// every buffer this source yields is directly convertible by
/// [`MetalTextureCache`](crate::platform::macos::MetalTextureCache).
pub struct AssetReaderSource {
    reader: Retained<AVAssetReader>,
    output: Retained<AVAssetReaderTrackOutput>,
    nominal_rate: Ratio,
}

// The reader is owned by one pipeline and only driven from its tick
// context; AVAssetReader has no main-thread affinity.
unsafe impl Send for AssetReaderSource {}

impl AssetReaderSource {
    /// Open the first video-typed track of the container at `location`
    /// and start reading.
    pub fn open(location: &Path) -> Result<Self, Error> {
        if !location.exists() {
            return Err(Error::NotFound);
        }
        let path = NSString::from_str(&location.to_string_lossy());
        let url = unsafe { NSURL::fileURLWithPath(&path) };
        let asset = unsafe { AVURLAsset::URLAssetWithURL_options(&url, None) };

        let media_type = unsafe { AVMediaTypeVideo }.ok_or(Error::Platform(
            PlatformError::Message("AVMediaTypeVideo not available"),
        ))?;
        #[allow(deprecated)]
        let tracks = unsafe { asset.tracksWithMediaType(media_type) };
        let Some(track) = tracks.iter().next() else {
            return Err(Error::TrackMissing);
        };

        let reader = unsafe { AVAssetReader::assetReaderWithAsset_error(&asset) }.map_err(|e| {
            error!("AVAssetReader construction failed: {e}");
            Error::ReaderInitFailed
        })?;

        let settings = bgra_output_settings();
        let output = unsafe {
            AVAssetReaderTrackOutput::assetReaderTrackOutputWithTrack_outputSettings(
                &track,
                Some(&settings),
            )
        };
        unsafe { output.setAlwaysCopiesSampleData(false) };

        catch_objc(AssertUnwindSafe(|| unsafe {
            if !reader.canAddOutput(&output) {
                return Err(Error::ReaderInitFailed);
            }
            reader.addOutput(&output);
            Ok::<(), Error>(())
        }))??;

        let fps = unsafe { track.nominalFrameRate() };
        let nominal_rate = Ratio::from_fps(fps as f64);

        if !unsafe { reader.startReading() } {
            if let Some(e) = unsafe { reader.error() } {
                error!("startReading failed: {e}");
            }
            return Err(Error::ReaderInitFailed);
        }
        debug!(
            "opened {} at {:.2} fps",
            location.display(),
            nominal_rate.as_f64()
        );

        Ok(AssetReaderSource {
            reader,
            output,
            nominal_rate,
        })
    }
}

impl FrameSource for AssetReaderSource {
    type Buffer = PixelBuffer;

    fn next_buffer(&mut self) -> Result<Option<TimedBuffer<PixelBuffer>>, Error> {
        // A null sample means "nothing available"; completion and failure
        // are reported through status(), matching AVAssetReader semantics.
        let Some(sample) = (unsafe { self.output.copyNextSampleBuffer() }) else {
            return Ok(None);
        };
        let pts = unsafe { sample.presentation_time_stamp() };
        let Some(image) = (unsafe { sample.image_buffer() }) else {
            // A sample without an image buffer is skipped, not fatal; the
            // next tick pulls again.
            warn!("sample at {} carried no image buffer", pts.value);
            return Ok(None);
        };
        Ok(Some(TimedBuffer {
            buffer: PixelBuffer::new(image),
            timestamp: MediaTime {
                value: pts.value,
                timescale: pts.timescale,
                flags: pts.flags.0,
                epoch: pts.epoch,
            },
        }))
    }

    fn status(&self) -> SourceStatus {
        let status = unsafe { self.reader.status() };
        if status == AVAssetReaderStatus::Reading {
            SourceStatus::Reading
        } else if status == AVAssetReaderStatus::Completed {
            SourceStatus::Completed
        } else if status == AVAssetReaderStatus::Failed
            || status == AVAssetReaderStatus::Cancelled
        {
            SourceStatus::Failed
        } else {
            SourceStatus::Idle
        }
    }

    fn frame_rate(&self) -> Ratio {
        self.nominal_rate
    }
}
