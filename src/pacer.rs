use std::time::Duration;

use log::warn;

use crate::cache::TextureCache;
use crate::error::Error;
use crate::frame::TimedBuffer;
use crate::source::FrameSource;
use crate::types::{PixelFormat, SourceStatus};

/// The plane a source-delivered buffer is converted from.
pub const DELIVERY_PLANE: usize = 0;

/// The pixel format the decode path is pinned to. Changing this requires
/// re-deriving the texture cache's expected format.
pub const DELIVERY_FORMAT: PixelFormat = PixelFormat::Bgra32;

/// Outcome of one pacer tick.
#[derive(Debug)]
pub enum PacerTick {
    /// Nothing available from the source this tick; try again next tick.
    Idle,
    /// A frame is pending but its presentation time has not arrived.
    Waiting,
    /// A frame was converted and delivered.
    Delivered,
    /// A due frame failed conversion and was dropped; playback continues.
    Dropped(Error),
    /// The source drained naturally.
    Completed,
    /// The source entered a failed state.
    Failed(Error),
}

/// Decides, once per clock tick, whether the pending decoded frame is due
/// for delivery.
///
/// Holds at most one decoded-but-undelivered buffer; a new buffer is only
/// pulled when that slot is empty, so frames are never reordered or
/// skipped. A late frame is delivered late, not dropped.
///
/// The reference epoch for "due" decisions is captured lazily on the first
/// observed tick, not when the pipeline is started. Playback start is
/// therefore aligned to the tick grid and may shift by up to one tick
/// interval relative to the `start()` call.
pub struct FramePacer<B> {
    start_time: Option<Duration>,
    pending: Option<TimedBuffer<B>>,
    delivered: u64,
    dropped: u64,
}

impl<B> Default for FramePacer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> FramePacer<B> {
    pub fn new() -> Self {
        FramePacer {
            start_time: None,
            pending: None,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Frames delivered so far in this run.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Due frames lost to conversion failure so far in this run.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Advance the pacer by one tick at monotonic time `now`.
    ///
    /// Invokes `deliver` at most once, synchronously, with the converted
    /// texture and its presentation time in seconds.
    pub fn tick<S, C, F>(
        &mut self,
        now: Duration,
        source: &mut S,
        cache: &mut C,
        deliver: F,
    ) -> PacerTick
    where
        S: FrameSource<Buffer = B>,
        C: TextureCache<Buffer = B>,
        F: FnOnce(C::Texture, f64),
    {
        let start = *self.start_time.get_or_insert(now);
        let elapsed = now.saturating_sub(start).as_secs_f64();

        if self.pending.is_none() {
            match source.next_buffer() {
                Ok(Some(frame)) => self.pending = Some(frame),
                Ok(None) => {
                    return match source.status() {
                        SourceStatus::Completed => PacerTick::Completed,
                        SourceStatus::Failed => PacerTick::Failed(Error::ReadFailed),
                        _ => PacerTick::Idle,
                    };
                }
                Err(e) => return PacerTick::Failed(e),
            }
        }

        // Due or overdue; lateness is tolerated, not corrected.
        let Some(frame) = self
            .pending
            .take_if(|f| f.timestamp.as_secs_f64() <= elapsed)
        else {
            return PacerTick::Waiting;
        };

        let seconds = frame.timestamp.as_secs_f64();
        match cache.convert(&frame.buffer, DELIVERY_PLANE, DELIVERY_FORMAT) {
            Ok(texture) => {
                self.delivered += 1;
                deliver(texture, seconds);
                PacerTick::Delivered
            }
            Err(e) => {
                self.dropped += 1;
                warn!("dropping frame at {seconds:.3}s: {e}");
                PacerTick::Dropped(e)
            }
        }
    }
}
