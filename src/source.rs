use crate::error::Error;
use crate::frame::{ImageBuffer, TimedBuffer};
use crate::types::{Ratio, SourceStatus};

/// Pull-based sequential reader over a compressed media container.
///
/// Yields one timestamped image buffer at a time, in presentation order.
pub trait FrameSource {
    type Buffer: ImageBuffer;

    /// Pull the next decoded buffer.
    ///
    /// Non-blocking with respect to decode completion: returns `Ok(None)`
    /// as soon as no sample is available, rather than waiting. `Ok(None)`
    /// by itself does not distinguish "temporarily empty" from "track
    /// finished"; poll [`status()`](FrameSource::status) for that.
    fn next_buffer(&mut self) -> Result<Option<TimedBuffer<Self::Buffer>>, Error>;

    /// Current position in the `Idle → Reading → {Completed | Failed}`
    /// state machine.
    fn status(&self) -> SourceStatus;

    /// Nominal frame rate from track metadata.
    fn frame_rate(&self) -> Ratio;
}
