use core::fmt;
use core::time::Duration;

/// Pixel formats encountered across platforms.
///
/// The decode path always requests [`PixelFormat::Bgra32`]; the other
/// variants exist so capture sources and buffer inspection can report what
/// a platform actually handed us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    Nv12,
    Yuyv,
    Uyvy,
    Bgra32,
    Jpeg,
}

/// Pixel dimensions of a buffer, texture or plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// A rational number (numerator / denominator).
///
/// Used to represent frame rates (e.g. 30000/1000 = 30 fps) and
/// frame durations (e.g. 1000/30000 ≈ 0.033 s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// True when the ratio represents a usable, non-zero rate.
    pub fn is_positive(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Express a floating-point rate as an integer ratio.
    ///
    /// Uses a 1000-based denominator so common fractional rates
    /// (29.97, 59.94) survive the round trip.
    pub fn from_fps(fps: f64) -> Self {
        let denominator = 1000u32;
        let numerator = (fps * denominator as f64).round() as u32;
        Ratio {
            numerator,
            denominator,
        }
    }
}

/// A rational presentation timestamp.
///
/// Mirrors Core Media's `CMTime`, preserving the full precision and
/// semantics of the underlying value, including flags and epoch. For a
/// quick seconds value, use [`as_secs_f64()`](MediaTime::as_secs_f64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaTime {
    /// The numerator of the time value (ticks).
    pub value: i64,
    /// Ticks per second.
    pub timescale: i32,
    /// Platform time flags (valid, rounded, infinity, indefinite).
    pub flags: u32,
    /// Distinguishes separate timelines that may restart from zero.
    pub epoch: i64,
}

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
        flags: 0,
        epoch: 0,
    };

    /// A timestamp of `value / timescale` seconds.
    pub fn new(value: i64, timescale: i32) -> Self {
        MediaTime {
            value,
            timescale,
            flags: 0,
            epoch: 0,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale > 0 {
            self.value as f64 / self.timescale as f64
        } else {
            0.0
        }
    }
}

/// Nominal frame rate of a source and its derived frame duration.
///
/// Computed once from track metadata when a pipeline is configured and
/// immutable thereafter. Rates that are zero or malformed fall back to
/// [`FrameRateProfile::DEFAULT_RATE`] so a pacing clock always has a
/// usable period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRateProfile {
    rate: Ratio,
}

impl FrameRateProfile {
    /// Fallback rate for sources whose metadata reports no usable value.
    pub const DEFAULT_RATE: Ratio = Ratio {
        numerator: 30,
        denominator: 1,
    };

    pub fn new(rate: Ratio) -> Self {
        let rate = if rate.is_positive() {
            rate
        } else {
            Self::DEFAULT_RATE
        };
        FrameRateProfile { rate }
    }

    pub fn rate(&self) -> Ratio {
        self.rate
    }

    pub fn frames_per_second(&self) -> f64 {
        self.rate.as_f64()
    }

    /// Duration of one frame at the nominal rate.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.rate.denominator as f64 / self.rate.numerator as f64)
    }
}

/// Lifecycle of a decode source.
///
/// `Idle → Reading → {Completed | Failed}`; there is no transition back
/// to `Reading` without re-opening the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    Idle,
    Reading,
    Completed,
    Failed,
}

/// Lifecycle of a frame pipeline, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Configuring,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Configuring => f.write_str("configuring"),
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}
