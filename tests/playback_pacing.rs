//! End-to-end pacing behavior through the public API: a scripted source,
//! a counting cache and a hand-driven clock standing in for the platform
//! backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use video_stream::{
    Error, FrameRateProfile, FrameSource, ImageBuffer, MediaTime, PipelineObserver, PipelineState,
    PixelFormat, Ratio, Size, SourceStatus, TextureCache, TickFlow, TickHandler, TickSource,
    TimedBuffer, VideoPipeline,
};

#[derive(Debug, Clone, Copy)]
struct Buffer(u32);

impl ImageBuffer for Buffer {
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgra32
    }

    fn size(&self) -> Size {
        Size {
            width: 1280,
            height: 720,
        }
    }

    fn plane_count(&self) -> usize {
        0
    }

    fn plane_size(&self, _plane: usize) -> Option<Size> {
        None
    }
}

struct Source {
    frames: VecDeque<TimedBuffer<Buffer>>,
    status: SourceStatus,
}

impl Source {
    fn new(timestamps: &[f64]) -> Self {
        Source {
            frames: timestamps
                .iter()
                .enumerate()
                .map(|(i, &secs)| TimedBuffer {
                    buffer: Buffer(i as u32),
                    timestamp: MediaTime::new((secs * 600.0).round() as i64, 600),
                })
                .collect(),
            status: SourceStatus::Reading,
        }
    }
}

impl FrameSource for Source {
    type Buffer = Buffer;

    fn next_buffer(&mut self) -> Result<Option<TimedBuffer<Buffer>>, Error> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.status = SourceStatus::Completed;
                Ok(None)
            }
        }
    }

    fn status(&self) -> SourceStatus {
        self.status
    }

    fn frame_rate(&self) -> Ratio {
        Ratio {
            numerator: 30,
            denominator: 1,
        }
    }
}

struct Cache;

impl TextureCache for Cache {
    type Buffer = Buffer;
    type Texture = u32;

    fn convert(
        &mut self,
        buffer: &Buffer,
        _plane_index: usize,
        _format: PixelFormat,
    ) -> Result<u32, Error> {
        Ok(buffer.0)
    }
}

#[derive(Clone, Default)]
struct ManualClock {
    slot: Arc<Mutex<Option<TickHandler>>>,
}

impl ManualClock {
    fn fire(&self, seconds: f64) -> Option<TickFlow> {
        let mut slot = self.slot.lock().unwrap();
        let flow = slot
            .as_mut()
            .map(|handler| handler(Duration::from_secs_f64(seconds)));
        if matches!(flow, Some(TickFlow::Stop)) {
            slot.take();
        }
        flow
    }
}

impl TickSource for ManualClock {
    fn start(&mut self, _profile: FrameRateProfile, handler: TickHandler) -> Result<(), Error> {
        *self.slot.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot.lock().unwrap().take();
    }
}

/// Records (tick time, delivered timestamp) pairs.
#[derive(Clone, Default)]
struct Deliveries {
    log: Arc<Mutex<Vec<f64>>>,
    states: Arc<Mutex<Vec<PipelineState>>>,
}

impl PipelineObserver<u32> for Deliveries {
    fn on_frame(&mut self, textures: &[u32], timestamp_seconds: f64) {
        assert!(!textures.is_empty());
        self.log.lock().unwrap().push(timestamp_seconds);
    }

    fn on_state_change(&mut self, state: PipelineState, _error: Option<&Error>) {
        self.states.lock().unwrap().push(state);
    }
}

#[test]
fn frames_are_never_early_never_repeated_and_in_order() {
    let deliveries = Deliveries::default();
    let clock = ManualClock::default();
    let mut pipeline: VideoPipeline<Source, Cache> =
        VideoPipeline::with_clock(Box::new(deliveries.clone()), Box::new(clock.clone()));

    pipeline.configure_with(Source::new(&[0.0, 0.033, 0.066, 0.1]), Cache);
    pipeline.start().unwrap();

    let ticks: Vec<f64> = (0..12).map(|i| i as f64 * 0.01).collect();
    for &now in &ticks {
        if clock.fire(now).is_none() {
            break;
        }
        let seen = deliveries.log.lock().unwrap().clone();
        // Never early: everything delivered so far was due by `now`.
        assert!(seen.iter().all(|&ts| ts <= now + 1e-9));
    }

    let seen = deliveries.log.lock().unwrap().clone();
    assert_eq!(seen.len(), 4, "each frame delivered exactly once");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "in order");
}

#[test]
fn end_of_stream_stops_the_pipeline_for_good() {
    let deliveries = Deliveries::default();
    let clock = ManualClock::default();
    let mut pipeline: VideoPipeline<Source, Cache> =
        VideoPipeline::with_clock(Box::new(deliveries.clone()), Box::new(clock.clone()));

    pipeline.configure_with(Source::new(&[0.0]), Cache);
    pipeline.start().unwrap();

    assert_eq!(clock.fire(0.0), Some(TickFlow::Continue));
    assert_eq!(clock.fire(0.05), Some(TickFlow::Stop));
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    // Ticks keep arriving; nothing more is delivered.
    assert_eq!(clock.fire(0.1), None);
    assert_eq!(deliveries.log.lock().unwrap().len(), 1);
    assert_eq!(
        *deliveries.states.lock().unwrap(),
        vec![
            PipelineState::Configuring,
            PipelineState::Idle,
            PipelineState::Running,
            PipelineState::Stopped,
        ]
    );
}

#[test]
fn stop_before_start_is_silent() {
    let deliveries = Deliveries::default();
    let clock = ManualClock::default();
    let mut pipeline: VideoPipeline<Source, Cache> =
        VideoPipeline::with_clock(Box::new(deliveries.clone()), Box::new(clock.clone()));

    pipeline.stop();
    pipeline.stop();
    assert!(deliveries.states.lock().unwrap().is_empty());
    assert!(matches!(pipeline.start(), Err(Error::NotConfigured)));
}
