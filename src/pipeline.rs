use std::sync::Arc;
use std::time::Duration;

use arrayvec::ArrayVec;
use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::cache::TextureCache;
use crate::clock::{IntervalClock, TickFlow, TickSource};
use crate::error::Error;
use crate::pacer::{FramePacer, PacerTick};
use crate::source::FrameSource;
use crate::types::{FrameRateProfile, PipelineState};

/// Upper bound on textures delivered per frame.
pub const MAX_DELIVERY_PLANES: usize = 4;

/// The ordered, non-empty texture sequence handed to an observer.
///
/// Length 1 for the packed decode path; the inline capacity is reserved
/// for multi-plane delivery.
pub type TextureSequence<T> = ArrayVec<T, MAX_DELIVERY_PLANES>;

/// Receives pipeline output and lifecycle notifications.
///
/// Both callbacks run synchronously on whatever context the tick source
/// delivers ticks on; marshaling to another thread (e.g. for UI work) is
/// the observer's responsibility. Textures are only guaranteed valid for
/// the duration of `on_frame` unless the observer retains them.
pub trait PipelineObserver<T>: Send {
    /// One frame, as a non-empty ordered texture sequence plus its
    /// presentation time. Timestamps are non-decreasing across one run.
    fn on_frame(&mut self, textures: &[T], timestamp_seconds: f64);

    fn on_state_change(&mut self, state: PipelineState, error: Option<&Error>) {
        let _ = (state, error);
    }
}

struct PipelineCore<S, C>
where
    S: FrameSource,
    C: TextureCache<Buffer = S::Buffer>,
{
    source: Option<S>,
    cache: Option<C>,
    pacer: FramePacer<S::Buffer>,
    observer: Box<dyn PipelineObserver<C::Texture>>,
    state: PipelineState,
}

impl<S, C> PipelineCore<S, C>
where
    S: FrameSource,
    C: TextureCache<Buffer = S::Buffer>,
{
    fn set_state(&mut self, state: PipelineState, error: Option<&Error>) {
        self.state = state;
        self.observer.on_state_change(state, error);
    }

    fn tick(&mut self, now: Duration) -> TickFlow {
        if self.state != PipelineState::Running {
            return TickFlow::Stop;
        }
        let (Some(source), Some(cache)) = (self.source.as_mut(), self.cache.as_mut()) else {
            return TickFlow::Stop;
        };

        let observer = &mut self.observer;
        let outcome = self.pacer.tick(now, source, cache, |texture, seconds| {
            let mut textures = TextureSequence::new();
            textures.push(texture);
            observer.on_frame(&textures, seconds);
        });

        match outcome {
            PacerTick::Idle | PacerTick::Waiting | PacerTick::Delivered => TickFlow::Continue,
            // Best-effort: a single bad buffer is not fatal, but it is
            // counted and logged since repeated failures indicate a
            // systemic format or cache problem.
            PacerTick::Dropped(_) => TickFlow::Continue,
            PacerTick::Completed => {
                debug!(
                    "source drained after {} frame(s), {} dropped",
                    self.pacer.delivered(),
                    self.pacer.dropped()
                );
                self.source = None;
                self.set_state(PipelineState::Stopped, None);
                TickFlow::Stop
            }
            PacerTick::Failed(e) => {
                error!("playback failed: {e}");
                self.source = None;
                self.set_state(PipelineState::Failed, Some(&e));
                TickFlow::Stop
            }
        }
    }
}

/// Orchestrates a frame source, a texture cache and a pacing clock, and
/// delivers produced textures to a registered observer.
///
/// The controller exclusively owns its source and cache; the cache must be
/// freshly created for every [`configure_with`](VideoPipeline::configure_with)
/// call, never carried over from a previous configuration.
pub struct VideoPipeline<S, C>
where
    S: FrameSource,
    C: TextureCache<Buffer = S::Buffer>,
{
    // Declared before `core` so a dropped pipeline stops ticking before
    // the shared state goes away.
    clock: Box<dyn TickSource>,
    core: Arc<Mutex<PipelineCore<S, C>>>,
    profile: Option<FrameRateProfile>,
}

impl<S, C> VideoPipeline<S, C>
where
    S: FrameSource + Send + 'static,
    S::Buffer: Send + 'static,
    C: TextureCache<Buffer = S::Buffer> + Send + 'static,
{
    /// A pipeline ticking on the built-in thread timer.
    pub fn new(observer: Box<dyn PipelineObserver<C::Texture>>) -> Self {
        Self::with_clock(observer, Box::new(IntervalClock::new()))
    }

    /// A pipeline driven by a caller-supplied tick source (a display-link
    /// wrapper, a simulated clock in tests).
    pub fn with_clock(
        observer: Box<dyn PipelineObserver<C::Texture>>,
        clock: Box<dyn TickSource>,
    ) -> Self {
        VideoPipeline {
            clock,
            core: Arc::new(Mutex::new(PipelineCore {
                source: None,
                cache: None,
                pacer: FramePacer::new(),
                observer,
                state: PipelineState::Idle,
            })),
            profile: None,
        }
    }

    /// Install a freshly opened source and a freshly created cache.
    ///
    /// Any previous configuration is torn down first (the clock stops,
    /// the old source and cache are released), so reconfiguring a live
    /// pipeline never leaks its predecessor.
    pub fn configure_with(&mut self, source: S, cache: C) -> FrameRateProfile {
        self.teardown();

        let mut core = self.core.lock();
        core.set_state(PipelineState::Configuring, None);

        let rate = source.frame_rate();
        if !rate.is_positive() {
            warn!(
                "source reports no usable frame rate, assuming {} fps",
                FrameRateProfile::DEFAULT_RATE.as_f64()
            );
        }
        let profile = FrameRateProfile::new(rate);
        debug!(
            "configured pipeline at {:.2} fps ({:?} per frame)",
            profile.frames_per_second(),
            profile.frame_duration()
        );

        core.source = Some(source);
        core.cache = Some(cache);
        core.pacer = FramePacer::new();
        core.set_state(PipelineState::Idle, None);
        drop(core);

        self.profile = Some(profile);
        profile
    }

    /// Begin pulling and pacing frames.
    ///
    /// Fails with [`Error::NotConfigured`] before a successful configure
    /// and with [`Error::AlreadyStarted`] while running.
    pub fn start(&mut self) -> Result<(), Error> {
        let profile = self.profile.ok_or(Error::NotConfigured)?;
        {
            let mut core = self.core.lock();
            if core.state == PipelineState::Running {
                return Err(Error::AlreadyStarted);
            }
            if core.source.is_none() {
                return Err(Error::NotConfigured);
            }
            core.set_state(PipelineState::Running, None);
        }

        let core = Arc::clone(&self.core);
        let started = self
            .clock
            .start(profile, Box::new(move |now| core.lock().tick(now)));
        if let Err(e) = started {
            let mut core = self.core.lock();
            core.set_state(PipelineState::Failed, Some(&e));
            return Err(e);
        }
        Ok(())
    }

    /// Stop ticking and drop the source.
    ///
    /// Always safe to call: before `start`, twice in a row, or after the
    /// pipeline stopped itself. No observer callback is delivered after
    /// this returns, and none at all unless the pipeline was running.
    pub fn stop(&mut self) {
        self.clock.stop();
        let mut core = self.core.lock();
        core.source = None;
        if core.state == PipelineState::Running {
            core.set_state(PipelineState::Stopped, None);
        }
    }

    pub fn state(&self) -> PipelineState {
        self.core.lock().state
    }

    /// The profile computed by the last successful configure.
    pub fn frame_rate_profile(&self) -> Option<FrameRateProfile> {
        self.profile
    }

    pub fn frames_delivered(&self) -> u64 {
        self.core.lock().pacer.delivered()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.core.lock().pacer.dropped()
    }

    fn teardown(&mut self) {
        self.clock.stop();
        self.profile = None;
        let mut core = self.core.lock();
        core.source = None;
        core.cache = None;
        core.pacer = FramePacer::new();
        if core.state == PipelineState::Running {
            core.set_state(PipelineState::Stopped, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::TickHandler;
    use crate::pacer::tests::{CountingCache, ScriptedSource};
    use crate::types::Ratio;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Frame { textures: usize, seconds: f64 },
        State { state: PipelineState, with_error: bool },
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        fn frames(&self) -> Vec<f64> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Frame { seconds, .. } => Some(seconds),
                    _ => None,
                })
                .collect()
        }

        fn states(&self) -> Vec<PipelineState> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::State { state, .. } => Some(state),
                    _ => None,
                })
                .collect()
        }
    }

    impl PipelineObserver<u32> for Recorder {
        fn on_frame(&mut self, textures: &[u32], timestamp_seconds: f64) {
            self.events.lock().push(Event::Frame {
                textures: textures.len(),
                seconds: timestamp_seconds,
            });
        }

        fn on_state_change(&mut self, state: PipelineState, error: Option<&Error>) {
            self.events.lock().push(Event::State {
                state,
                with_error: error.is_some(),
            });
        }
    }

    /// Scripted tick source for driving a pipeline by hand.
    #[derive(Clone, Default)]
    struct ManualClock {
        slot: Arc<Mutex<Option<TickHandler>>>,
    }

    impl ManualClock {
        fn fire(&self, seconds: f64) -> Option<TickFlow> {
            let mut slot = self.slot.lock();
            let flow = slot
                .as_mut()
                .map(|handler| handler(Duration::from_secs_f64(seconds)));
            if matches!(flow, Some(TickFlow::Stop)) {
                slot.take();
            }
            flow
        }

        fn is_armed(&self) -> bool {
            self.slot.lock().is_some()
        }
    }

    impl TickSource for ManualClock {
        fn start(&mut self, _profile: FrameRateProfile, handler: TickHandler) -> Result<(), Error> {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Err(Error::AlreadyStarted);
            }
            *slot = Some(handler);
            Ok(())
        }

        fn stop(&mut self) {
            self.slot.lock().take();
        }
    }

    type TestPipeline = VideoPipeline<ScriptedSource, CountingCache>;

    fn pipeline() -> (TestPipeline, Recorder, ManualClock) {
        let recorder = Recorder::default();
        let clock = ManualClock::default();
        let pipeline =
            TestPipeline::with_clock(Box::new(recorder.clone()), Box::new(clock.clone()));
        (pipeline, recorder, clock)
    }

    #[test]
    fn start_before_configure_is_an_error_and_schedules_nothing() {
        let (mut pipeline, recorder, clock) = pipeline();
        assert!(matches!(pipeline.start(), Err(Error::NotConfigured)));
        assert!(!clock.is_armed());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn paces_a_thirty_fps_source_and_stops_at_end_of_stream() {
        let (mut pipeline, recorder, clock) = pipeline();
        pipeline.configure_with(ScriptedSource::new(&[0.0, 0.033, 0.066]), CountingCache::new());
        pipeline.start().unwrap();

        for now in [0.0, 0.02, 0.04, 0.06, 0.08] {
            assert_eq!(clock.fire(now), Some(TickFlow::Continue));
        }
        let frames = recorder.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.windows(2).all(|w| w[0] <= w[1]));

        // Next tick observes end-of-stream and stops the pipeline.
        assert_eq!(clock.fire(0.1), Some(TickFlow::Stop));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(
            recorder.states(),
            vec![
                PipelineState::Configuring,
                PipelineState::Idle,
                PipelineState::Running,
                PipelineState::Stopped,
            ]
        );

        // Ticks after completion deliver nothing.
        assert_eq!(clock.fire(0.12), None);
        assert_eq!(recorder.frames().len(), 3);
    }

    #[test]
    fn every_delivery_carries_exactly_one_texture() {
        let (mut pipeline, recorder, clock) = pipeline();
        pipeline.configure_with(ScriptedSource::new(&[0.0, 0.01]), CountingCache::new());
        pipeline.start().unwrap();
        clock.fire(1.0);
        clock.fire(1.01);

        let textures: Vec<usize> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Frame { textures, .. } => Some(textures),
                _ => None,
            })
            .collect();
        assert_eq!(textures, vec![1, 1]);
    }

    #[test]
    fn conversion_failure_is_counted_not_fatal() {
        let (mut pipeline, recorder, clock) = pipeline();
        let mut cache = CountingCache::new();
        cache.fail_on = Some(3);
        pipeline.configure_with(
            ScriptedSource::new(&[0.0, 0.01, 0.02, 0.03, 0.04]),
            cache,
        );
        pipeline.start().unwrap();

        for i in 0..5 {
            clock.fire(1.0 + i as f64 * 0.01);
        }
        assert_eq!(recorder.frames().len(), 4);
        assert_eq!(pipeline.frames_dropped(), 1);
        assert_eq!(pipeline.state(), PipelineState::Running);
    }

    #[test]
    fn failed_source_reports_failure_once_and_stops() {
        let (mut pipeline, recorder, clock) = pipeline();
        pipeline.configure_with(
            ScriptedSource::failing_at_end(&[0.0]),
            CountingCache::new(),
        );
        pipeline.start().unwrap();

        clock.fire(0.0);
        assert_eq!(clock.fire(0.05), Some(TickFlow::Stop));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(
            recorder
                .events()
                .into_iter()
                .filter(|e| matches!(
                    e,
                    Event::State {
                        state: PipelineState::Failed,
                        with_error: true
                    }
                ))
                .count(),
            1
        );
    }

    #[test]
    fn stop_is_idempotent_and_silent_when_never_started() {
        let (mut pipeline, recorder, _clock) = pipeline();
        pipeline.stop();
        pipeline.stop();
        assert!(recorder.events().is_empty());

        pipeline.configure_with(ScriptedSource::new(&[0.0]), CountingCache::new());
        pipeline.stop();
        // Configure notifications only; stop before start stays silent.
        assert_eq!(
            recorder.states(),
            vec![PipelineState::Configuring, PipelineState::Idle]
        );
    }

    #[test]
    fn stop_emits_one_transition_and_ends_delivery() {
        let (mut pipeline, recorder, clock) = pipeline();
        pipeline.configure_with(
            ScriptedSource::new(&[0.0, 0.033, 0.066]),
            CountingCache::new(),
        );
        pipeline.start().unwrap();
        clock.fire(0.0);

        pipeline.stop();
        pipeline.stop();
        assert!(!clock.is_armed());
        assert_eq!(
            recorder
                .states()
                .into_iter()
                .filter(|s| *s == PipelineState::Stopped)
                .count(),
            1
        );

        // A start after stop requires re-configuring: the source is gone.
        assert!(matches!(pipeline.start(), Err(Error::NotConfigured)));
    }

    #[test]
    fn reconfigure_tears_down_the_running_pipeline_first() {
        let (mut pipeline, recorder, clock) = pipeline();
        pipeline.configure_with(
            ScriptedSource::new(&[0.0, 0.033]),
            CountingCache::new(),
        );
        pipeline.start().unwrap();
        clock.fire(0.0);
        assert_eq!(pipeline.frames_delivered(), 1);

        pipeline.configure_with(ScriptedSource::new(&[0.0]), CountingCache::new());
        assert!(!clock.is_armed());
        assert_eq!(pipeline.frames_delivered(), 0);
        assert!(recorder.states().contains(&PipelineState::Stopped));

        pipeline.start().unwrap();
        clock.fire(0.0);
        assert_eq!(pipeline.frames_delivered(), 1);
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let (mut pipeline, _recorder, _clock) = pipeline();
        pipeline.configure_with(ScriptedSource::new(&[0.0]), CountingCache::new());
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn zero_rate_sources_fall_back_to_the_default_profile() {
        let (mut pipeline, _recorder, _clock) = pipeline();
        let mut source = ScriptedSource::new(&[0.0]);
        source.rate = Ratio {
            numerator: 0,
            denominator: 0,
        };
        let profile = pipeline.configure_with(source, CountingCache::new());
        assert_eq!(profile.rate(), FrameRateProfile::DEFAULT_RATE);
    }
}
