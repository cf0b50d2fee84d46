use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, PlatformError};
use crate::types::FrameRateProfile;

/// What a tick handler wants the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Callback invoked once per tick with monotonic elapsed time since the
/// scheduler started.
pub type TickHandler = Box<dyn FnMut(Duration) -> TickFlow + Send + 'static>;

/// A periodic scheduler driving frame-due evaluation.
///
/// Abstracts the pacing clock so the same pacer logic runs against a
/// display-refresh signal, a thread timer ([`IntervalClock`]) or a
/// scripted clock in tests.
pub trait TickSource: Send {
    /// Begin ticking at the profile's nominal rate. The handler runs on
    /// whatever context the scheduler delivers ticks on.
    fn start(&mut self, profile: FrameRateProfile, handler: TickHandler) -> Result<(), Error>;

    /// Cease ticking. Safe to call when never started or already stopped.
    ///
    /// When called from outside the tick context this waits for any
    /// in-flight tick to finish, so no tick is delivered after it returns.
    fn stop(&mut self);
}

/// Thread-timer tick source.
///
/// Ticks at the content's nominal frame rate on a dedicated thread. The
/// first tick fires immediately on start; subsequent ticks are scheduled
/// against the start instant rather than the previous wakeup, so sleep
/// overshoot does not accumulate.
#[derive(Default)]
pub struct IntervalClock {
    worker: Option<Worker>,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl IntervalClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TickSource for IntervalClock {
    fn start(&mut self, profile: FrameRateProfile, mut handler: TickHandler) -> Result<(), Error> {
        if self.worker.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let period = profile.frame_duration();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("video-stream-tick".into())
            .spawn(move || {
                let origin = Instant::now();
                let mut target = origin;
                loop {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    if handler(origin.elapsed()) == TickFlow::Stop {
                        trace!("tick handler requested stop");
                        break;
                    }
                    target += period;
                    let now = Instant::now();
                    if target > now {
                        thread::sleep(target - now);
                    }
                }
            })
            .map_err(|_| {
                Error::Platform(PlatformError::Message("failed to spawn tick thread"))
            })?;

        self.worker = Some(Worker { cancel, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.store(true, Ordering::Release);
            // Joining from inside the tick thread would deadlock; there the
            // flag alone ends the loop once the current tick returns.
            if thread::current().id() != worker.handle.thread().id() {
                let _ = worker.handle.join();
            }
        }
    }
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        self.stop();
    }
}
