use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use block2::RcBlock;
use log::{debug, error, warn};
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2::{AllocAnyThread, DefinedClass, define_class, msg_send};
use objc2_av_foundation::{
    AVCaptureConnection, AVCaptureDevice, AVCaptureDeviceInput, AVCaptureOutput, AVCaptureSession,
    AVCaptureSessionRuntimeErrorNotification, AVCaptureVideoDataOutput,
    AVCaptureVideoDataOutputSampleBufferDelegate, AVMediaTypeVideo,
};
use objc2_core_media::CMSampleBuffer;
use objc2_foundation::{NSNotification, NSNotificationCenter, NSObjectProtocol};
use objc2_metal::MTLDevice;
use parking_lot::Mutex;

use crate::error::{Error, PlatformError};
use crate::pacer::{DELIVERY_FORMAT, DELIVERY_PLANE};
use crate::pipeline::{PipelineObserver, TextureSequence};
use crate::platform::macos::cache::{MetalTexture, MetalTextureCache, PixelBuffer};
use crate::platform::macos::{bgra_output_settings, catch_objc};
use crate::types::{MediaTime, PipelineState};

/// State shared between the session, its sample-buffer delegate and the
/// runtime-error handler.
struct CaptureShared {
    cache: Mutex<MetalTextureCache>,
    observer: Mutex<Box<dyn PipelineObserver<MetalTexture>>>,
    /// Cleared under the observer lock on stop, so no frame callback can
    /// slip out after `stop` returns.
    active: AtomicBool,
    dropped: AtomicU64,
}

struct DelegateIvars {
    shared: Arc<CaptureShared>,
}

define_class!(
    #[unsafe(super(objc2_foundation::NSObject))]
    #[ivars = DelegateIvars]
    #[name = "VideoStreamCaptureDelegate"]
    struct CaptureDelegate;

    impl CaptureDelegate {
    }

    unsafe impl NSObjectProtocol for CaptureDelegate {}

    unsafe impl AVCaptureVideoDataOutputSampleBufferDelegate for CaptureDelegate {
        #[unsafe(method(captureOutput:didOutputSampleBuffer:fromConnection:))]
        #[allow(non_snake_case)]
        unsafe fn captureOutput_didOutputSampleBuffer_fromConnection(
            &self,
            _output: &AVCaptureOutput,
            sample_buffer: &CMSampleBuffer,
            _connection: &AVCaptureConnection,
        ) {
            let shared = &self.ivars().shared;
            if !shared.active.load(Ordering::Acquire) {
                return;
            }

            let Some(pixel_buffer) = (unsafe { sample_buffer.image_buffer() }) else {
                return;
            };
            let cm_time = unsafe { sample_buffer.presentation_time_stamp() };
            let timestamp = MediaTime {
                value: cm_time.value,
                timescale: cm_time.timescale,
                flags: cm_time.flags.0,
                epoch: cm_time.epoch,
            };

            let buffer = PixelBuffer::new(pixel_buffer);
            let converted = shared
                .cache
                .lock()
                .convert(&buffer, DELIVERY_PLANE, DELIVERY_FORMAT);
            match converted {
                Ok(texture) => {
                    let mut textures = TextureSequence::new();
                    textures.push(texture);
                    let mut observer = shared.observer.lock();
                    if shared.active.load(Ordering::Acquire) {
                        observer.on_frame(&textures, timestamp.as_secs_f64());
                    }
                }
                Err(e) => {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("dropping captured frame: {e}");
                }
            }
        }
    }
);

impl CaptureDelegate {
    fn new(shared: Arc<CaptureShared>) -> Retained<Self> {
        let obj = Self::alloc().set_ivars(DelegateIvars { shared });
        unsafe { msg_send![super(obj), init] }
    }
}

/// Live-capture variant of the frame pipeline.
///
/// Same observer interface as file playback, different frame source: the
/// default camera pushes sample buffers on a capture queue, each is
/// converted through the shared texture cache and delivered immediately.
/// Capture frames carry their own arrival cadence, so no pacer sits in
/// between.
pub struct CaptureSession {
    session: Retained<AVCaptureSession>,
    output: Retained<AVCaptureVideoDataOutput>,
    delegate: Option<Retained<CaptureDelegate>>,
    error_token: Option<Retained<ProtocolObject<dyn NSObjectProtocol>>>,
    shared: Arc<CaptureShared>,
    running: bool,
}

impl CaptureSession {
    /// Configure a capture session against the default video device,
    /// converting through a fresh texture cache for `device`.
    pub fn new(
        device: &ProtocolObject<dyn MTLDevice>,
        observer: Box<dyn PipelineObserver<MetalTexture>>,
    ) -> Result<Self, Error> {
        let shared = Arc::new(CaptureShared {
            cache: Mutex::new(MetalTextureCache::new(device)?),
            observer: Mutex::new(observer),
            active: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        shared
            .observer
            .lock()
            .on_state_change(PipelineState::Configuring, None);

        let media_type = unsafe { AVMediaTypeVideo }.ok_or(Error::Platform(
            PlatformError::Message("AVMediaTypeVideo not available"),
        ))?;
        let camera = unsafe { AVCaptureDevice::defaultDeviceWithMediaType(media_type) }
            .ok_or(Error::NotFound)?;

        let input = unsafe { AVCaptureDeviceInput::deviceInputWithDevice_error(&camera) }
            .map_err(|e| Error::Platform(PlatformError::NsError(e)))?;

        let session = unsafe { AVCaptureSession::new() };
        let output = unsafe { AVCaptureVideoDataOutput::new() };
        let settings = bgra_output_settings();
        unsafe { output.setVideoSettings(Some(&settings)) };

        catch_objc(AssertUnwindSafe(|| unsafe {
            session.beginConfiguration();

            if !session.canAddInput(&input) {
                session.commitConfiguration();
                return Err(Error::Platform(PlatformError::Message(
                    "cannot add input to session",
                )));
            }
            session.addInput(&input);

            if !session.canAddOutput(&output) {
                session.commitConfiguration();
                return Err(Error::Platform(PlatformError::Message(
                    "cannot add output to session",
                )));
            }
            session.addOutput(&output);

            session.commitConfiguration();
            Ok::<(), Error>(())
        }))??;

        shared
            .observer
            .lock()
            .on_state_change(PipelineState::Idle, None);

        Ok(CaptureSession {
            session,
            output,
            delegate: None,
            error_token: None,
            shared,
            running: false,
        })
    }

    /// Start capturing. Frames are delivered on the capture queue.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.running {
            return Err(Error::AlreadyStarted);
        }

        let delegate = CaptureDelegate::new(Arc::clone(&self.shared));
        let queue = dispatch2::DispatchQueue::new(
            "video-stream.capture",
            dispatch2::DispatchQueueAttr::SERIAL,
        );
        unsafe {
            self.output.setSampleBufferDelegate_queue(
                Some(ProtocolObject::from_ref(&*delegate)),
                Some(&queue),
            );
        }
        self.delegate = Some(delegate);
        self.error_token = Some(self.observe_runtime_errors());

        self.shared.active.store(true, Ordering::Release);
        catch_objc(AssertUnwindSafe(|| unsafe { self.session.startRunning() }))?;
        self.running = true;

        self.shared
            .observer
            .lock()
            .on_state_change(PipelineState::Running, None);
        debug!("capture session running");
        Ok(())
    }

    /// Stop capturing. Safe to call when never started or already
    /// stopped; no observer callback is delivered after it returns.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        unsafe { self.session.stopRunning() };
        unsafe { self.output.setSampleBufferDelegate_queue(None, None) };

        if let Some(token) = self.error_token.take() {
            unsafe { NSNotificationCenter::defaultCenter().removeObserver(&token) };
        }

        // Flip under the observer lock: any in-flight delegate callback
        // has either finished delivering or will observe the flag.
        let mut observer = self.shared.observer.lock();
        self.shared.active.store(false, Ordering::Release);
        observer.on_state_change(PipelineState::Stopped, None);
        drop(observer);

        self.delegate = None;
        self.running = false;
    }

    /// Captured frames lost to conversion failure so far.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Restart capture when the session reports a runtime error.
    ///
    /// This is the single automatic retry in the crate: runtime capture
    /// errors are transient (device contention, media services restart)
    /// and the session recovers by running again. Every other failure
    /// class is terminal and surfaces through `on_state_change`.
    fn observe_runtime_errors(&self) -> Retained<ProtocolObject<dyn NSObjectProtocol>> {
        let session = self.session.clone();
        let shared = Arc::clone(&self.shared);
        let block = RcBlock::new(move |_notification: NonNull<NSNotification>| {
            if !shared.active.load(Ordering::Acquire) {
                return;
            }
            error!("capture runtime error, restarting session");
            unsafe { session.startRunning() };
            shared
                .observer
                .lock()
                .on_state_change(PipelineState::Running, None);
        });

        unsafe {
            NSNotificationCenter::defaultCenter().addObserverForName_object_queue_usingBlock(
                Some(AVCaptureSessionRuntimeErrorNotification),
                Some(&self.session),
                None,
                &block,
            )
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
