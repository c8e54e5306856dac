//! Webcam capture on a background thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tracing::{debug, warn};

use crate::source::{FrameSource, SourceError, VideoFrame};

/// Consecutive failed reads tolerated before the capture thread gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 50;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Tracks a run of failed frame reads and how long to wait before the next.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    /// Delay before retrying, or `None` once the streak is too long.
    fn record(&mut self) -> Option<Duration> {
        self.count += 1;
        if self.count >= MAX_CONSECUTIVE_FAILURES {
            return None;
        }
        let delay = FIRST_RETRY_DELAY.saturating_mul(1 << (self.count - 1).min(16));
        Some(delay.min(MAX_RETRY_DELAY))
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

struct CapturedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Live camera feed. The capture thread owns the device; the newest decoded
/// frame waits in a one-slot channel.
pub struct CameraSource {
    index: u32,
    frames: Receiver<CapturedFrame>,
    current: Option<CapturedFrame>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CameraSource {
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self, SourceError> {
        let (frame_tx, frames) = bounded::<CapturedFrame>(1);
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u32), String>>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let stale = frames.clone();
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name(format!("ripple-camera-{index}"))
            .spawn(move || capture_loop(index, width, height, frame_tx, stale, ready_tx, worker_stop))
            .map_err(|err| SourceError::Camera {
                index,
                message: format!("spawn capture thread: {err}"),
            })?;

        match ready_rx.recv() {
            Ok(Ok((actual_width, actual_height))) => {
                debug!(index, actual_width, actual_height, "camera stream opened");
            }
            Ok(Err(message)) => {
                let _ = worker.join();
                return Err(SourceError::Camera { index, message });
            }
            Err(_) => {
                let _ = worker.join();
                return Err(SourceError::Camera {
                    index,
                    message: "capture thread exited during start-up".to_string(),
                });
            }
        }

        Ok(Self {
            index,
            frames,
            current: None,
            stop,
            worker: Some(worker),
        })
    }
}

fn capture_loop(
    index: u32,
    width: u32,
    height: u32,
    frames: Sender<CapturedFrame>,
    stale: Receiver<CapturedFrame>,
    ready: Sender<Result<(u32, u32), String>>,
    stop: Arc<AtomicBool>,
) {
    let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::YUYV, 30);
    let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format));
    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = ready.send(Err(format!("create camera: {err}")));
            return;
        }
    };
    if let Err(err) = camera.open_stream() {
        let _ = ready.send(Err(format!("open stream: {err}")));
        return;
    }
    let actual = camera.resolution();
    let _ = ready.send(Ok((actual.width(), actual.height())));

    let mut failures = FailureStreak::default();
    while !stop.load(Ordering::Relaxed) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbAFormat>());
        let image = match decoded {
            Ok(image) => {
                failures.reset();
                image
            }
            Err(err) => match failures.record() {
                Some(delay) => {
                    warn!(index, error = %err, retry_ms = delay.as_millis() as u64, "camera frame dropped");
                    thread::sleep(delay);
                    continue;
                }
                None => {
                    warn!(
                        index,
                        error = %err,
                        failures = failures.count,
                        "camera keeps failing; stopping capture"
                    );
                    break;
                }
            },
        };
        let mut frame = CapturedFrame {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        };
        loop {
            match frames.try_send(frame) {
                Ok(()) => break,
                Err(TrySendError::Full(unsent)) => {
                    // Evict the frame nobody picked up yet.
                    let _ = stale.try_recv();
                    frame = unsent;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
    if let Err(err) = camera.stop_stream() {
        warn!(index, error = %err, "failed to stop camera stream");
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera #{}", self.index)
    }

    fn poll_frame(&mut self) -> Option<VideoFrame<'_>> {
        match self.frames.try_recv() {
            Ok(frame) => self.current = Some(frame),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
                    warn!(index = self.index, "camera capture stopped");
                    self.worker = None;
                }
                return None;
            }
        }
        self.current
            .as_ref()
            .map(|frame| VideoFrame::new(frame.width, frame.height, &frame.pixels))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
