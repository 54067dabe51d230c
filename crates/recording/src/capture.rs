use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, info, trace, warn};

use camrec_fail::fail;

use crate::{
    controller::{Command, CommandInbox, Recorder},
    device::{AudioDevice, SampleFormat, VideoDevice},
    error::RecordingError,
    packet::{Packet, PacketFlags},
    preview::{FrameNotifier, PreviewBuffer},
};

/// A capture loop on its own OS thread. The loop runs until [`stop`] clears
/// its run flag and hands back whatever the loop returns, usually the device
/// it was polling.
///
/// [`stop`]: CaptureThread::stop
pub(crate) struct CaptureThread<T> {
    name: &'static str,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<T, String>>>,
}

impl<T: Send + 'static> CaptureThread<T> {
    pub fn spawn(
        name: &'static str,
        body: impl FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    ) -> Result<Self, RecordingError> {
        let running = Arc::new(AtomicBool::new(true));

        let dispatcher = tracing::dispatcher::get_default(|d| d.clone());
        let span = tracing::error_span!("capture", thread = name);

        let handle = thread::Builder::new()
            .name(format!("camrec-{name}"))
            .spawn({
                let running = running.clone();
                move || {
                    tracing::dispatcher::with_default(&dispatcher, || {
                        span.in_scope(|| {
                            info!("starting '{name}' capture loop");
                            let res = catch_unwind(AssertUnwindSafe(|| body(running)))
                                .map_err(panic_message);
                            info!("'{name}' capture loop done");
                            res
                        })
                    })
                }
            })
            .map_err(RecordingError::Spawn)?;

        Ok(Self {
            name,
            running,
            handle: Some(handle),
        })
    }
}

impl<T> CaptureThread<T> {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Clears the run flag and waits for the loop to return.
    pub fn stop(mut self) -> Result<T, RecordingError> {
        self.running.store(false, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return Err(RecordingError::ThreadPanicked(
                self.name,
                "already joined".to_string(),
            ));
        };

        match handle.join() {
            Ok(res) => res.map_err(|e| RecordingError::ThreadPanicked(self.name, e)),
            Err(e) => Err(RecordingError::ThreadPanicked(self.name, panic_message(e))),
        }
    }
}

impl<T> Drop for CaptureThread<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.running.store(false, Ordering::Release);
            if handle.join().is_err() {
                warn!("'{}' capture thread panicked while shutting down", self.name);
            }
        }
    }
}

fn panic_message(e: Box<dyn Any + Send>) -> String {
    if let Some(s) = e.downcast_ref::<&'static str>() {
        format!("Panicked: {s}")
    } else if let Some(s) = e.downcast_ref::<String>() {
        format!("Panicked: {s}")
    } else {
        "Panicked: Unknown error".to_string()
    }
}

/// Logs the first of a run of device errors loudly and the rest quietly.
#[derive(Default)]
struct ErrorRun(u64);

impl ErrorRun {
    fn failed(&mut self, what: &str, e: &dyn std::fmt::Display) {
        self.0 += 1;
        if self.0 == 1 {
            warn!("Failed to read {what}: {e}");
        } else {
            trace!("Failed to read {what} ({} in a row): {e}", self.0);
        }
    }

    fn succeeded(&mut self, what: &str) {
        if self.0 > 1 {
            debug!("Reading {what} recovered after {} errors", self.0);
        }
        self.0 = 0;
    }
}

pub(crate) struct VideoLoop {
    pub recorder: Arc<Recorder>,
    pub inbox: CommandInbox,
    pub preview: Arc<PreviewBuffer>,
    pub notifier: FrameNotifier,
}

impl VideoLoop {
    pub fn run(
        mut self,
        mut device: Box<dyn VideoDevice>,
        running: Arc<AtomicBool>,
    ) -> Box<dyn VideoDevice> {
        let config = self.recorder.config();
        let (timeout, retry) = (config.poll_timeout(), config.video_retry_delay());
        let params = device.params();
        let mut errors = ErrorRun::default();

        while running.load(Ordering::Acquire) {
            if !device.is_streaming() {
                thread::sleep(retry);
                continue;
            }

            let frame = match device.next_frame(timeout) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    errors.failed("video frame", &e);
                    thread::sleep(retry);
                    continue;
                }
            };
            errors.succeeded("video frame");

            fail!("video_loop::frame");

            let round = self.inbox.next_round();
            if round.snapshot {
                self.recorder.take_snapshot(&frame);
            }
            match round.transition {
                Some(Command::ToggleRecording) if self.recorder.is_recording() => {
                    self.recorder.stop_recording();
                }
                Some(Command::StartRecording | Command::ToggleRecording) => {
                    if let Err(e) = self.recorder.start_recording(&frame, &params) {
                        debug!("Recording not started: {e}");
                    }
                }
                Some(Command::StopRecording) => {
                    self.recorder.stop_recording();
                }
                Some(Command::Snapshot) | None => {}
            }

            if self.recorder.is_recording() {
                self.recorder.forward_video(&frame);
            }

            self.preview.publish(&frame);
            device.release(frame);
            self.notifier.notify();
        }

        device
    }
}

pub(crate) fn run_audio_loop(
    mut device: Box<dyn AudioDevice>,
    running: Arc<AtomicBool>,
    recorder: Arc<Recorder>,
    format: SampleFormat,
) -> Box<dyn AudioDevice> {
    let config = recorder.config();
    let (timeout, retry) = (config.poll_timeout(), config.audio_retry_delay());
    let mut errors = ErrorRun::default();

    while running.load(Ordering::Acquire) {
        let fx = recorder.audio_fx();
        let packet = match device.next_buffer(format, fx, timeout) {
            Ok(Some(buffer)) => {
                let ts = i64::try_from(buffer.timestamp.as_nanos()).unwrap_or(i64::MAX);
                Packet::clone_from(&buffer.data, ts, ts, PacketFlags::empty())
            }
            Ok(None) => continue,
            Err(e) => {
                errors.failed("audio buffer", &e);
                thread::sleep(retry);
                continue;
            }
        };
        errors.succeeded("audio buffer");

        fail!("audio_loop::buffer");

        recorder.forward_audio(packet);
    }

    device
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_returns_loop_result() {
        let thread = CaptureThread::spawn("counter", |running| {
            let mut n = 0u32;
            while running.load(Ordering::Acquire) {
                n += 1;
                thread::sleep(Duration::from_millis(1));
            }
            n
        })
        .unwrap();

        thread::sleep(Duration::from_millis(10));
        assert!(thread.is_running());
        assert!(thread.stop().unwrap() > 0);
    }

    #[test]
    fn panic_becomes_error() {
        let thread = CaptureThread::spawn("boom", |_| -> u32 { panic!("device gone") }).unwrap();

        match thread.stop() {
            Err(RecordingError::ThreadPanicked("boom", msg)) => {
                assert_eq!(msg, "Panicked: device gone")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drop_joins_the_thread() {
        let finished = Arc::new(AtomicBool::new(false));
        let thread = CaptureThread::spawn("dropped", {
            let finished = finished.clone();
            move |running| {
                while running.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
                finished.store(true, Ordering::Release);
            }
        })
        .unwrap();

        drop(thread);
        assert!(finished.load(Ordering::Acquire));
    }
}
