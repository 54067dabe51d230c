//! Recording session control shared by the capture threads.
//!
//! Requests arrive as [`Command`]s and are acted on by the video thread
//! between frames. The video thread is the only one that starts or stops a
//! session; the audio thread only ever appends packets to the active one.

use camrec_fail::fail_err;
use camrec_timestamp::Timestamps;
use chrono::Local;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    capture::{CaptureThread, run_audio_loop},
    config::RecorderConfig,
    device::{AudioDevice, AudioFx, VideoFrame, VideoParams},
    encoder::{AudioStreamParams, EncoderBackend, EncoderConfig, video_payload},
    error::{EncoderError, RecordingError},
    events::{EventSender, RecorderEvent},
    feeder::MuxFeeder,
    packet::{Packet, PacketFlags},
    paths::{self, OutputKind},
    session::{ActiveSession, RecordingState, RecordingSummary, SessionInfo},
    snapshot::SnapshotWriter,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    StartRecording,
    StopRecording,
    /// Start or stop, decided against the recording state when the command
    /// is applied rather than when it was sent.
    ToggleRecording,
}

/// What the video thread acts on for a single frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Round {
    pub snapshot: bool,
    pub transition: Option<Command>,
}

/// Pending commands for the video thread. Snapshot requests that pile up
/// between frames collapse into one; start and stop requests are applied one
/// per frame in the order they were made.
pub(crate) struct CommandInbox {
    rx: flume::Receiver<Command>,
    stash: VecDeque<Command>,
}

impl CommandInbox {
    pub fn new(rx: flume::Receiver<Command>) -> Self {
        Self {
            rx,
            stash: VecDeque::new(),
        }
    }

    pub fn next_round(&mut self) -> Round {
        self.stash.extend(self.rx.try_iter());

        let before = self.stash.len();
        self.stash.retain(|c| *c != Command::Snapshot);

        Round {
            snapshot: self.stash.len() != before,
            transition: self.stash.pop_front(),
        }
    }
}

enum AudioSlot {
    Empty,
    Idle(Box<dyn AudioDevice>),
    Capturing,
}

pub(crate) struct Recorder {
    config: RecorderConfig,
    encoders: Arc<dyn EncoderBackend>,
    snapshots: Arc<dyn SnapshotWriter>,
    events: EventSender,
    recording: AtomicBool,
    state: RwLock<RecordingState>,
    /// The encoder lock. Held for every packet written and for the final
    /// flush, so writes from both capture threads never interleave.
    session: Mutex<Option<ActiveSession>>,
    audio: Mutex<AudioSlot>,
    audio_capture: Mutex<Option<CaptureThread<Box<dyn AudioDevice>>>>,
    audio_fx: AtomicU32,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        encoders: Arc<dyn EncoderBackend>,
        snapshots: Arc<dyn SnapshotWriter>,
        audio: Option<Box<dyn AudioDevice>>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            encoders,
            snapshots,
            events,
            recording: AtomicBool::new(false),
            state: RwLock::new(RecordingState::Idle),
            session: Mutex::new(None),
            audio: Mutex::new(audio.map_or(AudioSlot::Empty, AudioSlot::Idle)),
            audio_capture: Mutex::new(None),
            audio_fx: AtomicU32::new(AudioFx::empty().bits()),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.lock().as_ref().map(|s| s.info.clone())
    }

    pub fn take_snapshot(&self, frame: &VideoFrame) {
        let path = paths::output_path(
            &paths::output_dir(OutputKind::Snapshot, self.config.snapshot_dir.as_deref()),
            &self.config.file_prefix,
            self.snapshots.extension(),
            Local::now(),
        );

        let res = path.map_err(RecordingError::from).and_then(|path| {
            self.snapshots.save(frame, &path)?;
            Ok(path)
        });

        match res {
            Ok(path) => self.events.emit(RecorderEvent::SnapshotSaved(path)),
            Err(e) => self.events.emit(RecorderEvent::SnapshotFailed(e.to_string())),
        }
    }

    /// Opens a new session sized from `frame`. On failure the recorder is
    /// left idle and a [`RecorderEvent::RecordingFailed`] is emitted.
    pub fn start_recording(
        self: &Arc<Self>,
        frame: &VideoFrame,
        params: &VideoParams,
    ) -> Result<PathBuf, RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }

        *self.state.write() = RecordingState::Starting;

        match self.open_session(frame, params) {
            Ok((path, with_audio)) => {
                self.recording.store(true, Ordering::Release);
                *self.state.write() = RecordingState::Active;

                if with_audio {
                    self.start_audio_capture();
                }

                self.events
                    .emit(RecorderEvent::RecordingStarted(path.clone()));
                Ok(path)
            }
            Err(e) => {
                *self.state.write() = RecordingState::Idle;
                self.events
                    .emit(RecorderEvent::RecordingFailed(e.to_string()));
                Err(e)
            }
        }
    }

    fn open_session(
        &self,
        frame: &VideoFrame,
        params: &VideoParams,
    ) -> Result<(PathBuf, bool), RecordingError> {
        let (fps_num, fps_den) = params.frame_rate_or(self.config.fallback_fps);
        let (width, height) = if frame.width > 0 && frame.height > 0 {
            (frame.width, frame.height)
        } else {
            (params.width, params.height)
        };

        let encoder_config = EncoderConfig {
            input_format: params.pixel_format,
            video_codec: self.config.video_codec,
            container: self.config.container,
            width,
            height,
            fps_num,
            fps_den,
            audio: self.resolve_audio_params(),
        };

        let mut session = self.session.lock();
        if session.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        fail_err!(
            "recorder::encoder_init",
            EncoderError::Init("injected failure".into())
        );
        let mut encoder = self.encoders.init(&encoder_config)?;

        let path = paths::output_path(
            &paths::output_dir(OutputKind::Video, self.config.video_dir.as_deref()),
            &self.config.file_prefix,
            self.config.container.extension(),
            Local::now(),
        )?;

        fail_err!("recorder::open_output", EncoderError::NotOpen);
        encoder.open_output(&path)?;

        let feeder = MuxFeeder::new(encoder, &self.config);
        let with_audio = feeder.has_audio();

        info!(
            "Opened {}x{} @ {fps_num}/{fps_den} session, audio: {:?}",
            width, height, encoder_config.audio
        );

        *session = Some(ActiveSession {
            info: SessionInfo {
                output_path: path.clone(),
                encoder: encoder_config,
                started: Timestamps::now(),
            },
            feeder,
        });

        Ok((path, with_audio))
    }

    /// Channel count and rate for the audio stream, or `None` when the
    /// session should be video-only. Unset values fall back to the
    /// configured defaults and are written back to the device.
    fn resolve_audio_params(&self) -> Option<AudioStreamParams> {
        let mut slot = self.audio.lock();
        let AudioSlot::Idle(device) = &mut *slot else {
            return None;
        };

        if !device.is_available() {
            debug!("Audio device '{}' unavailable, recording video only", device.name());
            return None;
        }

        if device.channels() == 0 {
            device.set_channels(self.config.fallback_audio_channels);
        }
        if device.sample_rate() == 0 {
            device.set_sample_rate(self.config.fallback_audio_sample_rate);
        }

        Some(AudioStreamParams {
            channels: device.channels(),
            sample_rate: device.sample_rate(),
        })
    }

    fn start_audio_capture(self: &Arc<Self>) {
        let (frame_size, format) = {
            let session = self.session.lock();
            match session.as_ref() {
                Some(active) if active.feeder.has_audio() => (
                    active.feeder.audio_frame_size(),
                    active.feeder.audio_sample_format(),
                ),
                _ => return,
            }
        };

        let mut slot = self.audio.lock();
        let mut device = match std::mem::replace(&mut *slot, AudioSlot::Capturing) {
            AudioSlot::Idle(device) => device,
            other => {
                *slot = other;
                return;
            }
        };

        let channels = match device.channels() {
            0 => self.config.fallback_audio_channels,
            n => n,
        };
        device.set_capture_buffer_size(frame_size * usize::from(channels));

        if let Err(e) = device.start() {
            *slot = AudioSlot::Idle(device);
            self.events
                .emit(RecorderEvent::AudioUnavailable(e.to_string()));
            return;
        }

        let recorder = self.clone();
        match CaptureThread::spawn("audio", move |running| {
            run_audio_loop(device, running, recorder, format)
        }) {
            Ok(thread) => *self.audio_capture.lock() = Some(thread),
            Err(e) => {
                *slot = AudioSlot::Empty;
                self.events
                    .emit(RecorderEvent::AudioUnavailable(e.to_string()));
            }
        }
    }

    fn stop_audio_capture(&self) {
        let Some(thread) = self.audio_capture.lock().take() else {
            return;
        };

        match thread.stop() {
            Ok(mut device) => {
                device.stop();
                *self.audio.lock() = AudioSlot::Idle(device);
            }
            Err(e) => {
                error!("Audio capture ended abnormally: {e}");
                *self.audio.lock() = AudioSlot::Empty;
            }
        }
    }

    pub fn forward_video(&self, frame: &VideoFrame) {
        let ts = i64::try_from(frame.timestamp.as_nanos()).unwrap_or(i64::MAX);
        let flags = if frame.is_keyframe {
            PacketFlags::KEYFRAME
        } else {
            PacketFlags::empty()
        };
        let packet = Packet::clone_from(
            video_payload(self.config.video_codec, frame),
            ts,
            ts,
            flags,
        );

        if let Some(active) = self.session.lock().as_mut() {
            active.feeder.push_video(packet);
        }
    }

    pub fn forward_audio(&self, packet: Packet) {
        if let Some(active) = self.session.lock().as_mut() {
            active.feeder.push_audio(packet);
        }
    }

    /// Ends the active session: stops audio capture, then writes out every
    /// queued packet and closes the output under the encoder lock. Does
    /// nothing when no session is active.
    pub fn stop_recording(&self) -> Option<RecordingSummary> {
        if !self.recording.swap(false, Ordering::AcqRel) {
            return None;
        }

        *self.state.write() = RecordingState::Stopping;

        self.stop_audio_capture();

        let summary = {
            let mut session = self.session.lock();
            session.take().map(ActiveSession::finish)
        };

        *self.state.write() = RecordingState::Idle;

        let summary = summary?;
        info!(
            "Recording finished after {:.2}s of video",
            summary.duration.as_secs_f64()
        );
        self.events.emit(RecorderEvent::RecordingStopped {
            path: summary.output_path.clone(),
            started_at: summary.started_at,
            duration: summary.duration,
            video_packets: summary.stats.video_written,
            audio_packets: summary.stats.audio_written,
            write_failures: summary.stats.write_failures,
        });

        Some(summary)
    }

    pub fn audio_fx(&self) -> AudioFx {
        AudioFx::from_bits_truncate(self.audio_fx.load(Ordering::Relaxed))
    }

    pub fn set_audio_fx(&self, fx: AudioFx) {
        self.audio_fx.store(fx.bits(), Ordering::Relaxed);
    }

    /// Runs `f` on the audio device while no session is capturing from it.
    pub fn with_idle_audio<R>(
        &self,
        f: impl FnOnce(&mut dyn AudioDevice) -> R,
    ) -> Result<R, RecordingError> {
        match &mut *self.audio.lock() {
            AudioSlot::Idle(device) => Ok(f(device.as_mut())),
            AudioSlot::Capturing => Err(RecordingError::AudioBusy),
            AudioSlot::Empty => Err(RecordingError::NoAudioDevice),
        }
    }

    /// Swaps in `device`, returning the previous one.
    pub fn replace_audio_device(
        &self,
        device: Option<Box<dyn AudioDevice>>,
    ) -> Result<Option<Box<dyn AudioDevice>>, RecordingError> {
        let mut slot = self.audio.lock();
        if matches!(*slot, AudioSlot::Capturing) {
            return Err(RecordingError::AudioBusy);
        }

        let next = device.map_or(AudioSlot::Empty, AudioSlot::Idle);
        match std::mem::replace(&mut *slot, next) {
            AudioSlot::Idle(previous) => Ok(Some(previous)),
            _ => Ok(None),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.session.get_mut().is_some() {
            warn!("Recorder dropped with an open session, finishing it");
            self.stop_recording();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbox(commands: &[Command]) -> CommandInbox {
        let (tx, rx) = flume::unbounded();
        for command in commands {
            tx.send(*command).unwrap();
        }
        CommandInbox::new(rx)
    }

    #[test]
    fn repeated_snapshots_collapse() {
        let mut inbox = inbox(&[Command::Snapshot, Command::Snapshot, Command::Snapshot]);

        assert_eq!(
            inbox.next_round(),
            Round {
                snapshot: true,
                transition: None
            }
        );
        assert_eq!(inbox.next_round(), Round::default());
    }

    #[test]
    fn one_transition_per_round_in_request_order() {
        let mut inbox = inbox(&[
            Command::StartRecording,
            Command::Snapshot,
            Command::StopRecording,
        ]);

        assert_eq!(
            inbox.next_round(),
            Round {
                snapshot: true,
                transition: Some(Command::StartRecording)
            }
        );
        assert_eq!(
            inbox.next_round(),
            Round {
                snapshot: false,
                transition: Some(Command::StopRecording)
            }
        );
        assert_eq!(inbox.next_round(), Round::default());
    }

    #[test]
    fn back_to_back_toggles_are_separate_transitions() {
        let mut inbox = inbox(&[Command::ToggleRecording, Command::ToggleRecording]);

        for _ in 0..2 {
            assert_eq!(
                inbox.next_round(),
                Round {
                    snapshot: false,
                    transition: Some(Command::ToggleRecording)
                }
            );
        }
        assert_eq!(inbox.next_round(), Round::default());
    }
}
