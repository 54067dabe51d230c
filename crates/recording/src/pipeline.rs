use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    capture::{CaptureThread, VideoLoop},
    config::RecorderConfig,
    controller::{Command, CommandInbox, Recorder},
    device::{AudioDevice, AudioFx, VideoDevice},
    dump::PacketDumpBackend,
    encoder::EncoderBackend,
    error::{DeviceError, RecordingError},
    events::{EventSender, RecorderEvent},
    preview::{FrameNotifier, PreviewBuffer},
    session::{RecordingState, SessionInfo},
    snapshot::{JpegSnapshotWriter, SnapshotWriter},
};

const EVENT_CAPACITY: usize = 64;

pub struct NoVideo;
pub struct HasVideo(Box<dyn VideoDevice>);

pub struct PipelineBuilder<TVideo> {
    config: RecorderConfig,
    video: TVideo,
    audio: Option<Box<dyn AudioDevice>>,
    encoders: Option<Arc<dyn EncoderBackend>>,
    snapshots: Option<Arc<dyn SnapshotWriter>>,
}

impl PipelineBuilder<NoVideo> {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            video: NoVideo,
            audio: None,
            encoders: None,
            snapshots: None,
        }
    }

    pub fn with_video(self, device: impl VideoDevice + 'static) -> PipelineBuilder<HasVideo> {
        PipelineBuilder {
            config: self.config,
            video: HasVideo(Box::new(device)),
            audio: self.audio,
            encoders: self.encoders,
            snapshots: self.snapshots,
        }
    }
}

impl<TVideo> PipelineBuilder<TVideo> {
    pub fn with_audio(mut self, device: impl AudioDevice + 'static) -> Self {
        self.audio = Some(Box::new(device));
        self
    }

    /// Defaults to [`PacketDumpBackend`].
    pub fn with_encoder(mut self, backend: impl EncoderBackend + 'static) -> Self {
        self.encoders = Some(Arc::new(backend));
        self
    }

    /// Defaults to a [`JpegSnapshotWriter`] at the configured quality.
    pub fn with_snapshot_writer(mut self, writer: impl SnapshotWriter + 'static) -> Self {
        self.snapshots = Some(Arc::new(writer));
        self
    }
}

impl PipelineBuilder<HasVideo> {
    /// Starts streaming from the video device and spawns its capture thread.
    pub fn start(self) -> Result<CapturePipeline, RecordingError> {
        let snapshots: Arc<dyn SnapshotWriter> = match self.snapshots {
            Some(writer) => writer,
            None => Arc::new(JpegSnapshotWriter::new(self.config.snapshot_quality)),
        };
        let encoders: Arc<dyn EncoderBackend> = match self.encoders {
            Some(backend) => backend,
            None => Arc::new(PacketDumpBackend),
        };

        let (events_tx, events_rx) = flume::bounded(EVENT_CAPACITY);
        let (commands_tx, commands_rx) = flume::unbounded();
        let (frames_tx, frames_rx) = flume::bounded(1);

        let recorder = Arc::new(Recorder::new(
            self.config,
            encoders,
            snapshots,
            self.audio,
            EventSender::new(events_tx),
        ));

        let mut pipeline = CapturePipeline {
            recorder,
            commands: commands_tx,
            command_rx: commands_rx,
            events: events_rx,
            frames: frames_rx,
            notifier: FrameNotifier::new(frames_tx),
            preview: Arc::new(PreviewBuffer::default()),
            video: None,
        };

        pipeline.launch_video(self.video.0)?;

        Ok(pipeline)
    }
}

/// A running capture pipeline: one video thread plus, while a recording with
/// audio is active, one audio thread.
///
/// Requests made through this handle are asynchronous. They are picked up by
/// the video thread on its next frame and their outcome is reported through
/// [`CapturePipeline::events`].
pub struct CapturePipeline {
    recorder: Arc<Recorder>,
    commands: flume::Sender<Command>,
    command_rx: flume::Receiver<Command>,
    events: flume::Receiver<RecorderEvent>,
    frames: flume::Receiver<()>,
    notifier: FrameNotifier,
    preview: Arc<PreviewBuffer>,
    video: Option<CaptureThread<Box<dyn VideoDevice>>>,
}

impl CapturePipeline {
    pub fn builder(config: RecorderConfig) -> PipelineBuilder<NoVideo> {
        PipelineBuilder::new(config)
    }

    fn launch_video(&mut self, mut device: Box<dyn VideoDevice>) -> Result<(), RecordingError> {
        let events = self.recorder.events().clone();

        let params = device.params();
        if !params.has_valid_resolution() {
            device.close();
            let e = DeviceError::InvalidResolution {
                width: params.width,
                height: params.height,
            };
            events.emit(RecorderEvent::CaptureFailed(e.to_string()));
            return Err(e.into());
        }

        if let Err(e) = device.start_stream() {
            device.close();
            events.emit(RecorderEvent::CaptureFailed(e.to_string()));
            return Err(e.into());
        }

        let name = device.name().to_string();
        let video_loop = VideoLoop {
            recorder: self.recorder.clone(),
            inbox: CommandInbox::new(self.command_rx.clone()),
            preview: self.preview.clone(),
            notifier: self.notifier.clone(),
        };

        self.video = Some(CaptureThread::spawn("video", move |running| {
            video_loop.run(device, running)
        })?);

        events.emit(RecorderEvent::CaptureStarted { device: name });
        Ok(())
    }

    /// Joins the video thread, finishes any active recording and closes the
    /// device.
    fn teardown(&mut self) -> Result<(), RecordingError> {
        let Some(video) = self.video.take() else {
            return Ok(());
        };

        let res = video.stop();
        self.recorder.stop_recording();

        let mut device = res?;
        device.stop_stream();
        device.close();
        debug!("Closed video device '{}'", device.name());

        Ok(())
    }

    pub fn request_snapshot(&self) {
        self.send(Command::Snapshot);
    }

    pub fn request_start_recording(&self) {
        self.send(Command::StartRecording);
    }

    /// Returns whether a recording was active when the request was made.
    pub fn request_stop_recording(&self) -> bool {
        let active = self.is_recording();
        self.send(Command::StopRecording);
        active
    }

    /// Each call flips the state once, even if several land between frames.
    pub fn toggle_recording(&self) {
        self.send(Command::ToggleRecording);
    }

    fn send(&self, command: Command) {
        // The inbox receiver lives in `self`, so this cannot disconnect.
        let _ = self.commands.send(command);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn is_capturing(&self) -> bool {
        self.video.as_ref().is_some_and(CaptureThread::is_running)
    }

    /// Details of the active recording, if any.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.recorder.session_info()
    }

    pub fn events(&self) -> flume::Receiver<RecorderEvent> {
        self.events.clone()
    }

    /// Receives a token after each captured frame.
    pub fn frame_ready(&self) -> flume::Receiver<()> {
        self.frames.clone()
    }

    pub fn preview(&self) -> Arc<PreviewBuffer> {
        self.preview.clone()
    }

    /// Tears down the current video device, finishing any active recording,
    /// and starts capturing from `device`.
    pub fn switch_device(&mut self, device: impl VideoDevice + 'static) -> Result<(), RecordingError> {
        if let Err(e) = self.teardown() {
            warn!("Previous video device did not shut down cleanly: {e}");
        }

        self.launch_video(Box::new(device))
    }

    pub fn set_audio_device(
        &self,
        device: Option<Box<dyn AudioDevice>>,
    ) -> Result<Option<Box<dyn AudioDevice>>, RecordingError> {
        self.recorder.replace_audio_device(device)
    }

    pub fn set_audio_channels(&self, channels: u16) -> Result<(), RecordingError> {
        self.recorder.with_idle_audio(|d| d.set_channels(channels))
    }

    pub fn set_audio_sample_rate(&self, sample_rate: u32) -> Result<(), RecordingError> {
        self.recorder.with_idle_audio(|d| d.set_sample_rate(sample_rate))
    }

    pub fn set_audio_latency(&self, latency: Duration) -> Result<(), RecordingError> {
        self.recorder.with_idle_audio(|d| d.set_latency(latency))
    }

    pub fn set_audio_device_index(&self, index: Option<usize>) -> Result<(), RecordingError> {
        self.recorder
            .with_idle_audio(|d| d.set_device_index(index))?
            .map_err(Into::into)
    }

    /// Applies from the next captured buffer on, including mid-recording.
    pub fn set_audio_fx(&self, fx: AudioFx) {
        self.recorder.set_audio_fx(fx);
    }

    pub fn audio_fx(&self) -> AudioFx {
        self.recorder.audio_fx()
    }

    /// Stops capturing and finishes any active recording.
    pub fn shutdown(mut self) -> Result<(), RecordingError> {
        self.teardown()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Capture pipeline shut down with error: {e}");
        }
    }
}
