use std::{
    fmt,
    path::PathBuf,
    time::{Duration, SystemTime},
};
use tracing::{debug, error, info, warn};

/// Status notices for whoever drives the pipeline, e.g. a status bar.
#[derive(Clone, Debug, PartialEq)]
pub enum RecorderEvent {
    CaptureStarted { device: String },
    CaptureFailed(String),
    SnapshotSaved(PathBuf),
    SnapshotFailed(String),
    RecordingStarted(PathBuf),
    RecordingFailed(String),
    RecordingStopped {
        path: PathBuf,
        /// Wall-clock time the session was opened.
        started_at: SystemTime,
        /// Span between the first and last video packet written.
        duration: Duration,
        video_packets: u64,
        audio_packets: u64,
        write_failures: u64,
    },
    AudioUnavailable(String),
}

impl fmt::Display for RecorderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureStarted { device } => write!(f, "Capturing from {device}"),
            Self::CaptureFailed(reason) => write!(f, "Capture failed: {reason}"),
            Self::SnapshotSaved(path) => write!(f, "Saved snapshot to {}", path.display()),
            Self::SnapshotFailed(reason) => write!(f, "Failed to save snapshot: {reason}"),
            Self::RecordingStarted(path) => write!(f, "Recording to {}", path.display()),
            Self::RecordingFailed(reason) => write!(f, "Failed to start recording: {reason}"),
            Self::RecordingStopped { path, .. } => write!(f, "Video saved to {}", path.display()),
            Self::AudioUnavailable(reason) => {
                write!(f, "Recording without audio: {reason}")
            }
        }
    }
}

/// Lossy event sink. Events are dropped rather than blocking a capture
/// thread when nobody drains the channel.
#[derive(Clone)]
pub(crate) struct EventSender(flume::Sender<RecorderEvent>);

impl EventSender {
    pub fn new(tx: flume::Sender<RecorderEvent>) -> Self {
        Self(tx)
    }

    pub fn emit(&self, event: RecorderEvent) {
        match &event {
            RecorderEvent::CaptureFailed(_)
            | RecorderEvent::SnapshotFailed(_)
            | RecorderEvent::RecordingFailed(_) => error!("{event}"),
            RecorderEvent::AudioUnavailable(_) => warn!("{event}"),
            _ => info!("{event}"),
        }

        if let Err(flume::TrySendError::Full(event)) = self.0.try_send(event) {
            debug!("Event channel full, dropping '{event}'");
        }
    }
}
