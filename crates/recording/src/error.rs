use std::{borrow::Cow, path::PathBuf};
use thiserror::Error;

use crate::snapshot::SnapshotError;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device {0} is unreachable. It may have been disconnected")]
    Unreachable(String),

    #[error("Could not negotiate a capture format: {0}")]
    Format(String),

    #[error("Invalid resolution {width}x{height} reported by device")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Device is not streaming")]
    NotStreaming,

    #[error("Device has been closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to initialise encoder: {0}")]
    Init(Cow<'static, str>),

    #[error("Failed to open output '{}': {source}", path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output is not open")]
    NotOpen,

    #[error("Failed to write {0}")]
    Write(Cow<'static, str>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Device/{0}")]
    Device(#[from] DeviceError),

    #[error("Encoder/{0}")]
    Encoder(#[from] EncoderError),

    #[error("Snapshot/{0}")]
    Snapshot(#[from] SnapshotError),

    #[error("A recording is already active")]
    AlreadyRecording,

    #[error("The audio device is held by an active recording")]
    AudioBusy,

    #[error("No audio device is configured")]
    NoAudioDevice,

    #[error("Capture thread '{0}' panicked: {1}")]
    ThreadPanicked(&'static str, String),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
