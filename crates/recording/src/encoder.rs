//! The encoder/multiplexer the recorder drives. Codecs and container byte
//! layout are the backend's business; the recorder only hands it packets in
//! timestamp order.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    device::{PixelFormat, SampleFormat, VideoFrame},
    error::EncoderError,
    packet::Packet,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// Forward the device payload untouched.
    #[default]
    Passthrough,
    Mjpeg,
    H264,
    Vp8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mkv,
    Webm,
    Avi,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Avi => "avi",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioStreamParams {
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub input_format: PixelFormat,
    pub video_codec: VideoCodec,
    pub container: Container,
    pub width: u32,
    pub height: u32,
    pub fps_num: i32,
    pub fps_den: i32,
    pub audio: Option<AudioStreamParams>,
}

/// Picks the bytes of `frame` that `codec` consumes: the untouched device
/// payload for pass-through, the decoded YU12 image otherwise.
pub fn video_payload(codec: VideoCodec, frame: &VideoFrame) -> &[u8] {
    match codec {
        VideoCodec::Passthrough => &frame.raw,
        _ => &frame.decoded[..frame.decoded_size()],
    }
}

pub trait MediaEncoder: Send {
    fn open_output(&mut self, path: &Path) -> Result<(), EncoderError>;

    fn write_video_unit(&mut self, packet: Packet) -> Result<(), EncoderError>;

    fn write_audio_unit(&mut self, packet: Packet) -> Result<(), EncoderError>;

    fn flush_video(&mut self) -> Result<(), EncoderError>;

    fn flush_audio(&mut self) -> Result<(), EncoderError>;

    fn close_output(&mut self) -> Result<(), EncoderError>;

    fn has_audio(&self) -> bool;

    /// Samples per channel the audio encoder consumes per frame.
    fn audio_frame_size(&self) -> usize;

    fn audio_sample_format(&self) -> SampleFormat;
}

pub trait EncoderBackend: Send + Sync {
    fn init(&self, config: &EncoderConfig) -> Result<Box<dyn MediaEncoder>, EncoderError>;
}
