//! The device layer the capture threads poll. Drivers live outside this
//! crate; they plug in by implementing [`VideoDevice`] and [`AudioDevice`].

use bitflags::bitflags;
use camrec_timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DeviceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuyv,
    Yu12,
    Mjpeg,
    H264,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub fps_num: i32,
    pub fps_den: i32,
}

impl VideoParams {
    /// The device's frame rate, or `fallback` when it reports a non-positive
    /// numerator or denominator.
    pub fn frame_rate_or(&self, fallback: (i32, i32)) -> (i32, i32) {
        if self.fps_num <= 0 || self.fps_den <= 0 {
            fallback
        } else {
            (self.fps_num, self.fps_den)
        }
    }

    pub fn has_valid_resolution(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Size in bytes of a planar 4:2:0 image.
pub fn yu12_frame_size(width: u32, height: u32) -> usize {
    (width as usize * height as usize * 3) / 2
}

/// One frame as handed out by a [`VideoDevice`]. The device expects it back
/// through [`VideoDevice::release`] so it can recycle the buffers.
#[derive(Clone, Debug, Default)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp: Timestamp,
    pub is_keyframe: bool,
    /// Decoded planar YU12 (I420) image.
    pub decoded: Vec<u8>,
    /// The payload exactly as the device delivered it (H.264 bitstream,
    /// MJPEG, YUYV, ...).
    pub raw: Vec<u8>,
}

impl VideoFrame {
    pub fn decoded_size(&self) -> usize {
        yu12_frame_size(self.width, self.height).min(self.decoded.len())
    }
}

pub trait VideoDevice: Send {
    fn name(&self) -> &str;

    fn params(&self) -> VideoParams;

    fn start_stream(&mut self) -> Result<(), DeviceError>;

    fn stop_stream(&mut self);

    fn is_streaming(&self) -> bool;

    /// Waits up to `timeout` for the next frame. `Ok(None)` means nothing
    /// arrived in time and is not an error.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<VideoFrame>, DeviceError>;

    fn release(&mut self, frame: VideoFrame);

    fn close(&mut self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    F32,
    S16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::S16 => 2,
        }
    }
}

bitflags! {
    /// Effects the audio device applies before handing a buffer out.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AudioFx: u32 {
        const ECHO = 1 << 0;
        const REVERB = 1 << 1;
        const FUZZ = 1 << 2;
        const WAHWAH = 1 << 3;
        const DUCKY = 1 << 4;
    }
}

#[derive(Clone, Debug, Default)]
pub struct AudioBuffer {
    /// Interleaved samples in `format`.
    pub data: Vec<u8>,
    pub format: SampleFormat,
    pub timestamp: Timestamp,
}

pub trait AudioDevice: Send {
    fn name(&self) -> &str;

    /// `false` when no audio backend could be opened.
    fn is_available(&self) -> bool;

    /// `0` when the device has not settled on a channel count.
    fn channels(&self) -> u16;

    fn set_channels(&mut self, channels: u16);

    /// `0` when the device has not settled on a rate.
    fn sample_rate(&self) -> u32;

    fn set_sample_rate(&mut self, sample_rate: u32);

    fn latency(&self) -> Duration;

    fn set_latency(&mut self, latency: Duration);

    fn set_device_index(&mut self, index: Option<usize>) -> Result<(), DeviceError>;

    /// Capture buffer size in samples across all channels.
    fn set_capture_buffer_size(&mut self, samples: usize);

    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self);

    /// Waits up to `timeout` for the next buffer. The buffer stays owned by
    /// the device and is only valid until the next call.
    fn next_buffer(
        &mut self,
        format: SampleFormat,
        fx: AudioFx,
        timeout: Duration,
    ) -> Result<Option<&AudioBuffer>, DeviceError>;
}
