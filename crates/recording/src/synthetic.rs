//! Generated sources for running the pipeline without hardware.

use camrec_timestamp::Timestamp;
use std::{
    f64::consts::TAU,
    thread,
    time::{Duration, Instant},
};

use crate::{
    device::{
        AudioBuffer, AudioDevice, AudioFx, PixelFormat, SampleFormat, VideoDevice, VideoFrame,
        VideoParams, yu12_frame_size,
    },
    error::DeviceError,
};

/// Sleeps until `due`, or for at most `timeout`. Returns `false` when the
/// timeout ran out first.
fn wait_until(due: Instant, timeout: Duration) -> bool {
    let wait = due.saturating_duration_since(Instant::now());
    if wait > timeout {
        thread::sleep(timeout);
        return false;
    }
    if !wait.is_zero() {
        thread::sleep(wait);
    }
    true
}

/// Stream time of sample frame `frames` at `sample_rate`.
fn sample_offset(frames: u64, sample_rate: u32) -> Duration {
    let rate = u64::from(sample_rate.max(1));
    Duration::from_secs(frames / rate)
        + Duration::from_nanos(frames % rate * 1_000_000_000 / rate)
}

#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    /// Reported frame rate. Zero reports an unknown rate and paces at 30.
    pub fps: u32,
    pub keyframe_interval: u64,
    /// Stop producing frames after this many.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            keyframe_interval: 30,
            frame_limit: None,
        }
    }
}

/// A YU12 test pattern that scrolls one step per frame.
pub struct SyntheticCamera {
    name: String,
    config: SyntheticCameraConfig,
    streaming: bool,
    closed: bool,
    started: Option<Instant>,
    frames: u64,
    spare: Vec<VideoFrame>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Self {
        Self {
            name: format!("Synthetic camera {}x{}", config.width, config.height),
            config,
            streaming: false,
            closed: false,
            started: None,
            frames: 0,
            spare: vec![],
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames
    }

    fn frame_interval(&self) -> Duration {
        let fps = if self.config.fps == 0 { 30 } else { self.config.fps };
        Duration::from_secs(1) / fps
    }

    fn fill(&self, frame: &mut VideoFrame) {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let shift = (self.frames * 4) as usize;

        frame.width = self.config.width;
        frame.height = self.config.height;
        frame.timestamp = Timestamp::now();
        frame.is_keyframe = self.frames % self.config.keyframe_interval.max(1) == 0;

        frame.decoded.clear();
        frame.decoded.reserve(yu12_frame_size(self.config.width, self.config.height));
        for y in 0..h {
            frame
                .decoded
                .extend((0..w).map(|x| ((x + y + shift) & 0xff) as u8));
        }
        frame
            .decoded
            .resize(yu12_frame_size(self.config.width, self.config.height), 128);

        frame.raw.clear();
        frame.raw.extend_from_slice(&frame.decoded);
    }
}

impl VideoDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> VideoParams {
        VideoParams {
            width: self.config.width,
            height: self.config.height,
            pixel_format: PixelFormat::Yu12,
            fps_num: self.config.fps as i32,
            fps_den: 1,
        }
    }

    fn start_stream(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.streaming = true;
        self.started = Some(Instant::now());
        self.frames = 0;
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Option<VideoFrame>, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        let Some(started) = self.started.filter(|_| self.streaming) else {
            return Err(DeviceError::NotStreaming);
        };

        if self.config.frame_limit.is_some_and(|limit| self.frames >= limit) {
            thread::sleep(timeout);
            return Ok(None);
        }

        let due = started + self.frame_interval() * u32::try_from(self.frames).unwrap_or(u32::MAX);
        if !wait_until(due, timeout) {
            return Ok(None);
        }

        let mut frame = self.spare.pop().unwrap_or_default();
        self.fill(&mut frame);
        self.frames += 1;

        Ok(Some(frame))
    }

    fn release(&mut self, frame: VideoFrame) {
        self.spare.push(frame);
    }

    fn close(&mut self) {
        self.streaming = false;
        self.closed = true;
        self.spare.clear();
    }
}

/// A sine tone generator.
pub struct SyntheticMicrophone {
    name: String,
    available: bool,
    channels: u16,
    sample_rate: u32,
    latency: Duration,
    buffer_samples: usize,
    tone_hz: f64,
    phase: f64,
    started: Option<Instant>,
    buffers: u64,
    buffer: AudioBuffer,
}

impl Default for SyntheticMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMicrophone {
    /// Channel count and sample rate start unset.
    pub fn new() -> Self {
        Self {
            name: "Synthetic microphone".to_string(),
            available: true,
            channels: 0,
            sample_rate: 0,
            latency: Duration::from_millis(20),
            buffer_samples: 0,
            tone_hz: 440.0,
            phase: 0.0,
            started: None,
            buffers: 0,
            buffer: AudioBuffer::default(),
        }
    }

    /// A device whose backend could not be opened.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_format(mut self, channels: u16, sample_rate: u32) -> Self {
        self.channels = channels;
        self.sample_rate = sample_rate;
        self
    }

    pub fn buffers_delivered(&self) -> u64 {
        self.buffers
    }

    fn fill(&mut self, format: SampleFormat, fx: AudioFx) {
        let channels = usize::from(self.channels);
        let frames = self.buffer_samples / channels;
        let step = TAU * self.tone_hz / f64::from(self.sample_rate);

        self.buffer.format = format;
        self.buffer.timestamp = Timestamp::now();
        self.buffer.data.clear();
        self.buffer
            .data
            .reserve(frames * channels * format.bytes_per_sample());

        for _ in 0..frames {
            let mut sample = self.phase.sin() * 0.25;
            if fx.contains(AudioFx::FUZZ) {
                sample = sample.signum() * 0.25;
            }
            self.phase = (self.phase + step) % TAU;

            for _ in 0..channels {
                match format {
                    SampleFormat::F32 => self
                        .buffer
                        .data
                        .extend_from_slice(&(sample as f32).to_le_bytes()),
                    SampleFormat::S16 => self
                        .buffer
                        .data
                        .extend_from_slice(&((sample * f64::from(i16::MAX)) as i16).to_le_bytes()),
                }
            }
        }
    }
}

impl AudioDevice for SyntheticMicrophone {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_channels(&mut self, channels: u16) {
        self.channels = channels;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn latency(&self) -> Duration {
        self.latency
    }

    fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    fn set_device_index(&mut self, index: Option<usize>) -> Result<(), DeviceError> {
        match index {
            None | Some(0) => Ok(()),
            Some(i) => Err(DeviceError::Unreachable(format!("audio device #{i}"))),
        }
    }

    fn set_capture_buffer_size(&mut self, samples: usize) {
        self.buffer_samples = samples;
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if !self.available {
            return Err(DeviceError::Unreachable(self.name.clone()));
        }
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(DeviceError::Format(format!(
                "{} channels at {} Hz",
                self.channels, self.sample_rate
            )));
        }
        if self.buffer_samples < usize::from(self.channels) {
            self.buffer_samples = 1024 * usize::from(self.channels);
        }

        self.started = Some(Instant::now());
        self.buffers = 0;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = None;
    }

    fn next_buffer(
        &mut self,
        format: SampleFormat,
        fx: AudioFx,
        timeout: Duration,
    ) -> Result<Option<&AudioBuffer>, DeviceError> {
        let Some(started) = self.started else {
            return Err(DeviceError::NotStreaming);
        };

        let frames = (self.buffer_samples / usize::from(self.channels)) as u64;
        let offset = sample_offset(frames.saturating_mul(self.buffers), self.sample_rate);
        let due = started.checked_add(offset).unwrap_or_else(Instant::now);
        if !wait_until(due, timeout) {
            return Ok(None);
        }

        self.fill(format, fx);
        self.buffers += 1;

        Ok(Some(&self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_requires_streaming() {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig::default());
        assert!(matches!(
            camera.next_frame(Duration::from_millis(1)),
            Err(DeviceError::NotStreaming)
        ));

        camera.close();
        assert!(matches!(camera.start_stream(), Err(DeviceError::Closed)));
    }

    #[test]
    fn camera_delivers_sized_frames_until_limit() {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig {
            width: 8,
            height: 4,
            fps: 200,
            keyframe_interval: 2,
            frame_limit: Some(3),
        });
        camera.start_stream().unwrap();

        let mut frames = vec![];
        for _ in 0..20 {
            if let Some(frame) = camera.next_frame(Duration::from_millis(10)).unwrap() {
                frames.push((frame.is_keyframe, frame.decoded.len(), frame.raw.len()));
                camera.release(frame);
            }
        }

        assert_eq!(frames, vec![(true, 48, 48), (false, 48, 48), (true, 48, 48)]);
        assert_eq!(camera.frames_delivered(), 3);
    }

    #[test]
    fn microphone_fills_requested_buffer() {
        let mut mic = SyntheticMicrophone::new().with_format(2, 8000);
        mic.set_capture_buffer_size(64 * 2);
        mic.start().unwrap();

        let buffer = loop {
            if let Some(buffer) = mic
                .next_buffer(SampleFormat::S16, AudioFx::empty(), Duration::from_millis(50))
                .unwrap()
            {
                break buffer.clone();
            }
        };

        assert_eq!(buffer.format, SampleFormat::S16);
        assert_eq!(buffer.data.len(), 64 * 2 * 2);
        assert_eq!(mic.buffers_delivered(), 1);
    }

    #[test]
    fn sample_offset_is_exact_and_does_not_overflow() {
        assert_eq!(sample_offset(48_000, 48_000), Duration::from_secs(1));
        assert_eq!(sample_offset(12_000, 48_000), Duration::from_millis(250));
        assert_eq!(
            sample_offset(u64::MAX, 192_000),
            Duration::from_secs(u64::MAX / 192_000)
                + Duration::from_nanos(u64::MAX % 192_000 * 1_000_000_000 / 192_000)
        );
        assert!(sample_offset(u64::MAX, 1) > Duration::from_secs(u64::MAX - 1));
    }

    #[test]
    fn microphone_needs_format_and_backend() {
        let mut mic = SyntheticMicrophone::new();
        assert!(matches!(mic.start(), Err(DeviceError::Format(_))));

        let mut mic = SyntheticMicrophone::unavailable().with_format(1, 8000);
        assert!(!mic.is_available());
        assert!(matches!(mic.start(), Err(DeviceError::Unreachable(_))));
        assert!(mic.set_device_index(Some(3)).is_err());
    }
}
