#![allow(dead_code)]

use camrec_recording::{
    AudioBuffer, AudioDevice, AudioFx, DeviceError, EncoderBackend, EncoderConfig, EncoderError,
    MediaEncoder, Packet, PixelFormat, RecorderConfig, RecorderEvent, SampleFormat, VideoDevice,
    VideoFrame, VideoParams,
};
use camrec_timestamp::Timestamp;
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(2);
pub const AUDIO_FRAME_SIZE: usize = 256;

pub fn test_config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        video_dir: Some(dir.join("videos")),
        snapshot_dir: Some(dir.join("pictures")),
        poll_timeout_ms: 20,
        video_retry_delay_ms: 1,
        audio_retry_delay_ms: 1,
        ..Default::default()
    }
}

/// Waits for the first event matching `pred`, skipping others.
pub fn wait_for(
    events: &flume::Receiver<RecorderEvent>,
    pred: impl Fn(&RecorderEvent) -> bool,
) -> Option<RecorderEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

#[derive(Debug, Default)]
pub struct CameraLog {
    pub frames: u64,
    pub released: u64,
    pub stream_starts: u64,
    pub stream_stops: u64,
    pub closed: bool,
    pub calls_after_close: u64,
}

pub struct MockCamera {
    log: Arc<Mutex<CameraLog>>,
    params: VideoParams,
    streaming: bool,
    closed: bool,
}

impl MockCamera {
    pub fn new(width: u32, height: u32) -> (Self, Arc<Mutex<CameraLog>>) {
        Self::with_params(VideoParams {
            width,
            height,
            pixel_format: PixelFormat::Yu12,
            fps_num: 30,
            fps_den: 1,
        })
    }

    pub fn with_params(params: VideoParams) -> (Self, Arc<Mutex<CameraLog>>) {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        (
            Self {
                log: log.clone(),
                params,
                streaming: false,
                closed: false,
            },
            log,
        )
    }

    fn after_close(&self) {
        if self.closed {
            self.log.lock().calls_after_close += 1;
        }
    }
}

impl VideoDevice for MockCamera {
    fn name(&self) -> &str {
        "Mock camera"
    }

    fn params(&self) -> VideoParams {
        self.params
    }

    fn start_stream(&mut self) -> Result<(), DeviceError> {
        self.after_close();
        self.streaming = true;
        self.log.lock().stream_starts += 1;
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.after_close();
        self.streaming = false;
        self.log.lock().stream_stops += 1;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<VideoFrame>, DeviceError> {
        self.after_close();
        if self.closed {
            return Err(DeviceError::Closed);
        }

        thread::sleep(FRAME_INTERVAL);

        let mut log = self.log.lock();
        log.frames += 1;
        let size = (self.params.width * self.params.height * 3 / 2) as usize;

        Ok(Some(VideoFrame {
            width: self.params.width,
            height: self.params.height,
            timestamp: Timestamp::now(),
            is_keyframe: log.frames % 10 == 1,
            decoded: vec![128; size],
            raw: vec![0xab; 16],
        }))
    }

    fn release(&mut self, _frame: VideoFrame) {
        self.after_close();
        self.log.lock().released += 1;
    }

    fn close(&mut self) {
        self.after_close();
        self.closed = true;
        self.streaming = false;
        self.log.lock().closed = true;
    }
}

#[derive(Debug, Default)]
pub struct MicLog {
    pub buffers: u64,
    pub starts: u64,
    pub stops: u64,
    pub calls_after_stop: u64,
    pub buffer_size: usize,
    pub last_fx: AudioFx,
}

pub struct MockMicrophone {
    log: Arc<Mutex<MicLog>>,
    channels: u16,
    sample_rate: u32,
    latency: Duration,
    fail_start: bool,
    running: bool,
    buffer: AudioBuffer,
}

impl MockMicrophone {
    pub fn new(channels: u16, sample_rate: u32) -> (Self, Arc<Mutex<MicLog>>) {
        let log = Arc::new(Mutex::new(MicLog::default()));
        (
            Self {
                log: log.clone(),
                channels,
                sample_rate,
                latency: Duration::ZERO,
                fail_start: false,
                running: false,
                buffer: AudioBuffer::default(),
            },
            log,
        )
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl AudioDevice for MockMicrophone {
    fn name(&self) -> &str {
        "Mock microphone"
    }

    fn is_available(&self) -> bool {
        true
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

    fn set_device_index(&mut self, _index: Option<usize>) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_capture_buffer_size(&mut self, samples: usize) {
        self.log.lock().buffer_size = samples;
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.fail_start {
            return Err(DeviceError::Unreachable("mock microphone".to_string()));
        }
        self.running = true;
        self.log.lock().starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.log.lock().stops += 1;
    }

    fn next_buffer(
        &mut self,
        format: SampleFormat,
        fx: AudioFx,
        _timeout: Duration,
    ) -> Result<Option<&AudioBuffer>, DeviceError> {
        if !self.running {
            let mut log = self.log.lock();
            if log.stops > 0 {
                log.calls_after_stop += 1;
            }
            return Err(DeviceError::NotStreaming);
        }

        thread::sleep(FRAME_INTERVAL);

        let mut log = self.log.lock();
        log.buffers += 1;
        log.last_fx = fx;
        drop(log);

        self.buffer = AudioBuffer {
            data: vec![0; 64],
            format,
            timestamp: Timestamp::now(),
        };
        Ok(Some(&self.buffer))
    }
}

#[derive(Debug, Default)]
pub struct EncoderLog {
    pub configs: Vec<EncoderConfig>,
    pub opened: Vec<PathBuf>,
    pub video: Vec<Packet>,
    pub audio: Vec<Packet>,
    pub video_flushes: u64,
    pub audio_flushes: u64,
    pub closed: u64,
    pub writes_after_close: u64,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub log: Arc<Mutex<EncoderLog>>,
    pub fail_init: bool,
    /// Fails the video write with this 1-based index.
    pub fail_video_write: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> (Self, Arc<Mutex<EncoderLog>>) {
        let backend = Self::default();
        let log = backend.log.clone();
        (backend, log)
    }
}

impl EncoderBackend for MemoryBackend {
    fn init(&self, config: &EncoderConfig) -> Result<Box<dyn MediaEncoder>, EncoderError> {
        if self.fail_init {
            return Err(EncoderError::Init("mock backend refused".into()));
        }

        self.log.lock().configs.push(config.clone());
        Ok(Box::new(MemoryEncoder {
            log: self.log.clone(),
            audio: config.audio.is_some(),
            fail_video_write: self.fail_video_write,
            video_attempts: 0,
            open: false,
        }))
    }
}

pub struct MemoryEncoder {
    log: Arc<Mutex<EncoderLog>>,
    audio: bool,
    fail_video_write: Option<u64>,
    video_attempts: u64,
    open: bool,
}

impl MemoryEncoder {
    fn check_open(&self) -> Result<(), EncoderError> {
        if self.open {
            Ok(())
        } else {
            self.log.lock().writes_after_close += 1;
            Err(EncoderError::NotOpen)
        }
    }
}

impl MediaEncoder for MemoryEncoder {
    fn open_output(&mut self, path: &Path) -> Result<(), EncoderError> {
        std::fs::write(path, b"")?;
        self.open = true;
        self.log.lock().opened.push(path.to_path_buf());
        Ok(())
    }

    fn write_video_unit(&mut self, packet: Packet) -> Result<(), EncoderError> {
        self.check_open()?;
        self.video_attempts += 1;
        if Some(self.video_attempts) == self.fail_video_write {
            return Err(EncoderError::Write("mock video".into()));
        }
        self.log.lock().video.push(packet);
        Ok(())
    }

    fn write_audio_unit(&mut self, packet: Packet) -> Result<(), EncoderError> {
        self.check_open()?;
        self.log.lock().audio.push(packet);
        Ok(())
    }

    fn flush_video(&mut self) -> Result<(), EncoderError> {
        self.check_open()?;
        self.log.lock().video_flushes += 1;
        Ok(())
    }

    fn flush_audio(&mut self) -> Result<(), EncoderError> {
        self.check_open()?;
        self.log.lock().audio_flushes += 1;
        Ok(())
    }

    fn close_output(&mut self) -> Result<(), EncoderError> {
        self.check_open()?;
        self.open = false;
        self.log.lock().closed += 1;
        Ok(())
    }

    fn has_audio(&self) -> bool {
        self.audio
    }

    fn audio_frame_size(&self) -> usize {
        AUDIO_FRAME_SIZE
    }

    fn audio_sample_format(&self) -> SampleFormat {
        SampleFormat::S16
    }
}
