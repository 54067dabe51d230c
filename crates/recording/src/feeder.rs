use camrec_fail::fail_err;
use tracing::{debug, error, trace, warn};

use crate::{
    config::RecorderConfig,
    device::SampleFormat,
    encoder::MediaEncoder,
    error::EncoderError,
    packet::{Packet, StreamKind},
    packet_queue::{PacketOrder, PacketQueue},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeederStats {
    pub video_accepted: u64,
    pub audio_accepted: u64,
    pub video_written: u64,
    pub audio_written: u64,
    pub write_failures: u64,
    pub first_video_pts: Option<i64>,
    pub last_video_pts: Option<i64>,
}

struct Stream {
    queue: PacketQueue,
    reorder_depth: usize,
}

impl Stream {
    fn new(order: PacketOrder, reorder_depth: usize) -> Self {
        Self {
            queue: PacketQueue::new(order),
            reorder_depth,
        }
    }
}

/// Feeds both streams of one recording into its encoder.
///
/// Every pushed packet goes through the stream's [`PacketQueue`] and is
/// written as soon as more than `reorder_depth` packets are held, so with
/// the default depth of zero each packet is written by the push that
/// delivered it. The feeder is not synchronised itself; the recorder keeps
/// it behind the single encoder lock shared by both capture threads.
pub struct MuxFeeder {
    encoder: Box<dyn MediaEncoder>,
    video: Stream,
    audio: Option<Stream>,
    stats: FeederStats,
}

impl MuxFeeder {
    pub fn new(encoder: Box<dyn MediaEncoder>, config: &RecorderConfig) -> Self {
        let audio = encoder
            .has_audio()
            .then(|| Stream::new(config.audio_order, config.audio_reorder_depth));

        Self {
            encoder,
            video: Stream::new(config.video_order, config.video_reorder_depth),
            audio,
            stats: FeederStats::default(),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn audio_frame_size(&self) -> usize {
        self.encoder.audio_frame_size()
    }

    pub fn audio_sample_format(&self) -> SampleFormat {
        self.encoder.audio_sample_format()
    }

    pub fn stats(&self) -> &FeederStats {
        &self.stats
    }

    pub fn queued(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::Video => self.video.queue.len(),
            StreamKind::Audio => self.audio.as_ref().map_or(0, |s| s.queue.len()),
        }
    }

    pub fn push_video(&mut self, packet: Packet) {
        self.stats.video_accepted += 1;
        self.video.queue.insert(packet);
        self.drain(StreamKind::Video, false);
    }

    pub fn push_audio(&mut self, packet: Packet) {
        let Some(audio) = self.audio.as_mut() else {
            trace!("Dropping audio packet, output has no audio stream");
            return;
        };

        self.stats.audio_accepted += 1;
        audio.queue.insert(packet);
        self.drain(StreamKind::Audio, false);
    }

    /// Writes out everything still held in the queues and flushes the
    /// encoder, video first.
    pub fn flush(&mut self) {
        self.drain(StreamKind::Video, true);
        if let Err(e) = self.encoder.flush_video() {
            error!("Failed to flush video encoder: {e}");
        }

        if self.audio.is_some() {
            self.drain(StreamKind::Audio, true);
            if let Err(e) = self.encoder.flush_audio() {
                error!("Failed to flush audio encoder: {e}");
            }
        }
    }

    /// Flushes, closes the output and releases the encoder.
    pub fn finish(mut self) -> FeederStats {
        self.flush();

        if let Err(e) = self.encoder.close_output() {
            error!("Failed to close output: {e}");
        }

        debug!(stats = ?self.stats, "Feeder finished");
        self.stats
    }

    fn drain(&mut self, kind: StreamKind, all: bool) {
        loop {
            let stream = match kind {
                StreamKind::Video => &mut self.video,
                StreamKind::Audio => match self.audio.as_mut() {
                    Some(stream) => stream,
                    None => return,
                },
            };

            let keep = if all { 0 } else { stream.reorder_depth };
            if stream.queue.len() <= keep {
                return;
            }
            let Some(packet) = stream.queue.pop_front() else {
                return;
            };

            let pts = packet.pts();
            match self.write(kind, packet) {
                Ok(()) => match kind {
                    StreamKind::Video => {
                        self.stats.video_written += 1;
                        self.stats.first_video_pts.get_or_insert(pts);
                        self.stats.last_video_pts = Some(pts);
                    }
                    StreamKind::Audio => self.stats.audio_written += 1,
                },
                Err(e) => {
                    self.stats.write_failures += 1;
                    warn!("Failed to write {} packet (pts {pts}): {e}", kind.as_str());
                }
            }
        }
    }

    fn write(&mut self, kind: StreamKind, packet: Packet) -> Result<(), EncoderError> {
        match kind {
            StreamKind::Video => {
                fail_err!(
                    "feeder::write_video",
                    EncoderError::Write("video packet (injected)".into())
                );
                self.encoder.write_video_unit(packet)
            }
            StreamKind::Audio => self.encoder.write_audio_unit(packet),
        }
    }
}
