use camrec_timestamp::{Timestamp, Timestamps};
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use crate::{
    encoder::EncoderConfig,
    feeder::{FeederStats, MuxFeeder},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Clone, Debug)]
pub struct SessionInfo {
    pub output_path: PathBuf,
    pub encoder: EncoderConfig,
    pub started: Timestamps,
}

#[derive(Clone, Debug)]
pub struct RecordingSummary {
    pub output_path: PathBuf,
    pub started_at: SystemTime,
    /// Wall-clock capture time of the first video packet written.
    pub first_frame_at: Option<SystemTime>,
    pub stats: FeederStats,
    /// Span between the first and last video packet written.
    pub duration: Duration,
}

pub(crate) struct ActiveSession {
    pub info: SessionInfo,
    pub feeder: MuxFeeder,
}

/// Packet timestamps are capture timestamps in nanoseconds.
fn pts_timestamp(pts: i64) -> Timestamp {
    Timestamp::from_nanos(u64::try_from(pts).unwrap_or(0))
}

impl ActiveSession {
    pub fn finish(self) -> RecordingSummary {
        let stats = self.feeder.finish();

        let first = stats.first_video_pts.map(pts_timestamp);
        let duration = match (first, stats.last_video_pts.map(pts_timestamp)) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        };

        RecordingSummary {
            output_path: self.info.output_path,
            started_at: self.info.started.system_time(),
            first_frame_at: first.map(|ts| self.info.started.system_time_of(ts)),
            stats,
            duration,
        }
    }
}
