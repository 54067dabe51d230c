use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    encoder::{Container, VideoCodec},
    packet_queue::PacketOrder,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Where recordings go. Defaults to the user's video directory.
    pub video_dir: Option<PathBuf>,
    /// Where snapshots go. Defaults to the user's picture directory.
    pub snapshot_dir: Option<PathBuf>,
    pub file_prefix: String,
    pub container: Container,
    pub video_codec: VideoCodec,
    pub video_order: PacketOrder,
    pub audio_order: PacketOrder,
    /// Packets held back per stream so late arrivals can still be written in
    /// order. Zero writes every packet as soon as it is captured.
    pub video_reorder_depth: usize,
    pub audio_reorder_depth: usize,
    pub poll_timeout_ms: u64,
    pub video_retry_delay_ms: u64,
    pub audio_retry_delay_ms: u64,
    /// Used when the device reports a non-positive frame rate.
    pub fallback_fps: (i32, i32),
    pub fallback_audio_channels: u16,
    pub fallback_audio_sample_rate: u32,
    pub snapshot_quality: u8,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            video_dir: None,
            snapshot_dir: None,
            file_prefix: "camrec".to_string(),
            container: Container::default(),
            video_codec: VideoCodec::default(),
            video_order: PacketOrder::Pts,
            audio_order: PacketOrder::Pts,
            video_reorder_depth: 0,
            audio_reorder_depth: 0,
            poll_timeout_ms: 100,
            video_retry_delay_ms: 10,
            audio_retry_delay_ms: 2,
            fallback_fps: (30, 1),
            fallback_audio_channels: 2,
            fallback_audio_sample_rate: 44100,
            snapshot_quality: 90,
        }
    }
}

impl RecorderConfig {
    /// Loads the config at `path`, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::try_load(path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load config from {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn video_retry_delay(&self) -> Duration {
        Duration::from_millis(self.video_retry_delay_ms)
    }

    pub fn audio_retry_delay(&self) -> Duration {
        Duration::from_millis(self.audio_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("camrec.json");

        let config = RecorderConfig {
            file_prefix: "desk".to_string(),
            container: Container::Webm,
            video_reorder_depth: 3,
            fallback_fps: (25, 1),
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(RecorderConfig::load(&path), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camrec.json");
        fs::write(&path, r#"{ "filePrefix": "lab", "videoOrder": "dts" }"#).unwrap();

        let config = RecorderConfig::load(&path);
        assert_eq!(config.file_prefix, "lab");
        assert_eq!(config.video_order, PacketOrder::Dts);
        assert_eq!(config.fallback_audio_sample_rate, 44100);
    }

    #[test]
    fn corrupt_or_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camrec.json");

        assert_eq!(RecorderConfig::load(&path), RecorderConfig::default());

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RecorderConfig::try_load(&path),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(RecorderConfig::load(&path), RecorderConfig::default());
    }
}
