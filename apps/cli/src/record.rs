use anyhow::{Context, bail};
use camrec_recording::{
    CapturePipeline, RecorderConfig, RecorderEvent,
    synthetic::{SyntheticCamera, SyntheticCameraConfig, SyntheticMicrophone},
};
use clap::Args;
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::warn;

#[derive(Args)]
pub struct CameraArgs {
    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

impl CameraArgs {
    fn camera(&self) -> SyntheticCamera {
        SyntheticCamera::new(SyntheticCameraConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            ..Default::default()
        })
    }
}

#[derive(Args)]
pub struct RecordStart {
    #[command(flatten)]
    camera: CameraArgs,
    /// Stop after this many seconds instead of waiting for Enter
    #[arg(long)]
    seconds: Option<u64>,
    /// Record video only
    #[arg(long)]
    no_audio: bool,
    /// Directory to write the recording to
    #[arg(long)]
    path: Option<PathBuf>,
}

impl RecordStart {
    pub fn run(self, mut config: RecorderConfig) -> anyhow::Result<()> {
        if self.path.is_some() {
            config.video_dir = self.path;
        }

        let mut builder = CapturePipeline::builder(config).with_video(self.camera.camera());
        if !self.no_audio {
            builder = builder.with_audio(SyntheticMicrophone::new());
        }
        let pipeline = builder.start().context("starting capture")?;
        let events = pipeline.events();

        pipeline.request_start_recording();
        match wait_for(&events, |e| {
            matches!(
                e,
                RecorderEvent::RecordingStarted(_) | RecorderEvent::RecordingFailed(_)
            )
        }) {
            Some(RecorderEvent::RecordingStarted(path)) => {
                println!("Recording to '{}'", path.display())
            }
            Some(event) => bail!("{event}"),
            None => bail!("timed out waiting for the recording to start"),
        }

        match self.seconds {
            Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
            None => {
                println!("Press Enter to stop");
                std::io::stdin().read_line(&mut String::new())?;
            }
        }

        pipeline.request_stop_recording();
        match wait_for(&events, |e| matches!(e, RecorderEvent::RecordingStopped { .. })) {
            Some(RecorderEvent::RecordingStopped {
                path,
                duration,
                video_packets,
                audio_packets,
                write_failures,
                ..
            }) => {
                println!(
                    "Saved '{}' ({:.1}s, {video_packets} video, {audio_packets} audio packets)",
                    path.display(),
                    duration.as_secs_f64()
                );
                if write_failures > 0 {
                    warn!("{write_failures} packets could not be written");
                }
            }
            _ => bail!("timed out waiting for the recording to finish"),
        }

        pipeline.shutdown()?;
        Ok(())
    }
}

#[derive(Args)]
pub struct SnapshotArgs {
    #[command(flatten)]
    camera: CameraArgs,
    /// Directory to write the snapshot to
    #[arg(long)]
    path: Option<PathBuf>,
}

impl SnapshotArgs {
    pub fn run(self, mut config: RecorderConfig) -> anyhow::Result<()> {
        if self.path.is_some() {
            config.snapshot_dir = self.path;
        }

        let pipeline = CapturePipeline::builder(config)
            .with_video(self.camera.camera())
            .start()
            .context("starting capture")?;
        let events = pipeline.events();

        pipeline.request_snapshot();
        let saved = wait_for(&events, |e| {
            matches!(
                e,
                RecorderEvent::SnapshotSaved(_) | RecorderEvent::SnapshotFailed(_)
            )
        });
        pipeline.shutdown()?;

        match saved {
            Some(RecorderEvent::SnapshotSaved(path)) => {
                println!("Saved snapshot to '{}'", path.display());
                Ok(())
            }
            Some(event) => bail!("{event}"),
            None => bail!("timed out waiting for a frame"),
        }
    }
}

fn wait_for(
    events: &flume::Receiver<RecorderEvent>,
    pred: impl Fn(&RecorderEvent) -> bool,
) -> Option<RecorderEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
