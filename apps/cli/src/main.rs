mod record;

use anyhow::Context;
use camrec_recording::{DumpReader, RecorderConfig, StreamKind};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use record::{RecordStart, SnapshotArgs};

#[derive(Parser)]
#[command(about = "Capture and record from a camera")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record from the synthetic camera and microphone
    Record(RecordStart),
    /// Save a single frame as a JPEG
    Snapshot(SnapshotArgs),
    /// Summarise a recording written by the packet dump backend
    Inspect { path: PathBuf },
    /// Print the effective config, optionally writing it out
    Config {
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("camrec")
        .join("config.json")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camrec=info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = RecorderConfig::load(&config_path);

    match cli.command {
        Commands::Record(args) => args.run(config),
        Commands::Snapshot(args) => args.run(config),
        Commands::Inspect { path } => inspect(&path),
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Some(path) = write {
                config
                    .save(&path)
                    .with_context(|| format!("writing config to '{}'", path.display()))?;
                println!("Wrote config to '{}'", path.display());
            }
            Ok(())
        }
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let reader =
        DumpReader::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let header = *reader.header();
    let records = reader.records()?;

    let (video, audio): (Vec<_>, Vec<_>) = records
        .iter()
        .partition(|r| r.stream == StreamKind::Video);
    let span_secs = match (video.first(), video.last()) {
        (Some(first), Some(last)) => (last.pts - first.pts) as f64 / 1e9,
        _ => 0.0,
    };

    println!(
        "{}x{} @ {}/{} fps, codec {}",
        header.width, header.height, header.fps_num, header.fps_den, header.codec
    );
    println!(
        "video: {} packets, {} bytes, {span_secs:.2}s",
        video.len(),
        video.iter().map(|r| r.data.len()).sum::<usize>()
    );
    if header.audio_channels > 0 {
        println!(
            "audio: {} packets, {} channels @ {} Hz",
            audio.len(),
            header.audio_channels,
            header.audio_sample_rate
        );
    } else {
        println!("audio: none");
    }

    Ok(())
}
