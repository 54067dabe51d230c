use chrono::{DateTime, Local};
use std::{
    io,
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    Snapshot,
}

/// Directory files of `kind` are written to: `configured` when set, else the
/// platform's video or picture directory, else `$HOME/Videos` or
/// `$HOME/Pictures`, else the working directory.
pub fn output_dir(kind: OutputKind, configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }

    let (platform, home_subdir) = match kind {
        OutputKind::Video => (dirs::video_dir(), "Videos"),
        OutputKind::Snapshot => (dirs::picture_dir(), "Pictures"),
    };

    platform
        .or_else(|| dirs::home_dir().map(|home| home.join(home_subdir)))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Builds `<dir>/<prefix>_<YYYYmmdd-HHMMSS>.<extension>`, creating `dir` if
/// needed. A `-N` suffix is appended when that name is already taken.
pub fn output_path(
    dir: &Path,
    prefix: &str,
    extension: &str,
    now: DateTime<Local>,
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let stem = format!("{prefix}_{}", now.format("%Y%m%d-%H%M%S"));
    let mut candidate = dir.join(format!("{stem}.{extension}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.{extension}"));
        n += 1;
    }

    Ok(candidate)
}
