use image::{ColorType, codecs::jpeg::JpegEncoder};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use thiserror::Error;

use crate::device::VideoFrame;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Frame has an invalid size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Frame holds {actual} bytes, {expected} needed for {width}x{height}")]
    Truncated {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Image/{0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait SnapshotWriter: Send + Sync {
    fn extension(&self) -> &'static str;

    fn save(&self, frame: &VideoFrame, path: &Path) -> Result<(), SnapshotError>;
}

pub struct JpegSnapshotWriter {
    quality: u8,
}

impl JpegSnapshotWriter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegSnapshotWriter {
    fn default() -> Self {
        Self::new(90)
    }
}

impl SnapshotWriter for JpegSnapshotWriter {
    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn save(&self, frame: &VideoFrame, path: &Path) -> Result<(), SnapshotError> {
        let rgb = yu12_to_rgb24(&frame.decoded, frame.width, frame.height)?;

        let mut file = BufWriter::new(File::create(path)?);
        JpegEncoder::new_with_quality(&mut file, self.quality).encode(
            &rgb,
            frame.width,
            frame.height,
            ColorType::Rgb8.into(),
        )?;
        file.flush()?;

        Ok(())
    }
}

/// Converts a planar YU12 (I420) image to packed RGB24 with the BT.601
/// studio-swing matrix.
pub fn yu12_to_rgb24(src: &[u8], width: u32, height: u32) -> Result<Vec<u8>, SnapshotError> {
    if width == 0 || height == 0 {
        return Err(SnapshotError::InvalidSize { width, height });
    }

    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let expected = w * h + 2 * cw * ch;
    if src.len() < expected {
        return Err(SnapshotError::Truncated {
            width,
            height,
            expected,
            actual: src.len(),
        });
    }

    let (luma, chroma) = src.split_at(w * h);
    let (u_plane, v_plane) = chroma.split_at(cw * ch);

    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let c = i32::from(luma[y * w + x]) - 16;
            let d = i32::from(u_plane[(y / 2) * cw + x / 2]) - 128;
            let e = i32::from(v_plane[(y / 2) * cw + x / 2]) - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            rgb.extend([r, g, b].map(|v| v.clamp(0, 255) as u8));
        }
    }

    Ok(rgb)
}
