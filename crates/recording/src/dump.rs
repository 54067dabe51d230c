//! A self-describing packet dump container.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header:  "CRPK" u8:version u8:codec u32:width u32:height i32:fps_num i32:fps_den
//!          u16:audio_channels u32:audio_sample_rate
//! record:  u8:stream u32:flags i64:pts i64:dts u32:len [len]payload
//! ```
//!
//! `audio_channels` is zero for video-only files.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::{
    device::SampleFormat,
    encoder::{
        AudioStreamParams, EncoderBackend, EncoderConfig, MediaEncoder, VideoCodec,
    },
    error::EncoderError,
    packet::{Packet, PacketFlags, StreamKind},
};

pub const DUMP_MAGIC: &[u8; 4] = b"CRPK";
pub const DUMP_VERSION: u8 = 1;
/// Samples per channel per audio packet.
pub const DUMP_AUDIO_FRAME_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug, Default)]
pub struct PacketDumpBackend;

impl EncoderBackend for PacketDumpBackend {
    fn init(&self, config: &EncoderConfig) -> Result<Box<dyn MediaEncoder>, EncoderError> {
        if config.width == 0 || config.height == 0 {
            return Err(EncoderError::Init(
                format!("invalid frame size {}x{}", config.width, config.height).into(),
            ));
        }

        Ok(Box::new(PacketDumpEncoder::new(config.clone())))
    }
}

pub struct PacketDumpEncoder {
    config: EncoderConfig,
    output: Option<(PathBuf, BufWriter<File>)>,
}

impl PacketDumpEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            output: None,
        }
    }

    fn output(&mut self) -> Result<&mut BufWriter<File>, EncoderError> {
        self.output
            .as_mut()
            .map(|(_, w)| w)
            .ok_or(EncoderError::NotOpen)
    }

    fn write_record(&mut self, kind: StreamKind, packet: Packet) -> Result<(), EncoderError> {
        let len = u32::try_from(packet.size())
            .map_err(|_| EncoderError::Write(format!("{}-byte packet", packet.size()).into()))?;
        let out = self.output()?;

        out.write_u8(stream_id(kind))?;
        out.write_u32::<LittleEndian>(packet.flags().bits())?;
        out.write_i64::<LittleEndian>(packet.pts())?;
        out.write_i64::<LittleEndian>(packet.dts())?;
        out.write_u32::<LittleEndian>(len)?;
        out.write_all(packet.data())?;

        Ok(())
    }
}

impl MediaEncoder for PacketDumpEncoder {
    fn open_output(&mut self, path: &Path) -> Result<(), EncoderError> {
        let file = File::create(path).map_err(|source| EncoderError::OpenOutput {
            path: path.to_path_buf(),
            source,
        })?;
        let mut out = BufWriter::new(file);

        let audio = self.config.audio.unwrap_or(AudioStreamParams {
            channels: 0,
            sample_rate: 0,
        });

        out.write_all(DUMP_MAGIC)?;
        out.write_u8(DUMP_VERSION)?;
        out.write_u8(codec_id(self.config.video_codec))?;
        out.write_u32::<LittleEndian>(self.config.width)?;
        out.write_u32::<LittleEndian>(self.config.height)?;
        out.write_i32::<LittleEndian>(self.config.fps_num)?;
        out.write_i32::<LittleEndian>(self.config.fps_den)?;
        out.write_u16::<LittleEndian>(audio.channels)?;
        out.write_u32::<LittleEndian>(audio.sample_rate)?;

        debug!("Opened packet dump at {}", path.display());
        self.output = Some((path.to_path_buf(), out));
        Ok(())
    }

    fn write_video_unit(&mut self, packet: Packet) -> Result<(), EncoderError> {
        self.write_record(StreamKind::Video, packet)
    }

    fn write_audio_unit(&mut self, packet: Packet) -> Result<(), EncoderError> {
        if self.config.audio.is_none() {
            return Err(EncoderError::Write("audio packet to a video-only output".into()));
        }
        self.write_record(StreamKind::Audio, packet)
    }

    fn flush_video(&mut self) -> Result<(), EncoderError> {
        Ok(self.output()?.flush()?)
    }

    fn flush_audio(&mut self) -> Result<(), EncoderError> {
        Ok(self.output()?.flush()?)
    }

    fn close_output(&mut self) -> Result<(), EncoderError> {
        let (path, mut out) = self.output.take().ok_or(EncoderError::NotOpen)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        debug!("Closed packet dump at {}", path.display());
        Ok(())
    }

    fn has_audio(&self) -> bool {
        self.config.audio.is_some()
    }

    fn audio_frame_size(&self) -> usize {
        DUMP_AUDIO_FRAME_SIZE
    }

    fn audio_sample_format(&self) -> SampleFormat {
        SampleFormat::F32
    }
}

impl Drop for PacketDumpEncoder {
    fn drop(&mut self) {
        if self.output.is_some()
            && let Err(e) = self.close_output()
        {
            warn!("Failed to close packet dump on drop: {e}");
        }
    }
}

fn stream_id(kind: StreamKind) -> u8 {
    match kind {
        StreamKind::Video => 0,
        StreamKind::Audio => 1,
    }
}

fn codec_id(codec: VideoCodec) -> u8 {
    match codec {
        VideoCodec::Passthrough => 0,
        VideoCodec::Mjpeg => 1,
        VideoCodec::H264 => 2,
        VideoCodec::Vp8 => 3,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DumpHeader {
    pub codec: u8,
    pub width: u32,
    pub height: u32,
    pub fps_num: i32,
    pub fps_den: i32,
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpRecord {
    pub stream: StreamKind,
    pub flags: PacketFlags,
    pub pts: i64,
    pub dts: i64,
    pub data: Vec<u8>,
}

/// Reads back a file written by [`PacketDumpEncoder`].
pub struct DumpReader<R> {
    header: DumpHeader,
    input: R,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> DumpReader<R> {
    pub fn new(mut input: R) -> io::Result<Self> {
        let mut magic = [0; 4];
        input.read_exact(&mut magic)?;
        if &magic != DUMP_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a packet dump"));
        }

        let version = input.read_u8()?;
        if version != DUMP_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported dump version {version}"),
            ));
        }

        let header = DumpHeader {
            codec: input.read_u8()?,
            width: input.read_u32::<LittleEndian>()?,
            height: input.read_u32::<LittleEndian>()?,
            fps_num: input.read_i32::<LittleEndian>()?,
            fps_den: input.read_i32::<LittleEndian>()?,
            audio_channels: input.read_u16::<LittleEndian>()?,
            audio_sample_rate: input.read_u32::<LittleEndian>()?,
        };

        Ok(Self { header, input })
    }

    pub fn header(&self) -> &DumpHeader {
        &self.header
    }

    /// The next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> io::Result<Option<DumpRecord>> {
        let stream = match self.input.read_u8() {
            Ok(0) => StreamKind::Video,
            Ok(1) => StreamKind::Audio,
            Ok(other) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown stream id {other}"),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };

        let flags = PacketFlags::from_bits_retain(self.input.read_u32::<LittleEndian>()?);
        let pts = self.input.read_i64::<LittleEndian>()?;
        let dts = self.input.read_i64::<LittleEndian>()?;
        let len = self.input.read_u32::<LittleEndian>()?;

        // The length is untrusted; only allocate what is actually there.
        let mut data = Vec::new();
        (&mut self.input).take(u64::from(len)).read_to_end(&mut data)?;
        if data.len() as u64 != u64::from(len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record claims {len} bytes, found {}", data.len()),
            ));
        }

        Ok(Some(DumpRecord {
            stream,
            flags,
            pts,
            dts,
            data,
        }))
    }

    pub fn records(mut self) -> io::Result<Vec<DumpRecord>> {
        let mut records = vec![];
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}
