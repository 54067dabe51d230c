use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u32 {
        const KEYFRAME = 1 << 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// A media unit detached from the buffer it was captured into.
///
/// The payload is copied out of the producer's buffer on construction, so the
/// producer is free to reuse or free its buffer as soon as `clone_from`
/// returns. The payload is never mutated afterwards; ownership moves from the
/// capture thread to a [`PacketQueue`](crate::PacketQueue) and from there to
/// the encoder.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    data: Box<[u8]>,
    pts: i64,
    dts: i64,
    flags: PacketFlags,
}

impl Packet {
    /// Copies `source` into freshly allocated storage.
    ///
    /// An allocation failure aborts the process rather than dropping the
    /// captured unit.
    pub fn clone_from(source: &[u8], pts: i64, dts: i64, flags: PacketFlags) -> Self {
        Self {
            data: Box::from(source),
            pts,
            dts,
            flags,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn dts(&self) -> i64 {
        self.dts
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }
}

/// Releases a packet if there is one. Dropping does the same; this exists for
/// call sites that hold an `Option<Packet>`.
pub fn release(packet: Option<Packet>) {
    drop(packet);
}
