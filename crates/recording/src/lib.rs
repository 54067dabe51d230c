mod capture;
pub mod config;
mod controller;
pub mod device;
pub mod dump;
pub mod encoder;
mod error;
mod events;
pub mod feeder;
mod packet;
mod packet_queue;
pub mod paths;
mod pipeline;
mod preview;
mod session;
pub mod snapshot;
pub mod synthetic;

pub use config::{ConfigError, RecorderConfig};
pub use controller::Command;
pub use device::{
    AudioBuffer, AudioDevice, AudioFx, PixelFormat, SampleFormat, VideoDevice, VideoFrame,
    VideoParams,
};
pub use dump::{DumpReader, PacketDumpBackend};
pub use encoder::{Container, EncoderBackend, EncoderConfig, MediaEncoder, VideoCodec};
pub use error::{DeviceError, EncoderError, RecordingError};
pub use events::RecorderEvent;
pub use feeder::{FeederStats, MuxFeeder};
pub use packet::{Packet, PacketFlags, StreamKind, release};
pub use packet_queue::{PacketOrder, PacketQueue};
pub use pipeline::{CapturePipeline, HasVideo, NoVideo, PipelineBuilder};
pub use preview::{PreviewBuffer, PreviewFrame};
pub use session::{RecordingState, RecordingSummary, SessionInfo};
pub use snapshot::{JpegSnapshotWriter, SnapshotError, SnapshotWriter};
