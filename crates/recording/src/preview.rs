use camrec_timestamp::Timestamp;
use parking_lot::Mutex;

use crate::device::VideoFrame;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp: Timestamp,
    /// Decoded YU12 image.
    pub data: Vec<u8>,
}

#[derive(Default)]
struct PreviewState {
    frame: Option<PreviewFrame>,
    pending: bool,
}

/// Latest decoded frame for display. The capture thread overwrites it every
/// frame; a renderer picks it up with [`PreviewBuffer::take_pending`].
#[derive(Default)]
pub struct PreviewBuffer {
    state: Mutex<PreviewState>,
}

impl PreviewBuffer {
    pub(crate) fn publish(&self, frame: &VideoFrame) {
        let mut state = self.state.lock();
        let target = state.frame.get_or_insert_with(PreviewFrame::default);

        target.width = frame.width;
        target.height = frame.height;
        target.timestamp = frame.timestamp;
        target.data.clear();
        target
            .data
            .extend_from_slice(&frame.decoded[..frame.decoded_size()]);

        state.pending = true;
    }

    /// The latest frame if it arrived since the previous call.
    pub fn take_pending(&self) -> Option<PreviewFrame> {
        let mut state = self.state.lock();
        if !std::mem::take(&mut state.pending) {
            return None;
        }
        state.frame.clone()
    }

    pub fn latest(&self) -> Option<PreviewFrame> {
        self.state.lock().frame.clone()
    }
}

/// Wakes a renderer after each frame. The channel holds a single token so a
/// slow renderer only ever sees one outstanding wakeup.
#[derive(Clone)]
pub(crate) struct FrameNotifier(flume::Sender<()>);

impl FrameNotifier {
    pub fn new(tx: flume::Sender<()>) -> Self {
        Self(tx)
    }

    pub fn notify(&self) {
        let _ = self.0.try_send(());
    }
}
