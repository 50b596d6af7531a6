use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::shared::frame::Frame;

/// Frames the capturer may queue ahead of the processor.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Bounded, lossy frame conduit between the capturer and the processor.
///
/// Pushing into a full channel drops the incoming frame instead of blocking
/// the producer. Frames that are kept come out in capture order.
pub fn frame_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (FrameSender { tx }, FrameReceiver { rx })
}

#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<Frame>,
}

pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

/// What happened to a frame offered to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Channel was full; the frame was discarded.
    Dropped,
    /// The processor side is gone.
    Disconnected,
}

impl FrameSender {
    pub fn try_push(&self, frame: Frame) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => PushOutcome::Dropped,
            Err(TrySendError::Disconnected(_)) => PushOutcome::Disconnected,
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl FrameReceiver {
    /// Non-blocking dequeue; `None` when nothing is queued or the sender is gone.
    pub fn try_pop(&self) -> Option<Frame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
