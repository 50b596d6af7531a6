use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("failed to open frame source {source_name}: {reason}")]
    Open { source_name: String, reason: String },
    #[error("frame source is not open")]
    NotOpen,
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("frame source reached end of stream")]
    EndOfStream,
}

/// A live camera or camera-like stream that yields frames on demand.
///
/// The source owns the device: `open` acquires it, `close` releases it and
/// must be safe to call repeatedly. `read` blocks for at most one frame
/// interval of the underlying device.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), FrameSourceError>;

    fn read(&mut self) -> Result<Frame, FrameSourceError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}
