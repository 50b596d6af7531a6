use crate::detection::domain::face_tracker::TrackerTable;
use crate::shared::frame::Frame;

/// Domain interface for decorating a display frame with tracked faces.
///
/// Takes the frame by value: the annotated frame is handed on to the
/// publisher, never shared while it is being drawn on.
pub trait FrameAnnotator: Send + Sync {
    fn annotate(&self, frame: Frame, faces: &TrackerTable) -> Frame;
}
