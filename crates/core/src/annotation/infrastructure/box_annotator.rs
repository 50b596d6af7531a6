use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::drawing;
use imageproc::rect::Rect;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::face_tracker::{TrackedFace, TrackerTable};
use crate::shared::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 20.0;
/// Gap between the label baseline area and the top edge of the box.
const LABEL_OFFSET: i32 = 10;

/// Draws a green rectangle around every tracked face and, when a font is
/// loaded, an `"<emotion> ID:<identity>"` label above it.
///
/// Faces without an emotion label get the rectangle only.
pub struct BoxAnnotator {
    font: Option<FontVec>,
}

impl BoxAnnotator {
    /// Rectangles only.
    pub fn new() -> Self {
        Self { font: None }
    }

    /// Rectangles and labels rendered with the TrueType/OpenType font at `path`.
    pub fn with_font(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| format!("invalid font {}: {e}", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(&self, frame: Frame, faces: &TrackerTable) -> Frame {
        if faces.is_empty() {
            return frame;
        }
        let index = frame.index();
        let mut img = frame.into_rgb_image();

        for face in faces.values() {
            draw_box(&mut img, face);
            if let (Some(font), Some(text)) = (&self.font, label(face)) {
                let y = (face.face_box.y - LABEL_OFFSET - LABEL_SCALE as i32).max(0);
                drawing::draw_text_mut(
                    &mut img,
                    BOX_COLOR,
                    face.face_box.x,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &text,
                );
            }
        }

        Frame::from_rgb_image(img, index)
    }
}

/// Label text for a face, or `None` when it has not been classified yet.
pub fn label(face: &TrackedFace) -> Option<String> {
    face.emotion
        .map(|emotion| format!("{emotion} ID:{}", face.identity))
}

fn draw_box(img: &mut image::RgbImage, face: &TrackedFace) {
    let b = face.face_box;
    for inset in 0..BOX_THICKNESS {
        let w = b.width - 2 * inset;
        let h = b.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(b.x + inset, b.y + inset).of_size(w as u32, h as u32);
        drawing::draw_hollow_rect_mut(img, rect, BOX_COLOR);
    }
}
