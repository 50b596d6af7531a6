use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::shared::frame::Frame;
use crate::video::domain::image_encoder::ImageEncoder;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub struct JpegImageEncoder {
    quality: u8,
}

impl JpegImageEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegImageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageEncoder for JpegImageEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let color = match frame.channels() {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            n => return Err(format!("cannot encode {n}-channel frame as JPEG").into()),
        };
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.quality).encode(
            frame.data(),
            frame.width(),
            frame.height(),
            color,
        )?;
        Ok(buf)
    }

    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}
