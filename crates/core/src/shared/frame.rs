use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use ndarray::ArrayView3;

use crate::shared::face_box::FaceBox;

/// A single camera frame: contiguous pixel bytes in row-major order.
///
/// Three channels means RGB, one channel means luma. `index` is the capture
/// sequence number assigned by the capturer.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(img: RgbImage, index: usize) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Same pixels, renumbered.
    pub fn with_index(mut self, index: usize) -> Frame {
        self.index = index;
        self
    }

    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Consumes the frame into an `image` RGB buffer. Luma frames are expanded.
    pub fn into_rgb_image(self) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let data = if self.is_grayscale() {
            self.data.iter().flat_map(|&v| [v, v, v]).collect()
        } else {
            self.data
        };
        RgbImage::from_raw(w, h, data).expect("Frame data length must match dimensions")
    }

    /// ITU-R 601 luma copy of this frame. Already-gray frames are cloned.
    pub fn to_grayscale(&self) -> Frame {
        if self.is_grayscale() {
            return self.clone();
        }
        let luma: GrayImage = image::DynamicImage::ImageRgb8(self.clone().into_rgb_image()).to_luma8();
        Frame::new(luma.into_raw(), self.width, self.height, 1, self.index)
    }

    /// Bilinear resize to `width` × `height`, keeping the channel layout.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.is_grayscale() {
            let img = GrayImage::from_raw(self.width, self.height, self.data.clone())
                .expect("Frame data length must match dimensions");
            let out = image::imageops::resize(&img, width, height, FilterType::Triangle);
            Frame::new(out.into_raw(), width, height, 1, self.index)
        } else {
            let out = image::imageops::resize(
                &self.clone().into_rgb_image(),
                width,
                height,
                FilterType::Triangle,
            );
            Frame::from_rgb_image(out, self.index)
        }
    }

    /// Copies the part of `face` that lies inside the frame.
    ///
    /// Returns `None` when the box does not overlap the frame at all.
    pub fn crop(&self, face: &FaceBox) -> Option<Frame> {
        let x1 = face.x.clamp(0, self.width as i32) as usize;
        let y1 = face.y.clamp(0, self.height as i32) as usize;
        let x2 = (face.x + face.width).clamp(0, self.width as i32) as usize;
        let y2 = (face.y + face.height).clamp(0, self.height as i32) as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let c = self.channels as usize;
        let row_len = self.width as usize * c;
        let mut data = Vec::with_capacity((x2 - x1) * (y2 - y1) * c);
        for row in y1..y2 {
            let start = row * row_len + x1 * c;
            data.extend_from_slice(&self.data[start..start + (x2 - x1) * c]);
        }
        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
