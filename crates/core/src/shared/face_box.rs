/// A detected face rectangle in pixel coordinates.
///
/// Produced fresh by the detector on every frame and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Center point of a [`FaceBox`], the matching key for identity tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Integer center `(x + w/2, y + h/2)`.
    pub fn centroid(&self) -> Centroid {
        Centroid {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }

    /// Scales all four coordinates by independent x/y factors.
    ///
    /// Used to map capture-resolution detections onto the display frame.
    pub fn scaled(&self, sx: f64, sy: f64) -> FaceBox {
        FaceBox {
            x: (self.x as f64 * sx).round() as i32,
            y: (self.y as f64 * sy).round() as i32,
            width: (self.width as f64 * sx).round() as i32,
            height: (self.height as f64 * sy).round() as i32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl Centroid {
    pub fn distance(&self, other: &Centroid) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}
