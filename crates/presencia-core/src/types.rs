use serde::{Deserialize, Serialize};

/// Side length of the canonical face patch produced by [`crate::normalize`].
///
/// Every patch that reaches the classifier — at enrollment and at
/// recognition — has exactly this size.
pub const PATCH_SIZE: u32 = 150;

/// Bounding box for a detected face, in pixel units of the input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    /// Integer `[x, y, w, h]` as reported to callers. Negative origins are
    /// clamped to zero; detectors may return boxes slightly outside the frame.
    pub fn to_xywh(&self) -> [i32; 4] {
        [
            self.x.round().max(0.0) as i32,
            self.y.round().max(0.0) as i32,
            self.width.round().max(0.0) as i32,
            self.height.round().max(0.0) as i32,
        ]
    }
}

/// A normalized single-channel face patch of [`PATCH_SIZE`] × [`PATCH_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    data: Vec<u8>,
}

impl Default for Patch {
    /// All-black canonical patch.
    fn default() -> Self {
        Self {
            data: vec![0; (PATCH_SIZE * PATCH_SIZE) as usize],
        }
    }
}

impl Patch {
    /// Wrap a raw buffer. Returns `None` unless it is exactly
    /// `PATCH_SIZE * PATCH_SIZE` bytes.
    pub fn from_raw(data: Vec<u8>) -> Option<Self> {
        if data.len() == (PATCH_SIZE * PATCH_SIZE) as usize {
            Some(Self { data })
        } else {
            None
        }
    }

    pub fn from_image(img: &image::GrayImage) -> Option<Self> {
        if img.width() == PATCH_SIZE && img.height() == PATCH_SIZE {
            Some(Self {
                data: img.as_raw().clone(),
            })
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_image(&self) -> image::GrayImage {
        image::GrayImage::from_raw(PATCH_SIZE, PATCH_SIZE, self.data.clone())
            .unwrap_or_else(|| image::GrayImage::new(PATCH_SIZE, PATCH_SIZE))
    }
}

/// One labeled patch handed to [`crate::FaceClassifier::train`] or `update`.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub patch: Patch,
    pub label: u32,
}

/// Classifier output. `distance` follows the distance-metric convention:
/// smaller values indicate a stronger match. It is not a probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub distance: f32,
}
