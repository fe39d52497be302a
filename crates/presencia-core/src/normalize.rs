//! Normalization pipeline shared by enrollment and recognition.
//!
//! Crops the detected box out of the single-channel image and resizes to the
//! canonical patch size with Catmull-Rom (cubic) filtering. Enrollment and
//! recognition MUST go through this exact function: any preprocessing skew
//! between the two paths silently degrades accuracy.

use crate::types::{FaceBox, Patch, PATCH_SIZE};
use image::imageops::{self, FilterType};

/// Crop `face` from `gray` and resize to [`PATCH_SIZE`] × [`PATCH_SIZE`].
///
/// The box is clamped to image bounds first; detectors may return
/// fractionally out-of-frame boxes for faces near an edge.
pub fn normalize(gray: &image::GrayImage, face: &FaceBox) -> Patch {
    let (img_w, img_h) = (gray.width(), gray.height());
    if img_w == 0 || img_h == 0 {
        return Patch::default();
    }

    let x0 = face.x.max(0.0).floor() as u32;
    let y0 = face.y.max(0.0).floor() as u32;
    let x0 = x0.min(img_w.saturating_sub(1));
    let y0 = y0.min(img_h.saturating_sub(1));
    let w = (face.width.round() as u32).clamp(1, img_w - x0);
    let h = (face.height.round() as u32).clamp(1, img_h - y0);

    let crop = imageops::crop_imm(gray, x0, y0, w, h).to_image();
    let resized = imageops::resize(&crop, PATCH_SIZE, PATCH_SIZE, FilterType::CatmullRom);

    // Dimensions are exact by construction.
    Patch::from_raw(resized.into_raw()).unwrap_or_default()
}
