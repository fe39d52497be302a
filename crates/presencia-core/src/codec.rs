//! Image transport codec — base64 payloads into pixel buffers.
//!
//! Payloads arrive as plain base64 or as `data:image/...;base64,<data>`
//! URLs. The media-type header is stripped before decoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("empty image payload")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a transmitted image payload into a single-channel intensity buffer.
///
/// Accepts an optional `data:<media-type>;base64,` prefix and embedded ASCII
/// whitespace (line-wrapped base64 is common in browser captures).
pub fn decode_image(payload: &str) -> Result<image::GrayImage, CodecError> {
    let body = match payload.split_once(',') {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => payload,
    };

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(CodecError::Empty);
    }

    let bytes = STANDARD.decode(compact.as_bytes())?;
    let img = image::load_from_memory(&bytes)?;
    Ok(img.to_luma8())
}
