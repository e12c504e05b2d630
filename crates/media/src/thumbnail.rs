//! Clip thumbnails.
//!
//! A thumbnail is a small PNG of one early frame, carried inline in clip
//! metadata as a `data:` URL.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};

use naya_common::error::{NayaError, NayaResult};

use crate::codec::MediaBackend;
use crate::frame::Frame;

pub const THUMBNAIL_WIDTH: u32 = 160;
pub const THUMBNAIL_HEIGHT: u32 = 120;

/// Thumbnails are taken at one second in, or 10% of the clip, whichever
/// comes first.
pub fn thumbnail_time(duration_secs: f64) -> f64 {
    (duration_secs * 0.1).clamp(0.0, 1.0)
}

/// Decode a representative frame of `payload` and return it as a PNG data URL.
pub fn generate_thumbnail(
    backend: &dyn MediaBackend,
    payload: Vec<u8>,
    mime_type: &str,
) -> NayaResult<String> {
    let mut decoder = backend.open_decoder(payload, mime_type)?;
    let at = thumbnail_time(decoder.duration_secs());
    decoder.seek(at)?;
    let frame = decoder
        .current_frame()
        .ok_or_else(|| NayaError::codec(format!("No frame available at {at:.3}s")))?;
    frame_to_data_url(frame)
}

/// Downscale a frame to thumbnail size and encode it as a PNG data URL.
pub fn frame_to_data_url(frame: &Frame) -> NayaResult<String> {
    let image = RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| NayaError::codec("Frame buffer does not match its dimensions"))?;
    let thumb = image::imageops::resize(
        &image,
        THUMBNAIL_WIDTH,
        THUMBNAIL_HEIGHT,
        FilterType::Triangle,
    );

    let mut png = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| NayaError::codec(format!("Failed to encode thumbnail: {e}")))?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
}
