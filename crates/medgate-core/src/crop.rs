//! Padded crop computation and JPEG rasterization.
//!
//! The capture step turns the last grabbed frame plus the detector's last
//! bounding box into a fixed-resolution JPEG suitable for the remote model.
//! With no bounding box (manual override) the full frame is resampled
//! instead. This step is pure given its inputs.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

use crate::frame::Frame;
use crate::geometry::NormalizedRect;

/// Errors from crop rasterization.
#[derive(Debug, Error)]
pub enum CropError {
    /// The frame buffer does not match its declared dimensions.
    #[error("malformed frame: {width}x{height} with {len} bytes")]
    MalformedFrame {
        /// Declared frame width.
        width: u32,
        /// Declared frame height.
        height: u32,
        /// Actual buffer length.
        len: usize,
    },

    /// JPEG encoding failed.
    #[error("jpeg encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Everything needed to rasterize one capture.
///
/// Derived once per capture from the active profile and the gate's last
/// bounding box, consumed immediately.
#[derive(Debug, Clone, Copy)]
pub struct CropSpec {
    /// Detector bounding box; `None` produces a full-frame capture.
    pub source_bbox: Option<NormalizedRect>,
    /// Symmetric expansion applied around the box before cropping.
    pub padding_ratio: f32,
    /// Output edge length; the remote model expects a square input.
    pub target: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

/// Rasterizes `frame` according to `spec` into an encoded JPEG.
pub fn crop_to_jpeg(frame: &Frame, spec: &CropSpec) -> Result<Vec<u8>, CropError> {
    if !frame.is_well_formed() {
        return Err(CropError::MalformedFrame {
            width: frame.width,
            height: frame.height,
            len: frame.rgb.len(),
        });
    }
    let image: RgbImage = ImageBuffer::<Rgb<u8>, _>::from_raw(
        frame.width,
        frame.height,
        frame.rgb.clone(),
    )
    .ok_or(CropError::MalformedFrame {
        width: frame.width,
        height: frame.height,
        len: frame.rgb.len(),
    })?;

    let region = match spec.source_bbox {
        Some(bbox) => {
            let px = bbox
                .expanded(spec.padding_ratio)
                .to_pixels(frame.width, frame.height);
            image::imageops::crop_imm(&image, px.x, px.y, px.w, px.h).to_image()
        }
        None => image,
    };

    let resized = image::imageops::resize(&region, spec.target, spec.target, FilterType::Triangle);

    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, spec.jpeg_quality.clamp(1, 100));
    encoder.encode(
        resized.as_raw(),
        spec.target,
        spec.target,
        ExtendedColorType::Rgb8,
    )?;
    Ok(encoded)
}
