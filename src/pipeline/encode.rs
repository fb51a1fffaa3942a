//! Encoding: RGBA surface → compressed blob.
//!
//! Quality only affects JPEG. PNG, GIF, BMP and TIFF are lossless and the
//! WebP encoder in `image` only writes lossless WebP, so for all of those the
//! quality fraction is accepted and ignored: "compressing" a PNG shrinks it
//! only through the max-width/max-height downscale.
//!
//! Requested MIME types without an encoder (SVG, unknown types) fall back to
//! PNG, the same way a canvas does.

use crate::error::ImgKitError;
use crate::geometry::Dimensions;
use crate::pipeline::input::{MIME_BMP, MIME_GIF, MIME_JPEG, MIME_PNG, MIME_TIFF, MIME_WEBP};
use crate::pipeline::rasterize::Surface;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// A serialised surface.
#[derive(Debug, Clone)]
pub struct EncodedBlob {
    pub bytes: Vec<u8>,
    /// MIME type actually written (may differ from the requested one).
    pub mime: &'static str,
    pub dimensions: Dimensions,
}

impl EncodedBlob {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The MIME type the encoder will produce for a requested type.
pub fn output_mime_for(requested: &str) -> &'static str {
    match requested {
        MIME_JPEG | "image/jpg" => MIME_JPEG,
        MIME_GIF => MIME_GIF,
        MIME_BMP => MIME_BMP,
        MIME_TIFF => MIME_TIFF,
        MIME_WEBP => MIME_WEBP,
        _ => MIME_PNG,
    }
}

/// Map a quality fraction in `[0, 1]` onto libjpeg's `1..=100` scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality } else { 0.92 };
    (q * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode a surface as `mime` at `quality`.
///
/// `name` is only used for error messages.
pub fn encode_surface(
    surface: &Surface,
    mime: &str,
    quality: f32,
    name: &str,
) -> Result<EncodedBlob, ImgKitError> {
    if surface.is_empty() {
        return Err(ImgKitError::encode(name, "surface has zero width or height"));
    }

    let mime = output_mime_for(mime);
    let dims = surface.dimensions();
    let mut bytes = Vec::new();

    if mime == MIME_JPEG {
        let rgb: RgbImage = surface.image().convert();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality));
        encoder
            .encode(rgb.as_raw(), dims.width, dims.height, image::ExtendedColorType::Rgb8)
            .map_err(|e| ImgKitError::encode(name, e))?;
    } else {
        let format = ImageFormat::from_mime_type(mime).unwrap_or(ImageFormat::Png);
        surface
            .image()
            .write_to(&mut Cursor::new(&mut bytes), format)
            .map_err(|e| ImgKitError::encode(name, e))?;
    }

    if bytes.is_empty() {
        return Err(ImgKitError::encode(name, "encoder produced no data"));
    }

    debug!(
        "Encoded {} → {} ({}x{}, {} bytes)",
        name,
        mime,
        dims.width,
        dims.height,
        bytes.len()
    );
    Ok(EncodedBlob {
        bytes,
        mime,
        dimensions: dims,
    })
}

/// Encode a PNG thumbnail no larger than `max_edge` on either side as a
/// `data:` URI, for list previews.
pub fn encode_preview(image: &DynamicImage, max_edge: u32) -> Result<String, image::ImageError> {
    let thumb = if image.width() > max_edge || image.height() > max_edge {
        image.thumbnail(max_edge, max_edge)
    } else {
        image.clone()
    };
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(thumb.to_rgba8()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded preview → {} bytes base64", b64.len());
    Ok(format!("data:image/png;base64,{b64}"))
}
