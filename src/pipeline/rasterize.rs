//! Rasterisation: decode a [`SourceFile`] and draw it onto an off-screen
//! RGBA surface.
//!
//! Drawing follows canvas semantics: the surface is allocated at the target
//! size, fully transparent, and source pixels are copied (or resampled) into
//! it. Source regions outside the image leave the surface transparent.
//! An opaque background is composited underneath when the output format has
//! no alpha channel.

use crate::error::ImgKitError;
use crate::geometry::{check_surface, CropRect, Dimensions};
use crate::locator::UrlRegistry;
use crate::pipeline::input::SourceFile;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Opaque white, the backdrop for alpha-less encodings.
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// How source pixels map onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawInstruction {
    /// Source drawn 1:1; surface size = source size.
    Identity,
    /// Source resampled to fill a surface of the given size.
    Scale(Dimensions),
    /// Source sub-rectangle drawn 1:1 onto a surface of the rectangle's size.
    Crop(CropRect),
}

/// What lies under the drawn pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    #[default]
    Transparent,
    Opaque(Rgba<u8>),
}

/// An in-memory RGBA bitmap.
#[derive(Debug, Clone)]
pub struct Surface {
    image: RgbaImage,
}

impl Surface {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions().is_empty()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Decode a source file into pixels.
///
/// An object URL is held for the duration of the decode and revoked when it
/// finishes, whether or not decoding succeeded.
pub async fn decode(source: &SourceFile, urls: &UrlRegistry) -> Result<DynamicImage, ImgKitError> {
    let _url = urls.create(source.size());
    let name = source.name().to_string();
    let bytes = source.shared_bytes();
    let is_svg = source.is_svg();

    tokio::task::spawn_blocking(move || decode_blocking(&name, &bytes, is_svg))
        .await
        .map_err(|e| ImgKitError::Internal(format!("Decode task panicked: {}", e)))?
}

/// Blocking implementation of [`decode`].
pub fn decode_blocking(name: &str, bytes: &[u8], is_svg: bool) -> Result<DynamicImage, ImgKitError> {
    let image = if is_svg {
        decode_svg(name, bytes)?
    } else {
        image::load_from_memory(bytes).map_err(|e| ImgKitError::decode(name, e))?
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(ImgKitError::decode(name, "image has zero width or height"));
    }
    debug!("Decoded {} → {}x{} px", name, image.width(), image.height());
    Ok(image)
}

/// Rasterise an SVG document at its intrinsic size.
fn decode_svg(name: &str, bytes: &[u8]) -> Result<DynamicImage, ImgKitError> {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{Options, Tree};

    let tree = Tree::from_data(bytes, &Options::default())
        .map_err(|e| ImgKitError::decode(name, format!("invalid SVG: {e}")))?;
    let size = tree.size();
    let width = size.width().ceil() as u32;
    let height = size.height().ceil() as u32;
    check_surface(Dimensions::new(width, height)).map_err(|e| ImgKitError::decode(name, e))?;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| ImgKitError::decode(name, "SVG has zero or oversized dimensions"))?;
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha
    let mut image = RgbaImage::new(width, height);
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(DynamicImage::ImageRgba8(image))
}

/// Read the pixel dimensions of a source without decoding its pixel data
/// (SVGs are parsed but not rendered).
pub async fn image_dimensions(source: &SourceFile) -> Result<Dimensions, ImgKitError> {
    let name = source.name().to_string();
    let bytes = source.shared_bytes();
    let is_svg = source.is_svg();

    tokio::task::spawn_blocking(move || -> Result<Dimensions, ImgKitError> {
        if is_svg {
            let tree = resvg::usvg::Tree::from_data(&bytes, &resvg::usvg::Options::default())
                .map_err(|e| ImgKitError::decode(&name, format!("invalid SVG: {e}")))?;
            let size = tree.size();
            return Ok(Dimensions::new(
                size.width().ceil() as u32,
                size.height().ceil() as u32,
            ));
        }
        let (w, h) = image::ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(|e| ImgKitError::decode(&name, e))?
            .into_dimensions()
            .map_err(|e| ImgKitError::decode(&name, e))?;
        Ok(Dimensions::new(w, h))
    })
    .await
    .map_err(|e| ImgKitError::Internal(format!("Dimension probe panicked: {}", e)))?
}

/// Draw `image` onto a fresh surface according to `instruction`.
pub fn draw(image: &DynamicImage, instruction: DrawInstruction, background: Background) -> Surface {
    let src = Dimensions::new(image.width(), image.height());

    let drawn = match instruction {
        DrawInstruction::Identity => image.to_rgba8(),
        DrawInstruction::Scale(target) if target == src => image.to_rgba8(),
        DrawInstruction::Scale(target) if target.is_empty() => {
            RgbaImage::new(target.width, target.height)
        }
        DrawInstruction::Scale(target) => imageops::resize(
            &image.to_rgba8(),
            target.width,
            target.height,
            FilterType::Triangle,
        ),
        DrawInstruction::Crop(rect) => {
            let mut canvas = RgbaImage::new(rect.width, rect.height);
            if let Some(visible) = rect.clamp_to(src) {
                let part = image
                    .crop_imm(visible.x, visible.y, visible.width, visible.height)
                    .to_rgba8();
                imageops::replace(
                    &mut canvas,
                    &part,
                    (visible.x - rect.x) as i64,
                    (visible.y - rect.y) as i64,
                );
            }
            canvas
        }
    };

    let image = match background {
        Background::Transparent => drawn,
        Background::Opaque(color) => {
            let mut backdrop = RgbaImage::from_pixel(drawn.width(), drawn.height(), color);
            imageops::overlay(&mut backdrop, &drawn, 0, 0);
            backdrop
        }
    };

    debug!(
        "Drew {:?} onto {}x{} surface",
        instruction,
        image.width(),
        image.height()
    );
    Surface::new(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        }))
    }

    #[test]
    fn identity_keeps_size() {
        let s = draw(&checker(30, 20), DrawInstruction::Identity, Background::Transparent);
        assert_eq!(s.dimensions(), Dimensions::new(30, 20));
    }

    #[test]
    fn scale_resamples() {
        let s = draw(
            &checker(40, 20),
            DrawInstruction::Scale(Dimensions::new(10, 5)),
            Background::Transparent,
        );
        assert_eq!(s.dimensions(), Dimensions::new(10, 5));
    }

    #[test]
    fn crop_copies_source_region() {
        let s = draw(
            &checker(100, 100),
            DrawInstruction::Crop(CropRect::new(10, 20, 5, 5)),
            Background::Transparent,
        );
        assert_eq!(s.dimensions(), Dimensions::new(5, 5));
        assert_eq!(s.image().get_pixel(0, 0), &Rgba([10, 20, 0, 255]));
        assert_eq!(s.image().get_pixel(4, 4), &Rgba([14, 24, 0, 255]));
    }

    #[test]
    fn crop_outside_source_is_transparent() {
        let s = draw(
            &checker(10, 10),
            DrawInstruction::Crop(CropRect::new(8, 8, 4, 4)),
            Background::Transparent,
        );
        assert_eq!(s.dimensions(), Dimensions::new(4, 4));
        assert_eq!(s.image().get_pixel(0, 0)[3], 255);
        assert_eq!(s.image().get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn opaque_background_fills_transparency() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let s = draw(&clear, DrawInstruction::Identity, Background::Opaque(WHITE));
        assert!(s.image().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_blocking("junk.png", b"not an image", false).unwrap_err();
        assert!(matches!(err, ImgKitError::Decode { ref name, .. } if name == "junk.png"));
    }

    #[test]
    fn decode_svg_intrinsic_size() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="30">
            <rect width="40" height="30" fill="red"/></svg>"#;
        let img = decode_blocking("box.svg", svg, true).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
        let px = img.to_rgba8().get_pixel(20, 15).0;
        assert_eq!(px, [255, 0, 0, 255]);
    }

    #[test]
    fn decode_svg_refuses_oversized_canvas() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="60000" height="60000"/>"#;
        let err = decode_blocking("huge.svg", svg, true).unwrap_err();
        assert!(matches!(err, ImgKitError::Decode { ref detail, .. } if detail.contains("maximum")));
    }

    #[tokio::test]
    async fn decode_releases_object_url() {
        let urls = UrlRegistry::new();
        let bad = SourceFile::with_mime("bad.png", "image/png", b"nope".to_vec());
        assert!(decode(&bad, &urls).await.is_err());
        assert_eq!(urls.live_count(), 0);
    }
}
