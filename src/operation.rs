//! The four image operations: convert, compress, resize, crop.
//!
//! Each operation is a pure function of `(SourceFile, options)`:
//!
//! ```text
//! decode ──▶ plan geometry ──▶ draw ──▶ encode ──▶ rename
//! ```
//!
//! [`Operation::plan`] computes the draw instruction, background, output type
//! and quality from the source dimensions alone, which keeps every geometry
//! rule testable without pixels. [`Operation::apply`] runs the full chain.
//!
//! Parameter values are plain serde data so a batch run can be described
//! in JSON:
//!
//! ```json
//! { "operation": "resize", "options": { "mode": "percentage", "percentage": 50 } }
//! ```

use crate::error::{ImgKitError, PageError};
use crate::geometry::{self, CropRect, Dimensions};
use crate::locator::UrlRegistry;
use crate::pipeline::encode::{encode_surface, EncodedBlob};
use crate::pipeline::input::{extension_for_mime, SourceFile, MIME_JPEG};
use crate::pipeline::rasterize::{self, Background, DrawInstruction, WHITE};
use crate::pipeline::render::{self, PdfPageMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// JPEG quality used by convert unless overridden.
pub const DEFAULT_CONVERT_QUALITY: f32 = 0.9;
/// Quality preset for compress.
pub const DEFAULT_COMPRESS_QUALITY: f32 = 0.8;
/// Fixed encoder quality for resize and crop.
pub const OUTPUT_QUALITY: f32 = 0.9;
/// Lowest quality compress accepts.
pub const MIN_COMPRESS_QUALITY: f32 = 0.1;
/// Default compress bounding box edge.
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

pub const MIN_MAX_DIMENSION: u32 = 100;
pub const MAX_MAX_DIMENSION: u32 = 4096;
pub const MIN_PERCENTAGE: u32 = 1;
pub const MAX_PERCENTAGE: u32 = 500;

// ── Options ──────────────────────────────────────────────────────────────

/// Options for [`Operation::Convert`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// JPEG quality fraction. Default: 0.9.
    pub quality: f32,
    /// Pages to rasterise when the source is a PDF. Default: first page.
    pub pdf_pages: PdfPageMode,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_CONVERT_QUALITY,
            pdf_pages: PdfPageMode::First,
        }
    }
}

/// Options for [`Operation::Compress`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    /// Encoder quality fraction, 0.10–1.00. Default: 0.80.
    pub quality: f32,
    /// Bounding box width, 100–4096 px. Default: 2048.
    pub max_width: u32,
    /// Bounding box height, 100–4096 px. Default: 2048.
    pub max_height: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_COMPRESS_QUALITY,
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl CompressOptions {
    /// Build from UI-style values, clamping each into its accepted range.
    /// `quality_percent` is 10–100.
    pub fn new(quality_percent: u32, max_width: u32, max_height: u32) -> Self {
        Self {
            quality: quality_percent.clamp(10, 100) as f32 / 100.0,
            max_width: max_width.clamp(MIN_MAX_DIMENSION, MAX_MAX_DIMENSION),
            max_height: max_height.clamp(MIN_MAX_DIMENSION, MAX_MAX_DIMENSION),
        }
    }
}

/// Options for [`Operation::Resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResizeOptions {
    /// Absolute pixel target.
    Pixels {
        width: u32,
        height: u32,
        #[serde(default)]
        maintain_aspect_ratio: bool,
    },
    /// Both axes scaled by `percentage / 100`, 1–500.
    Percentage { percentage: u32 },
}

/// Options for [`Operation::Crop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CropOptions {
    /// Largest centred region with aspect ratio `"W:H"`.
    Ratio { ratio: String },
    /// Largest centred square.
    Square,
    /// Explicit source rectangle, clamped to the image bounds.
    Custom(CropRect),
}

// ── Operation ────────────────────────────────────────────────────────────

/// One of the four operations together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "options", rename_all = "snake_case")]
pub enum Operation {
    Convert(ConvertOptions),
    Compress(CompressOptions),
    Resize(ResizeOptions),
    Crop(CropOptions),
}

/// Everything needed to draw and encode one source, derived from its size.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub instruction: DrawInstruction,
    pub background: Background,
    /// Requested output type (the encoder may fall back to PNG).
    pub mime: String,
    pub quality: f32,
    /// Surface size the instruction produces.
    pub output: Dimensions,
}

/// One produced file.
#[derive(Debug, Clone)]
pub struct Rendition {
    /// Derived output file name.
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
    /// 1-based page index for PDF renditions.
    pub page: Option<usize>,
}

impl Rendition {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Output of [`Operation::apply`].
#[derive(Debug, Clone, Default)]
pub struct Applied {
    pub renditions: Vec<Rendition>,
    /// PDF pages that failed while others succeeded.
    pub page_errors: Vec<PageError>,
    /// Page count of a PDF source; `None` for images.
    pub total_pages: Option<usize>,
}

impl Operation {
    pub fn convert() -> Self {
        Operation::Convert(ConvertOptions::default())
    }

    pub fn compress(quality_percent: u32, max_width: u32, max_height: u32) -> Self {
        Operation::Compress(CompressOptions::new(quality_percent, max_width, max_height))
    }

    pub fn resize_pixels(width: u32, height: u32, maintain_aspect_ratio: bool) -> Self {
        Operation::Resize(ResizeOptions::Pixels {
            width,
            height,
            maintain_aspect_ratio,
        })
    }

    pub fn resize_percentage(percentage: u32) -> Self {
        Operation::Resize(ResizeOptions::Percentage { percentage })
    }

    pub fn crop_square() -> Self {
        Operation::Crop(CropOptions::Square)
    }

    pub fn crop_ratio(ratio: impl Into<String>) -> Self {
        Operation::Crop(CropOptions::Ratio {
            ratio: ratio.into(),
        })
    }

    pub fn crop_custom(rect: CropRect) -> Self {
        Operation::Crop(CropOptions::Custom(rect))
    }

    /// Lower-case verb, for logs and messages.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Convert(_) => "convert",
            Operation::Compress(_) => "compress",
            Operation::Resize(_) => "resize",
            Operation::Crop(_) => "crop",
        }
    }

    /// Suffix inserted before the extension of the output name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Operation::Convert(_) => "",
            Operation::Compress(_) => "_compressed",
            Operation::Resize(_) => "_resized",
            Operation::Crop(_) => "_cropped",
        }
    }

    /// Only convert rasterises PDFs.
    pub fn accepts_pdf(&self) -> bool {
        matches!(self, Operation::Convert(_))
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ImgKitError> {
        let check_quality = |q: f32, min: f32| {
            if q.is_finite() && (min..=1.0).contains(&q) {
                Ok(())
            } else {
                Err(ImgKitError::InvalidConfig(format!(
                    "quality must be within {min}–1, got {q}"
                )))
            }
        };

        match self {
            Operation::Convert(o) => check_quality(o.quality, 0.0),
            Operation::Compress(o) => {
                check_quality(o.quality, MIN_COMPRESS_QUALITY)?;
                for (label, v) in [("max_width", o.max_width), ("max_height", o.max_height)] {
                    if !(MIN_MAX_DIMENSION..=MAX_MAX_DIMENSION).contains(&v) {
                        return Err(ImgKitError::InvalidConfig(format!(
                            "{label} must be {MIN_MAX_DIMENSION}–{MAX_MAX_DIMENSION} px, got {v}"
                        )));
                    }
                }
                Ok(())
            }
            Operation::Resize(ResizeOptions::Pixels { width, height, .. }) => {
                if *width == 0 || *height == 0 {
                    return Err(ImgKitError::InvalidConfig(format!(
                        "resize target must be positive, got {width}x{height}"
                    )));
                }
                Ok(())
            }
            Operation::Resize(ResizeOptions::Percentage { percentage }) => {
                if !(MIN_PERCENTAGE..=MAX_PERCENTAGE).contains(percentage) {
                    return Err(ImgKitError::InvalidConfig(format!(
                        "percentage must be {MIN_PERCENTAGE}–{MAX_PERCENTAGE}, got {percentage}"
                    )));
                }
                Ok(())
            }
            Operation::Crop(CropOptions::Ratio { ratio }) => geometry::parse_ratio(ratio).map(|_| ()),
            Operation::Crop(CropOptions::Square) => Ok(()),
            Operation::Crop(CropOptions::Custom(rect)) => {
                if rect.width == 0 || rect.height == 0 {
                    return Err(ImgKitError::InvalidConfig(format!(
                        "crop rectangle must be positive, got {}x{}",
                        rect.width, rect.height
                    )));
                }
                Ok(())
            }
        }
    }

    /// Compute geometry and encoding parameters for a source of size `src`
    /// and type `source_mime`.
    ///
    /// Fails with [`ImgKitError::InvalidConfig`] when the output surface
    /// would exceed [`geometry::MAX_SURFACE_SIDE`] or
    /// [`geometry::MAX_SURFACE_PIXELS`], or a custom crop misses the image.
    pub fn plan(&self, src: Dimensions, source_mime: &str) -> Result<RenderPlan, ImgKitError> {
        let same_type = |instruction: DrawInstruction, output: Dimensions, quality: f32| RenderPlan {
            instruction,
            background: Background::Transparent,
            mime: source_mime.to_string(),
            quality,
            output,
        };

        let plan = match self {
            Operation::Convert(o) => RenderPlan {
                instruction: DrawInstruction::Identity,
                background: Background::Opaque(WHITE),
                mime: MIME_JPEG.to_string(),
                quality: o.quality,
                output: src,
            },
            Operation::Compress(o) => {
                let out = geometry::fit_within(src, o.max_width, o.max_height);
                same_type(DrawInstruction::Scale(out), out, o.quality)
            }
            Operation::Resize(ResizeOptions::Pixels {
                width,
                height,
                maintain_aspect_ratio,
            }) => {
                let out = geometry::resize_to_pixels(src, *width, *height, *maintain_aspect_ratio);
                same_type(DrawInstruction::Scale(out), out, OUTPUT_QUALITY)
            }
            Operation::Resize(ResizeOptions::Percentage { percentage }) => {
                let out = geometry::resize_by_percentage(src, *percentage);
                same_type(DrawInstruction::Scale(out), out, OUTPUT_QUALITY)
            }
            Operation::Crop(crop) => {
                let rect = match crop {
                    CropOptions::Square => geometry::square_crop(src),
                    CropOptions::Ratio { ratio } => {
                        let (w, h) = geometry::parse_ratio(ratio)?;
                        geometry::ratio_crop(src, w, h)
                    }
                    CropOptions::Custom(rect) => rect.clamp_to(src).ok_or_else(|| {
                        ImgKitError::InvalidConfig(format!(
                            "crop rectangle {}x{}+{}+{} lies outside the {}x{} image",
                            rect.width, rect.height, rect.x, rect.y, src.width, src.height
                        ))
                    })?,
                };
                same_type(DrawInstruction::Crop(rect), rect.dimensions(), OUTPUT_QUALITY)
            }
        };
        geometry::check_surface(plan.output).map_err(ImgKitError::InvalidConfig)?;
        debug!(
            "{} plan: {}x{} → {}x{}",
            self.name(),
            src.width,
            src.height,
            plan.output.width,
            plan.output.height
        );
        Ok(plan)
    }

    /// Run the operation on one source file.
    ///
    /// PDFs are only accepted by convert; every other operation returns
    /// [`ImgKitError::UnsupportedInput`] for them.
    pub async fn apply(&self, source: &SourceFile, urls: &UrlRegistry) -> Result<Applied, ImgKitError> {
        self.validate()?;

        if source.is_pdf() {
            return match self {
                Operation::Convert(o) => apply_pdf(source, o, urls).await,
                _ => Err(ImgKitError::UnsupportedInput {
                    name: source.name().to_string(),
                    mime: source.mime().to_string(),
                    operation: self.name(),
                }),
            };
        }

        let image = rasterize::decode(source, urls).await?;
        let src = Dimensions::new(image.width(), image.height());
        let plan = self.plan(src, source.mime()).map_err(|e| match e {
            // a custom crop that misses, or a target too large for, this
            // particular image is a per-file failure
            ImgKitError::InvalidConfig(detail) => ImgKitError::encode(source.name(), detail),
            other => other,
        })?;

        let name = source.name().to_string();
        let blob = tokio::task::spawn_blocking(move || -> Result<EncodedBlob, ImgKitError> {
            let surface = rasterize::draw(&image, plan.instruction, plan.background);
            encode_surface(&surface, &plan.mime, plan.quality, &name)
        })
        .await
        .map_err(|e| ImgKitError::Internal(format!("Encode task panicked: {}", e)))??;

        let new_ext = match self {
            Operation::Convert(_) => Some("jpg"),
            _ if same_family(source.mime(), blob.mime) => None,
            _ => Some(extension_for_mime(blob.mime)),
        };

        Ok(Applied {
            renditions: vec![Rendition {
                name: output_name(source.name(), self.suffix(), new_ext),
                mime: blob.mime,
                dimensions: blob.dimensions,
                bytes: blob.bytes,
                page: None,
            }],
            page_errors: Vec::new(),
            total_pages: None,
        })
    }
}

/// `true` when an encoder output type is the source's own type.
fn same_family(source_mime: &str, output_mime: &str) -> bool {
    source_mime == output_mime || (source_mime == "image/jpg" && output_mime == MIME_JPEG)
}

async fn apply_pdf(
    source: &SourceFile,
    options: &ConvertOptions,
    urls: &UrlRegistry,
) -> Result<Applied, ImgKitError> {
    let doc = render::render_pdf(source, options.pdf_pages, options.quality, urls).await?;
    let per_page = options.pdf_pages == PdfPageMode::All;

    let renditions = doc
        .pages
        .into_iter()
        .map(|p| {
            let suffix = if per_page {
                format!("_page-{}", p.page)
            } else {
                String::new()
            };
            Rendition {
                name: output_name(source.name(), &suffix, Some("jpg")),
                mime: p.blob.mime,
                dimensions: p.blob.dimensions,
                bytes: p.blob.bytes,
                page: Some(p.page),
            }
        })
        .collect();

    Ok(Applied {
        renditions,
        page_errors: doc.errors,
        total_pages: Some(doc.total_pages),
    })
}

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

/// Derive an output name: insert `suffix` before the extension and, when
/// `new_ext` is given, replace the extension.
///
/// Names without an extension get the suffix (and new extension) appended.
pub fn output_name(original: &str, suffix: &str, new_ext: Option<&str>) -> String {
    let (stem, ext) = match RE_EXTENSION.find(original) {
        Some(m) => (&original[..m.start()], m.as_str()),
        None => (original, ""),
    };
    match new_ext {
        Some(e) => format!("{stem}{suffix}.{e}"),
        None => format!("{stem}{suffix}{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names() {
        assert_eq!(output_name("photo.png", "", Some("jpg")), "photo.jpg");
        assert_eq!(output_name("scan.PDF", "", Some("jpg")), "scan.jpg");
        assert_eq!(output_name("a.b.webp", "_compressed", None), "a.b_compressed.webp");
        assert_eq!(output_name("IMG_1.JPG", "_resized", None), "IMG_1_resized.JPG");
        assert_eq!(output_name("noext", "_cropped", None), "noext_cropped");
        assert_eq!(output_name("noext", "", Some("jpg")), "noext.jpg");
        assert_eq!(output_name("doc.pdf", "_page-3", Some("jpg")), "doc_page-3.jpg");
    }

    #[test]
    fn convert_plan_keeps_size_and_targets_jpeg() {
        let plan = Operation::convert()
            .plan(Dimensions::new(640, 480), "image/png")
            .unwrap();
        assert_eq!(plan.output, Dimensions::new(640, 480));
        assert_eq!(plan.mime, MIME_JPEG);
        assert_eq!(plan.background, Background::Opaque(WHITE));
        assert_eq!(plan.quality, DEFAULT_CONVERT_QUALITY);
    }

    #[test]
    fn compress_plan_keeps_source_type() {
        let plan = Operation::compress(70, 1000, 1000)
            .plan(Dimensions::new(4000, 2000), "image/webp")
            .unwrap();
        assert_eq!(plan.output, Dimensions::new(1000, 500));
        assert_eq!(plan.mime, "image/webp");
        assert!((plan.quality - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn resize_plans() {
        let op = Operation::resize_pixels(800, 600, true);
        let plan = op.plan(Dimensions::new(1600, 800), "image/png").unwrap();
        assert_eq!(plan.output, Dimensions::new(800, 400));

        let op = Operation::resize_percentage(50);
        let plan = op.plan(Dimensions::new(800, 600), "image/png").unwrap();
        assert_eq!(plan.output, Dimensions::new(400, 300));
        assert_eq!(plan.instruction, DrawInstruction::Scale(Dimensions::new(400, 300)));
    }

    #[test]
    fn crop_plans() {
        let plan = Operation::crop_square()
            .plan(Dimensions::new(1200, 800), "image/jpeg")
            .unwrap();
        assert_eq!(plan.instruction, DrawInstruction::Crop(CropRect::new(200, 0, 800, 800)));

        let plan = Operation::crop_custom(CropRect::new(900, 700, 500, 500))
            .plan(Dimensions::new(1000, 800), "image/png")
            .unwrap();
        assert_eq!(plan.output, Dimensions::new(100, 100));

        let err = Operation::crop_custom(CropRect::new(2000, 0, 10, 10))
            .plan(Dimensions::new(1000, 800), "image/png")
            .unwrap_err();
        assert!(matches!(err, ImgKitError::InvalidConfig(_)));
    }

    #[test]
    fn plan_refuses_oversized_surfaces() {
        let err = Operation::resize_pixels(60_000, 60_000, false)
            .plan(Dimensions::new(4, 4), "image/png")
            .unwrap_err();
        assert!(matches!(err, ImgKitError::InvalidConfig(_)));

        // 8000x6000 at 500% is 40000x30000
        let err = Operation::resize_percentage(500)
            .plan(Dimensions::new(8000, 6000), "image/jpeg")
            .unwrap_err();
        assert!(matches!(err, ImgKitError::InvalidConfig(_)));

        assert!(Operation::resize_percentage(500)
            .plan(Dimensions::new(1000, 1000), "image/jpeg")
            .is_ok());
    }

    #[tokio::test]
    async fn oversized_target_fails_only_that_file() {
        let mut png = Vec::new();
        image::DynamicImage::new_rgba8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let source = SourceFile::with_mime("tiny.png", "image/png", png);
        let urls = UrlRegistry::new();
        let err = Operation::resize_pixels(60_000, 60_000, false)
            .apply(&source, &urls)
            .await
            .unwrap_err();
        assert!(matches!(err, ImgKitError::Encode { ref name, .. } if name == "tiny.png"));
        assert_eq!(urls.live_count(), 0);
    }

    #[test]
    fn validation_ranges() {
        assert!(Operation::resize_percentage(0).validate().is_err());
        assert!(Operation::resize_percentage(501).validate().is_err());
        assert!(Operation::resize_percentage(500).validate().is_ok());
        assert!(Operation::resize_pixels(0, 10, false).validate().is_err());
        assert!(Operation::crop_ratio("wide").validate().is_err());
        assert!(Operation::crop_custom(CropRect::new(0, 0, 0, 5)).validate().is_err());
        let bad = Operation::Compress(CompressOptions {
            quality: 0.5,
            max_width: 50,
            max_height: 500,
        });
        assert!(bad.validate().is_err());
        let low = |quality| Operation::Compress(CompressOptions {
            quality,
            ..Default::default()
        });
        assert!(low(0.05).validate().is_err());
        assert!(low(0.0).validate().is_err());
        assert!(low(MIN_COMPRESS_QUALITY).validate().is_ok());
        assert!(low(1.0).validate().is_ok());
        assert!(Operation::compress(10, 100, 100).validate().is_ok());
        let from_json: Operation =
            serde_json::from_str(r#"{"operation":"compress","options":{"quality":0.0}}"#).unwrap();
        assert!(matches!(from_json.validate(), Err(ImgKitError::InvalidConfig(_))));
        let bad = Operation::Convert(ConvertOptions {
            quality: 1.5,
            ..Default::default()
        });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn compress_options_clamp() {
        let o = CompressOptions::new(5, 10, 99_999);
        assert_eq!(o.quality, 0.1);
        assert_eq!(o.max_width, 100);
        assert_eq!(o.max_height, 4096);
    }

    #[test]
    fn operation_json_shape() {
        let op: Operation = serde_json::from_str(
            r#"{"operation":"resize","options":{"mode":"percentage","percentage":50}}"#,
        )
        .unwrap();
        assert_eq!(op, Operation::resize_percentage(50));

        let op: Operation = serde_json::from_str(
            r#"{"operation":"crop","options":{"mode":"custom","x":1,"y":2,"width":3,"height":4}}"#,
        )
        .unwrap();
        assert_eq!(op, Operation::crop_custom(CropRect::new(1, 2, 3, 4)));

        let op: Operation =
            serde_json::from_str(r#"{"operation":"compress","options":{"quality":0.5}}"#).unwrap();
        assert_eq!(
            op,
            Operation::Compress(CompressOptions {
                quality: 0.5,
                ..Default::default()
            })
        );

        let json = serde_json::to_string(&Operation::crop_square()).unwrap();
        assert_eq!(json, r#"{"operation":"crop","options":{"mode":"square"}}"#);
    }

    #[tokio::test]
    async fn pdf_rejected_by_non_convert_operations() {
        let pdf = SourceFile::with_mime("doc.pdf", "application/pdf", b"%PDF-1.4".to_vec());
        let err = Operation::crop_square()
            .apply(&pdf, &UrlRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ImgKitError::UnsupportedInput { operation: "crop", .. }));
    }
}
