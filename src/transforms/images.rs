//! Lossless-where-possible image re-encoding.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, ImageFormat};
use regex::Regex;
use std::sync::OnceLock;

use super::types::{Transform, TransformError};
use crate::asset::{Asset, Bundle};

/// Default JPEG re-encode quality
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Image optimizer adapter.
///
/// PNGs are re-encoded at best compression, JPEGs at the configured quality
/// and SVGs lose comments and inter-tag whitespace. An entry keeps its
/// original bytes when the result is not smaller. Other files pass through.
#[derive(Debug, Clone)]
pub struct OptimizeImages {
    jpeg_quality: u8,
}

impl Default for OptimizeImages {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl OptimizeImages {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality: jpeg_quality.clamp(1, 100) }
    }

    fn optimize(&self, asset: &Asset) -> Result<Option<Vec<u8>>, String> {
        match asset.extension().as_deref() {
            Some("png") => optimize_png(&asset.contents).map(Some),
            Some("jpg") | Some("jpeg") => optimize_jpeg(&asset.contents, self.jpeg_quality).map(Some),
            Some("svg") => Ok(Some(optimize_svg(&asset.text()).into_bytes())),
            _ => Ok(None),
        }
    }
}

fn optimize_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png).map_err(|e| e.to_string())?;
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color())
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

fn optimize_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).map_err(|e| e.to_string())?;
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

fn svg_comment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("svg comment pattern is valid"))
}

fn svg_tag_gap() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r">\s+<").expect("svg whitespace pattern is valid"))
}

/// Strip comments and whitespace between tags.
pub fn optimize_svg(svg: &str) -> String {
    let stripped = svg_comment().replace_all(svg, "");
    svg_tag_gap().replace_all(stripped.trim(), "><").into_owned()
}

impl Transform for OptimizeImages {
    fn name(&self) -> &str {
        "optimize_images"
    }

    fn apply(&self, bundle: Bundle) -> Result<Bundle, TransformError> {
        bundle.try_map(|asset| {
            let optimized = self
                .optimize(&asset)
                .map_err(|e| TransformError::new("optimize_images", e).at(&asset.path))?;
            match optimized {
                Some(bytes) if bytes.len() < asset.contents.len() => {
                    tracing::debug!(
                        path = %asset.path.display(),
                        before = asset.contents.len(),
                        after = bytes.len(),
                        "image optimized"
                    );
                    Ok(asset.with_contents(bytes))
                }
                _ => Ok(asset),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn sample_png() -> Vec<u8> {
        let img = ImageBuffer::from_fn(48, 48, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([200u8, 40, 40, 255])
            } else {
                Rgba([40u8, 40, 200, 255])
            }
        });
        let mut buf = Vec::new();
        PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), 48, 48, ColorType::Rgba8)
            .unwrap();
        buf
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128u8]));
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 100)
            .encode(img.as_raw(), 64, 64, ColorType::Rgb8)
            .unwrap();
        buf
    }

    fn optimize_one(asset: Asset) -> Asset {
        let out = OptimizeImages::default().apply(std::iter::once(asset).collect()).unwrap();
        out.into_entries().remove(0)
    }

    #[test]
    fn test_png_never_grows_and_still_decodes() {
        let original = sample_png();
        let out = optimize_one(Asset::new("images/check.png", original.clone()));
        assert!(out.contents.len() <= original.len());

        let decoded = image::load_from_memory_with_format(&out.contents, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (48, 48));
    }

    #[test]
    fn test_jpeg_reencoded_smaller() {
        let original = sample_jpeg();
        let out = OptimizeImages::new(40)
            .apply(std::iter::once(Asset::new("photo.JPG", original.clone())).collect())
            .unwrap();
        let optimized = &out.entries()[0];
        assert!(optimized.contents.len() < original.len());
        assert_eq!(optimized.path, std::path::PathBuf::from("photo.JPG"));
    }

    #[test]
    fn test_svg_cleanup() {
        let svg = "<svg>\n  <!-- drawn by hand -->\n  <circle r=\"4\"/>\n</svg>\n";
        assert_eq!(optimize_svg(svg), "<svg><circle r=\"4\"/></svg>");
        let out = optimize_one(Asset::new("icon.svg", svg));
        assert_eq!(out.text(), "<svg><circle r=\"4\"/></svg>");
    }

    #[test]
    fn test_other_files_pass_through() {
        let out = optimize_one(Asset::new("fonts/a.woff2", vec![1u8, 2, 3]));
        assert_eq!(out.contents, vec![1u8, 2, 3]);
    }

    #[test]
    fn test_corrupt_image_fails() {
        let err = OptimizeImages::default()
            .apply(std::iter::once(Asset::new("broken.png", "not a png")).collect())
            .unwrap_err();
        assert_eq!(err.transform, "optimize_images");
    }
}
