//! Redacted image rendering
//!
//! Regions come from a fixed character grid (100 columns by 50 rows over the
//! page), not from OCR bounding boxes. The estimate is coarse: it assumes the
//! cleaned text wraps every 100 characters and that lines fill the page.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const GRID_COLUMNS: u32 = 100;
pub const GRID_ROWS: u32 = 50;
pub const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown redaction method `{0}` (expected black_box, blur or pixelate)")]
    UnknownMethod(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMethod {
    #[default]
    BlackBox,
    Blur,
    Pixelate,
}

impl RedactionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RedactionMethod::BlackBox => "black_box",
            RedactionMethod::Blur => "blur",
            RedactionMethod::Pixelate => "pixelate",
        }
    }
}

impl fmt::Display for RedactionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedactionMethod {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "black_box" => Ok(RedactionMethod::BlackBox),
            "blur" => Ok(RedactionMethod::Blur),
            "pixelate" => Ok(RedactionMethod::Pixelate),
            other => Err(RenderError::UnknownMethod(other.to_string())),
        }
    }
}

/// Character span `[start, end)` in the cleaned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

/// Pixel rectangle, clipped to the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Maps character spans onto the page grid. Spans that land outside the page
/// produce nothing.
pub fn estimate_regions(spans: &[CharSpan], img_width: u32, img_height: u32) -> Vec<Region> {
    let cell_w = img_width as f64 / GRID_COLUMNS as f64;
    let cell_h = img_height as f64 / GRID_ROWS as f64;

    spans
        .iter()
        .filter_map(|span| {
            let len = span.end.saturating_sub(span.start) as f64;
            let column = (span.start as u64 % GRID_COLUMNS as u64) as f64;
            let row = (span.start as u64 / GRID_COLUMNS as u64) as f64;
            let x1 = (column * cell_w).clamp(0.0, img_width as f64);
            let y1 = (row * cell_h).clamp(0.0, img_height as f64);
            let x2 = (x1 + len * cell_w).clamp(x1, img_width as f64);
            let y2 = (y1 + cell_h).clamp(y1, img_height as f64);

            let region = Region {
                x: x1 as u32,
                y: y1 as u32,
                width: (x2 - x1).ceil() as u32,
                height: (y2 - y1).ceil() as u32,
            };
            clip(region, img_width, img_height)
        })
        .collect()
}

fn clip(region: Region, img_width: u32, img_height: u32) -> Option<Region> {
    if region.x >= img_width || region.y >= img_height {
        return None;
    }
    let clipped = Region {
        width: region.width.min(img_width - region.x),
        height: region.height.min(img_height - region.y),
        ..region
    };
    (!clipped.is_empty()).then_some(clipped)
}

/// Loads `input`, redacts the estimated regions and writes a JPEG to `output`.
pub fn redact_image(
    input: &Path,
    spans: &[CharSpan],
    output: &Path,
    method: RedactionMethod,
) -> Result<PathBuf, RenderError> {
    let mut img = image::open(input)?.to_rgb8();
    let regions = estimate_regions(spans, img.width(), img.height());
    apply_redactions(&mut img, &regions, method);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(output)?);
    JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&img)?;

    log::info!(
        "[Render] {} regions redacted with {} -> {}",
        regions.len(),
        method,
        output.display()
    );
    Ok(output.to_path_buf())
}

pub fn apply_redactions(img: &mut RgbImage, regions: &[Region], method: RedactionMethod) {
    for region in regions {
        let Some(region) = clip(*region, img.width(), img.height()) else {
            continue;
        };
        match method {
            RedactionMethod::BlackBox => fill(img, &region, Rgb([0, 0, 0])),
            RedactionMethod::Blur => blur(img, &region),
            RedactionMethod::Pixelate => pixelate(img, &region),
        }
    }
}

fn fill(img: &mut RgbImage, region: &Region, colour: Rgb<u8>) {
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            img.put_pixel(x, y, colour);
        }
    }
}

fn blur(img: &mut RgbImage, region: &Region) {
    let patch = imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image();
    let sigma = (region.width.max(region.height) as f32 / 4.0).max(2.0);
    let blurred = imageproc::filter::gaussian_blur_f32(&patch, sigma);
    imageops::replace(img, &blurred, region.x as i64, region.y as i64);
}

/// Replaces square blocks by their mean colour.
fn pixelate(img: &mut RgbImage, region: &Region) {
    let block = (region.height / 2).clamp(4, 32);
    let mut by = region.y;
    while by < region.y + region.height {
        let bh = block.min(region.y + region.height - by);
        let mut bx = region.x;
        while bx < region.x + region.width {
            let bw = block.min(region.x + region.width - bx);
            let cell = Region { x: bx, y: by, width: bw, height: bh };
            let colour = mean_colour(img, &cell);
            fill(img, &cell, colour);
            bx += bw;
        }
        by += bh;
    }
}

fn mean_colour(img: &RgbImage, region: &Region) -> Rgb<u8> {
    let mut sum = [0u64; 3];
    for y in region.y..region.y + region.height {
        for x in region.x..region.x + region.width {
            let p = img.get_pixel(x, y);
            for c in 0..3 {
                sum[c] += p[c] as u64;
            }
        }
    }
    let n = (region.width as u64 * region.height as u64).max(1);
    Rgb([(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("black_box".parse::<RedactionMethod>().unwrap(), RedactionMethod::BlackBox);
        assert_eq!("pixelate".parse::<RedactionMethod>().unwrap(), RedactionMethod::Pixelate);
        assert!(matches!(
            "smudge".parse::<RedactionMethod>(),
            Err(RenderError::UnknownMethod(m)) if m == "smudge"
        ));
        let method: RedactionMethod = serde_json::from_str("\"blur\"").unwrap();
        assert_eq!(method, RedactionMethod::Blur);
        assert!(serde_json::from_str::<RedactionMethod>("\"smudge\"").is_err());
    }

    #[test]
    fn test_grid_estimate() {
        let spans = [
            CharSpan { start: 9, end: 17 },
            CharSpan { start: 205, end: 215 },
        ];
        let regions = estimate_regions(&spans, 1000, 500);
        assert_eq!(regions[0], Region { x: 90, y: 0, width: 80, height: 10 });
        assert_eq!(regions[1], Region { x: 50, y: 20, width: 100, height: 10 });
    }

    #[test]
    fn test_grid_estimate_clips() {
        let spans = [
            CharSpan { start: 95, end: 120 },
            CharSpan { start: 10_000, end: 10_010 },
        ];
        let regions = estimate_regions(&spans, 1000, 500);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].x + regions[0].width, 1000);
    }

    #[test]
    fn test_black_box() {
        let mut img = striped(40, 20);
        let region = Region { x: 4, y: 2, width: 10, height: 5 };
        apply_redactions(&mut img, &[region], RedactionMethod::BlackBox);
        assert_eq!(*img.get_pixel(4, 2), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(12, 6), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(20, 10), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_pixelate_averages_blocks() {
        let mut img = striped(40, 20);
        let region = Region { x: 0, y: 0, width: 8, height: 8 };
        apply_redactions(&mut img, &[region], RedactionMethod::Pixelate);
        // 4x4 blocks of alternating columns average to mid grey
        assert_eq!(*img.get_pixel(0, 0), Rgb([127, 127, 127]));
        assert_eq!(*img.get_pixel(7, 7), Rgb([127, 127, 127]));
        assert_eq!(*img.get_pixel(8, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_blur_softens_region_only() {
        let mut img = striped(40, 20);
        let region = Region { x: 10, y: 5, width: 12, height: 8 };
        apply_redactions(&mut img, &[region], RedactionMethod::Blur);
        let p = img.get_pixel(16, 9);
        assert!(p[0] > 20 && p[0] < 235, "expected grey, got {:?}", p);
        assert_eq!(*img.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_redact_image_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.jpg");
        RgbImage::from_pixel(1000, 500, Rgb([240, 240, 240]))
            .save(&input)
            .unwrap();

        let output = dir.path().join("out").join("redacted_page.jpg");
        let written = redact_image(
            &input,
            &[CharSpan { start: 0, end: 10 }],
            &output,
            RedactionMethod::BlackBox,
        )
        .unwrap();
        assert_eq!(written, output);

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
        let back = image::open(&output).unwrap().to_rgb8();
        assert!(back.get_pixel(50, 5)[0] < 40);
        assert!(back.get_pixel(900, 400)[0] > 200);
    }

    #[test]
    fn test_redact_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = redact_image(
            &dir.path().join("missing.jpg"),
            &[],
            &dir.path().join("out.jpg"),
            RedactionMethod::Blur,
        );
        assert!(result.is_err());
    }
}
