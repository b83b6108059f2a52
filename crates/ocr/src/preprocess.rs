//! Image normalization ahead of recognition
//!
//! Contrast enhancement, noise reduction and skew correction. Each step runs
//! behind a panic guard; a step that fails leaves the image as it was and is
//! left out of the reported steps.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::error::OcrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStep {
    ContrastEnhancement,
    NoiseReduction,
    OrientationCorrection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    fn of(img: &DynamicImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessMetadata {
    pub preprocessing_steps: Vec<PreprocessStep>,
    /// Estimated skew in degrees, present when non-zero
    pub skew_angle: Option<f64>,
    pub skew_corrected: bool,
    pub original_dimensions: Dimensions,
    pub final_dimensions: Dimensions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessOptions {
    /// Rotate only when the estimated skew exceeds this, in degrees
    pub skew_threshold: f64,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_vote_threshold: u32,
    pub hough_suppression_radius: u32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            skew_threshold: 0.5,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_vote_threshold: 100,
            hough_suppression_radius: 8,
        }
    }
}

/// Lines further than this from horizontal are not text baselines.
const MAX_LINE_DEVIATION: f64 = 45.0;

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    options: PreprocessOptions,
}

impl Preprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    /// Returns the normalized copy; `img` is left untouched.
    pub fn preprocess(&self, img: &DynamicImage) -> (DynamicImage, PreprocessMetadata) {
        let start = Instant::now();
        let original_dimensions = Dimensions::of(img);
        let mut steps = Vec::new();
        let mut current = img.clone();

        if let Some(next) = guarded("contrast enhancement", || enhance_contrast(&current)) {
            current = next;
            steps.push(PreprocessStep::ContrastEnhancement);
        }

        if let Some(next) = guarded("noise reduction", || reduce_noise(&current)) {
            current = next;
            steps.push(PreprocessStep::NoiseReduction);
        }

        let mut skew_angle = None;
        let mut skew_corrected = false;
        if let Some(angle) = guarded("skew estimation", || self.estimate_skew(&current)) {
            if angle != 0.0 {
                skew_angle = Some(angle);
            }
            if angle.abs() > self.options.skew_threshold {
                if let Some(next) = guarded("orientation correction", || deskew(&current, angle)) {
                    current = next;
                    skew_corrected = true;
                    steps.push(PreprocessStep::OrientationCorrection);
                }
            }
        }

        log::info!(
            "[Preprocess] {} steps, skew {:.2}°, {} ms",
            steps.len(),
            skew_angle.unwrap_or(0.0),
            start.elapsed().as_millis()
        );

        let metadata = PreprocessMetadata {
            preprocessing_steps: steps,
            skew_angle,
            skew_corrected,
            original_dimensions,
            final_dimensions: Dimensions::of(&current),
        };
        (current, metadata)
    }

    /// Median deviation from horizontal of the detected lines, 0 without lines.
    pub fn estimate_skew(&self, img: &DynamicImage) -> Result<f64, OcrError> {
        ensure_not_empty(img)?;
        let gray = img.to_luma8();
        let edges = imageproc::edges::canny(&gray, self.options.canny_low, self.options.canny_high);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: self.options.hough_vote_threshold,
                suppression_radius: self.options.hough_suppression_radius,
            },
        );

        // angle 90 is a horizontal line
        let mut deviations: Vec<f64> = lines
            .iter()
            .map(|line| line.angle_in_degrees as f64 - 90.0)
            .filter(|d| d.abs() < MAX_LINE_DEVIATION)
            .collect();
        log::debug!(
            "[Preprocess] {} lines, {} near horizontal",
            lines.len(),
            deviations.len()
        );
        Ok(median(&mut deviations))
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Runs `step`, turning an error or a panic into `None`.
fn guarded<T>(name: &str, step: impl FnOnce() -> Result<T, OcrError>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log::warn!("[Preprocess] {} skipped: {}", name, e);
            None
        }
        Err(_) => {
            log::warn!("[Preprocess] {} panicked, image left unchanged", name);
            None
        }
    }
}

fn ensure_not_empty(img: &DynamicImage) -> Result<(), OcrError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(OcrError::ImageProcess(format!(
            "image has a zero dimension ({}x{})",
            img.width(),
            img.height()
        )));
    }
    Ok(())
}

fn is_gray(img: &DynamicImage) -> bool {
    !img.color().has_color()
}

/// Histogram equalization of luminance. Colour images keep their chroma.
fn enhance_contrast(img: &DynamicImage) -> Result<DynamicImage, OcrError> {
    ensure_not_empty(img)?;
    if is_gray(img) {
        let gray = img.to_luma8();
        return Ok(DynamicImage::ImageLuma8(imageproc::contrast::equalize_histogram(&gray)));
    }

    let rgb = img.to_rgb8();
    let luma = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([luminance(rgb.get_pixel(x, y)).round().clamp(0.0, 255.0) as u8])
    });
    let equalized = imageproc::contrast::equalize_histogram(&luma);

    let out = RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let y_old = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = b - y_old;
        let cr = r - y_old;
        let y_new = equalized.get_pixel(x, y)[0] as f32;
        let r2 = y_new + cr;
        let b2 = y_new + cb;
        let g2 = (y_new - 0.299 * r2 - 0.114 * b2) / 0.587;
        Rgb([to_u8(r2), to_u8(g2), to_u8(b2)])
    });
    Ok(DynamicImage::ImageRgb8(out))
}

fn luminance(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// 3x3 median filter
fn reduce_noise(img: &DynamicImage) -> Result<DynamicImage, OcrError> {
    ensure_not_empty(img)?;
    Ok(if is_gray(img) {
        DynamicImage::ImageLuma8(imageproc::filter::median_filter(&img.to_luma8(), 1, 1))
    } else {
        DynamicImage::ImageRgb8(imageproc::filter::median_filter(&img.to_rgb8(), 1, 1))
    })
}

/// Rotates by `-angle` degrees about the centre, keeping the canvas size and
/// filling exposed corners with white.
fn deskew(img: &DynamicImage, angle: f64) -> Result<DynamicImage, OcrError> {
    ensure_not_empty(img)?;
    let theta = -(angle as f32).to_radians();
    Ok(if is_gray(img) {
        DynamicImage::ImageLuma8(rotate_about_center(
            &img.to_luma8(),
            theta,
            Interpolation::Bicubic,
            Luma([255]),
        ))
    } else {
        DynamicImage::ImageRgb8(rotate_about_center(
            &img.to_rgb8(),
            theta,
            Interpolation::Bicubic,
            Rgb([255, 255, 255]),
        ))
    })
}
