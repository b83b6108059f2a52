//! Model input tensors for PP-OCR

use image::{imageops, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::{s, Array3, Array4, Axis};

/// Detection input side limits
const DET_LIMIT_SIDE: u32 = 960;
const DET_LIMIT_MIN: u32 = 32;

/// Recognition input size
pub const REC_IMAGE_HEIGHT: u32 = 48;
pub const REC_IMAGE_WIDTH: u32 = 320;

/// Padding added around each detected box before cropping
const CROP_PAD_RATIO: f32 = 0.04;

/// `(x/255 - 0.5) / 0.5`
const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// Resizes to multiples of 32 within the side limits and normalizes to NCHW.
pub fn prepare_det_input(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let ratio = det_ratio(rgb.width(), rgb.height());
    let new_w = ((rgb.width() as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);
    let new_h = ((rgb.height() as f32 * ratio) as u32 / 32 * 32).max(DET_LIMIT_MIN);

    let resized = imageops::resize(&rgb, new_w, new_h, imageops::FilterType::Lanczos3);
    to_chw_bgr(&resized).insert_axis(Axis(0))
}

fn det_ratio(w: u32, h: u32) -> f32 {
    let max_side = w.max(h) as f32;
    let min_side = w.min(h).max(1) as f32;

    let mut ratio = 1.0f32;
    if max_side > DET_LIMIT_SIDE as f32 {
        ratio = DET_LIMIT_SIDE as f32 / max_side;
    }
    if min_side * ratio < DET_LIMIT_MIN as f32 {
        ratio = DET_LIMIT_MIN as f32 / min_side;
    }
    ratio
}

/// Line crops scaled to the recognition height, right-padded with grey.
pub fn prepare_rec_batch(images: &[DynamicImage], batch_size: usize) -> Vec<Array4<f32>> {
    images
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut batch = Array4::<f32>::zeros((
                chunk.len(),
                3,
                REC_IMAGE_HEIGHT as usize,
                REC_IMAGE_WIDTH as usize,
            ));
            for (i, img) in chunk.iter().enumerate() {
                batch.slice_mut(s![i, .., .., ..]).assign(&rec_tensor(img));
            }
            batch
        })
        .collect()
}

fn rec_tensor(img: &DynamicImage) -> Array3<f32> {
    let rgb = img.to_rgb8();
    let ratio = REC_IMAGE_HEIGHT as f32 / rgb.height().max(1) as f32;
    let new_w = ((rgb.width() as f32 * ratio) as u32).clamp(1, REC_IMAGE_WIDTH);

    let resized = imageops::resize(&rgb, new_w, REC_IMAGE_HEIGHT, imageops::FilterType::Lanczos3);
    let mut padded: RgbImage =
        ImageBuffer::from_pixel(REC_IMAGE_WIDTH, REC_IMAGE_HEIGHT, Rgb([127, 127, 127]));
    imageops::overlay(&mut padded, &resized, 0, 0);
    to_chw_bgr(&padded)
}

/// PP-OCR models take BGR channel order.
fn to_chw_bgr(img: &RgbImage) -> Array3<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut tensor = Array3::<f32>::zeros((3, h, w));
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x]] = (pixel[2] as f32 / 255.0 - MEAN) / STD;
        tensor[[1, y, x]] = (pixel[1] as f32 / 255.0 - MEAN) / STD;
        tensor[[2, y, x]] = (pixel[0] as f32 / 255.0 - MEAN) / STD;
    }
    tensor
}

/// Crops the axis-aligned hull of a detected box, slightly padded.
pub fn crop_text_region(img: &DynamicImage, points: &[[f32; 2]; 4]) -> DynamicImage {
    let (x0, y0, x1, y1) = hull(points);
    let pad_x = ((x1 - x0) * CROP_PAD_RATIO).round();
    let pad_y = ((y1 - y0) * CROP_PAD_RATIO).round();

    let max_x = img.width().saturating_sub(1) as f32;
    let max_y = img.height().saturating_sub(1) as f32;
    let left = (x0 - pad_x).clamp(0.0, max_x);
    let top = (y0 - pad_y).clamp(0.0, max_y);
    let right = (x1 + pad_x).clamp(0.0, max_x);
    let bottom = (y1 + pad_y).clamp(0.0, max_y);

    let width = ((right - left) as u32).max(1);
    let height = ((bottom - top) as u32).max(1);
    img.crop_imm(left as u32, top as u32, width, height)
}

/// `(min_x, min_y, max_x, max_y)`
pub fn hull(points: &[[f32; 2]; 4]) -> (f32, f32, f32, f32) {
    points.iter().fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), p| (x0.min(p[0]), y0.min(p[1]), x1.max(p[0]), y1.max(p[1])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_det_input_is_multiple_of_32() {
        let img = DynamicImage::new_rgb8(1000, 500);
        let input = prepare_det_input(&img);
        let shape = input.shape();
        assert_eq!(shape[0], 1);
        assert_eq!(shape[1], 3);
        assert_eq!(shape[2] % 32, 0);
        assert_eq!(shape[3] % 32, 0);
        assert!(shape[3] <= DET_LIMIT_SIDE as usize);
    }

    #[test]
    fn test_rec_batches_are_chunked() {
        let images: Vec<DynamicImage> = (0..5).map(|_| DynamicImage::new_rgb8(200, 30)).collect();
        let batches = prepare_rec_batch(&images, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].shape(), &[2, 3, 48, 320]);
        assert_eq!(batches[2].shape()[0], 1);
    }

    #[test]
    fn test_crop_stays_inside_image() {
        let img = DynamicImage::new_rgb8(100, 50);
        let points = [[90.0, 40.0], [130.0, 40.0], [130.0, 70.0], [90.0, 70.0]];
        let crop = crop_text_region(&img, &points);
        assert!(crop.width() >= 1 && crop.width() <= 100);
        assert!(crop.height() >= 1 && crop.height() <= 50);
    }

    #[test]
    fn test_hull() {
        let points = [[10.0, 20.0], [100.0, 20.0], [100.0, 50.0], [10.0, 50.0]];
        assert_eq!(hull(&points), (10.0, 20.0, 100.0, 50.0));
    }
}
