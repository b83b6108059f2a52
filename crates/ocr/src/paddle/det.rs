//! DBNet text detection

use ndarray::{Array2, ArrayViewD, Array4};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::threading::apply_session_threads;
use crate::error::OcrError;

/// Probability above which a pixel counts as text
const THRESH: f32 = 0.3;
/// Minimum mean probability of a kept box
const BOX_THRESH: f32 = 0.5;
const MIN_SIZE: f32 = 5.0;
const UNCLIP_RATIO: f32 = 1.6;

pub struct TextDetector {
    session: Session,
}

/// Detected box in original image pixels, clockwise from top-left
#[derive(Debug, Clone)]
pub struct TextBox {
    pub points: [[f32; 2]; 4],
    pub score: f32,
}

impl TextDetector {
    pub fn new(model_path: &Path) -> Result<Self, OcrError> {
        let builder = Session::builder().map_err(|e| OcrError::ModelLoad(e.to_string()))?;
        let session = apply_session_threads(builder)
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| {
                OcrError::ModelLoad(format!("detection model {}: {}", model_path.display(), e))
            })?;
        Ok(Self { session })
    }

    pub fn detect(
        &mut self,
        input: Array4<f32>,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<TextBox>, OcrError> {
        let input_h = input.shape()[2];
        let input_w = input.shape()[3];

        let tensor = Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::Inference(format!("detection: {}", e)))?;
        let prob = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        let map = ProbMap::new(prob.view())?;
        let scale = (
            orig_w as f32 / input_w as f32,
            orig_h as f32 / input_h as f32,
        );
        Ok(find_boxes(&map, scale))
    }
}

/// Probability map of shape `[1, 1, h, w]` or `[1, h, w]`
struct ProbMap<'a> {
    data: ArrayViewD<'a, f32>,
    h: usize,
    w: usize,
}

impl<'a> ProbMap<'a> {
    fn new(data: ArrayViewD<'a, f32>) -> Result<Self, OcrError> {
        let (h, w) = match data.shape() {
            [_, _, h, w] => (*h, *w),
            [_, h, w] => (*h, *w),
            other => {
                return Err(OcrError::Inference(format!(
                    "unexpected detection output shape {:?}",
                    other
                )))
            }
        };
        Ok(Self { data, h, w })
    }

    fn at(&self, y: usize, x: usize) -> f32 {
        if self.data.ndim() == 4 {
            self.data[[0, 0, y, x]]
        } else {
            self.data[[0, y, x]]
        }
    }
}

/// Flood-fills connected text pixels into axis-aligned boxes, sorted top to bottom.
fn find_boxes(map: &ProbMap<'_>, (scale_x, scale_y): (f32, f32)) -> Vec<TextBox> {
    let (h, w) = (map.h, map.w);
    let mut visited = Array2::<bool>::from_elem((h, w), false);
    let mut boxes = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            if visited[[sy, sx]] || map.at(sy, sx) <= THRESH {
                continue;
            }

            let (mut x0, mut x1, mut y0, mut y1) = (sx, sx, sy, sy);
            let mut score_sum = 0.0f32;
            let mut count = 0usize;
            let mut stack = vec![(sx, sy)];
            visited[[sy, sx]] = true;

            while let Some((x, y)) = stack.pop() {
                x0 = x0.min(x);
                x1 = x1.max(x);
                y0 = y0.min(y);
                y1 = y1.max(y);
                score_sum += map.at(y, x);
                count += 1;

                let neighbours = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx < w && ny < h && !visited[[ny, nx]] && map.at(ny, nx) > THRESH {
                        visited[[ny, nx]] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            let box_w = (x1 - x0) as f32;
            let box_h = (y1 - y0) as f32;
            let score = score_sum / count as f32;
            if box_w < MIN_SIZE || box_h < MIN_SIZE || score < BOX_THRESH {
                continue;
            }

            let grow_w = box_w * (UNCLIP_RATIO - 1.0) / 2.0;
            let grow_h = box_h * (UNCLIP_RATIO - 1.0) / 2.0;
            let left = (x0 as f32 - grow_w).max(0.0) * scale_x;
            let top = (y0 as f32 - grow_h).max(0.0) * scale_y;
            let right = (x1 as f32 + grow_w).min(w as f32 - 1.0) * scale_x;
            let bottom = (y1 as f32 + grow_h).min(h as f32 - 1.0) * scale_y;

            boxes.push(TextBox {
                points: [[left, top], [right, top], [right, bottom], [left, bottom]],
                score,
            });
        }
    }

    boxes.sort_by(|a, b| a.points[0][1].total_cmp(&b.points[0][1]));
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_find_boxes_two_lines() {
        let mut prob = Array::<f32, _>::zeros((1, 1, 40, 60)).into_dyn();
        for y in 22..32 {
            for x in 5..50 {
                prob[[0, 0, y, x]] = 0.9;
            }
        }
        for y in 4..12 {
            for x in 10..40 {
                prob[[0, 0, y, x]] = 0.8;
            }
        }
        // speck below MIN_SIZE
        prob[[0, 0, 36, 56]] = 0.9;

        let map = ProbMap::new(prob.view()).unwrap();
        let boxes = find_boxes(&map, (2.0, 2.0));
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].points[0][1] < boxes[1].points[0][1]);
        assert!((boxes[0].score - 0.8).abs() < 1e-6);
        // scaled to original pixels
        assert!(boxes[1].points[2][0] > 50.0 * 2.0 - 1.0);
    }

    #[test]
    fn test_low_score_boxes_dropped() {
        let mut prob = Array::<f32, _>::zeros((1, 20, 20)).into_dyn();
        for y in 2..15 {
            for x in 2..15 {
                prob[[0, y, x]] = 0.4;
            }
        }
        let map = ProbMap::new(prob.view()).unwrap();
        assert!(find_boxes(&map, (1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_bad_shape_rejected() {
        let prob = Array::<f32, _>::zeros((4, 4)).into_dyn();
        assert!(ProbMap::new(prob.view()).is_err());
    }
}
