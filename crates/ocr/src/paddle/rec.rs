//! CRNN text recognition with greedy CTC decoding

use ndarray::{Array4, ArrayView3};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::threading::apply_session_threads;
use crate::error::OcrError;

/// CTC blank class
const BLANK: usize = 0;

pub struct LineRecognizer {
    session: Session,
    charset: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineText {
    pub text: String,
    pub confidence: f32,
}

impl LineRecognizer {
    pub fn new(model_path: &Path, dict_path: &Path) -> Result<Self, OcrError> {
        let charset = load_charset(dict_path)?;
        let builder = Session::builder().map_err(|e| OcrError::ModelLoad(e.to_string()))?;
        let session = apply_session_threads(builder)
            .map_err(|e| OcrError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| {
                OcrError::ModelLoad(format!("recognition model {}: {}", model_path.display(), e))
            })?;

        log::info!("[Paddle] charset loaded: {} entries", charset.len());
        Ok(Self { session, charset })
    }

    pub fn recognize_batch(&mut self, input: Array4<f32>) -> Result<Vec<LineText>, OcrError> {
        let tensor = Tensor::from_array(input).map_err(|e| OcrError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| OcrError::Inference(format!("recognition: {}", e)))?;
        let logits = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OcrError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        let logits = logits
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| OcrError::Inference(format!("unexpected recognition output: {}", e)))?;
        Ok(decode_ctc(logits.view(), &self.charset))
    }
}

/// Greedy decoding over `[batch, time, classes]`. Class `i > 0` maps to
/// `charset[i - 1]`; confidence is the mean sigmoid of emitted peaks.
fn decode_ctc(logits: ArrayView3<'_, f32>, charset: &[String]) -> Vec<LineText> {
    logits
        .outer_iter()
        .map(|sequence| {
            let mut text = String::new();
            let mut prob_sum = 0.0f32;
            let mut emitted = 0usize;
            let mut last: Option<usize> = None;

            for step in sequence.outer_iter() {
                let (best, best_score) = step
                    .iter()
                    .enumerate()
                    .fold((BLANK, f32::NEG_INFINITY), |acc, (i, &v)| {
                        if v > acc.1 {
                            (i, v)
                        } else {
                            acc
                        }
                    });

                if best != BLANK && Some(best) != last {
                    if let Some(ch) = charset.get(best - 1) {
                        text.push_str(ch);
                        prob_sum += 1.0 / (1.0 + (-best_score).exp());
                        emitted += 1;
                    }
                }
                last = Some(best);
            }

            LineText {
                text,
                confidence: if emitted > 0 { prob_sum / emitted as f32 } else { 0.0 },
            }
        })
        .collect()
}

fn load_charset(path: &Path) -> Result<Vec<String>, OcrError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| OcrError::ModelLoad(format!("dictionary {}: {}", path.display(), e)))?;
    let mut charset: Vec<String> = content.lines().map(str::to_string).collect();
    if charset.is_empty() {
        return Err(OcrError::ModelLoad(format!("dictionary {} is empty", path.display())));
    }
    // PP-OCR dictionaries omit the trailing space class
    charset.push(" ".to_string());
    Ok(charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn charset() -> Vec<String> {
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_collapses_repeats_and_blanks() {
        // classes: blank, a, b, c
        let mut logits = Array3::<f32>::from_elem((1, 6, 4), -10.0);
        for (t, class) in [1usize, 1, 0, 1, 2, 3].iter().enumerate() {
            logits[[0, t, *class]] = 10.0;
        }
        let lines = decode_ctc(logits.view(), &charset());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "aabc");
        assert!(lines[0].confidence > 0.99);
    }

    #[test]
    fn test_decode_all_blank() {
        let mut logits = Array3::<f32>::from_elem((2, 3, 4), -10.0);
        for b in 0..2 {
            for t in 0..3 {
                logits[[b, t, 0]] = 5.0;
            }
        }
        let lines = decode_ctc(logits.view(), &charset());
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.text.is_empty() && l.confidence == 0.0));
    }

    #[test]
    fn test_load_charset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.txt");
        std::fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(load_charset(&path).unwrap(), vec!["a", "b", " "]);

        std::fs::write(&path, "").unwrap();
        assert!(load_charset(&path).is_err());
    }
}
