use std::path::Path;

use ndarray::Array4;

use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::{load_session, square_input_size};

/// FER+ input side when the model does not declare one.
const DEFAULT_INPUT_SIZE: u32 = 64;

/// FER+ output order. `contempt` has no place in the vocabulary and is
/// folded into `disgust`.
const FERPLUS_LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprise,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Disgust,
];

/// Facial-expression classifier running the FER+ ONNX model.
///
/// Never fails: inference errors are logged and reported as `neutral`.
pub struct OnnxEmotionClassifier {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxEmotionClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let input_size = square_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::info!("Emotion model ready ({input_size}x{input_size} input)");
        Ok(Self {
            session,
            input_size,
        })
    }

    fn infer(&mut self, face: &Frame) -> Result<Emotion, Box<dyn std::error::Error>> {
        let input = preprocess(face, self.input_size);
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("emotion model produced no outputs".into());
        }
        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores = scores.as_slice().ok_or("Cannot get score slice")?;
        label_for(scores).ok_or_else(|| format!("unexpected score count {}", scores.len()).into())
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &Frame) -> Emotion {
        match self.infer(face) {
            Ok(emotion) => emotion,
            Err(e) => {
                log::warn!("Emotion inference failed, using neutral: {e}");
                Emotion::Neutral
            }
        }
    }
}

/// Luma, resized to `size` × `size`, as raw 0-255 floats in NCHW.
fn preprocess(face: &Frame, size: u32) -> Array4<f32> {
    let gray = face.to_grayscale().resized(size, size);
    let side = size as usize;
    let pixels: Vec<f32> = gray.data().iter().map(|&v| v as f32).collect();
    Array4::from_shape_vec((1, 1, side, side), pixels)
        .unwrap_or_else(|_| Array4::zeros((1, 1, side, side)))
}

/// Highest-scoring FER+ class mapped to the vocabulary.
fn label_for(scores: &[f32]) -> Option<Emotion> {
    if scores.len() != FERPLUS_LABELS.len() {
        return None;
    }
    let (best, _) = scores
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bs), (i, &s)| {
            if s > bs {
                (i, s)
            } else {
                (bi, bs)
            }
        });
    Some(FERPLUS_LABELS[best])
}
