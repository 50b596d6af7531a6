use crate::shared::frame::Frame;

use super::emotion::Emotion;

/// Domain interface for emotion classification of a single face crop.
///
/// Infallible by contract: implementations swallow their own failures and
/// answer [`Emotion::Neutral`], since the processing loop cannot stall on
/// per-face errors. May be slow; callers bound how often it runs.
pub trait EmotionClassifier: Send {
    fn classify(&mut self, face: &Frame) -> Emotion;
}
