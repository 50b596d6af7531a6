use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::emotion::Emotion;

/// Emotion counts for the most recently sampled frame.
///
/// Not a running accumulation: each sampled frame replaces the whole value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionSummary {
    pub total_faces: usize,
    pub emotions: BTreeMap<Emotion, usize>,
}

impl EmotionSummary {
    /// Builds the summary for one sampled frame.
    ///
    /// An empty `observed` list reports a single `neutral` entry with count 0.
    pub fn from_observations(total_faces: usize, observed: &[Emotion]) -> Self {
        let mut emotions = BTreeMap::new();
        for e in observed {
            *emotions.entry(*e).or_insert(0) += 1;
        }
        if emotions.is_empty() {
            emotions.insert(Emotion::Neutral, 0);
        }
        Self {
            total_faces,
            emotions,
        }
    }

    /// Label with the highest count; ties go to the earlier vocabulary entry.
    pub fn dominant(&self) -> Option<Emotion> {
        let mut best: Option<(Emotion, usize)> = None;
        for (&emotion, &count) in &self.emotions {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((emotion, count));
            }
        }
        best.map(|(e, _)| e)
    }

    pub fn is_empty(&self) -> bool {
        self.total_faces == 0 && self.emotions.is_empty()
    }
}
