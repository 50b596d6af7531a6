//! Centroid-proximity identity tracking.
//!
//! Each processed frame's detections are matched against the previous
//! frame's table only. Identities are small, dense, frame-local integers:
//! a new face takes the number of faces ahead of it in the current frame
//! (skipping numbers already claimed by re-matched faces), so unrelated
//! faces in non-adjacent frames may share a number. Only continuity across
//! a run of overlapping frames is meaningful.
use std::collections::{BTreeMap, BTreeSet};

use crate::emotion::domain::emotion::Emotion;
use crate::shared::face_box::{Centroid, FaceBox};

/// Maximum centroid displacement (display pixels) for two detections in
/// consecutive frames to count as the same face.
pub const DEFAULT_TRACKING_THRESHOLD: f64 = 75.0;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedFace {
    pub identity: u32,
    pub centroid: Centroid,
    pub emotion: Option<Emotion>,
    pub face_box: FaceBox,
}

/// Identity → face for one processed frame, iterated in identity order.
pub type TrackerTable = BTreeMap<u32, TrackedFace>;

/// One detection handed to the tracker.
///
/// `emotion` is `Some` when the frame was sampled for classification, and
/// `None` when the matched identity's previous label should be carried over.
#[derive(Clone, Debug)]
pub struct Observation {
    pub face_box: FaceBox,
    pub emotion: Option<Emotion>,
}

pub struct FaceTracker {
    threshold: f64,
    table: TrackerTable,
}

impl FaceTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            table: TrackerTable::new(),
        }
    }

    pub fn table(&self) -> &TrackerTable {
        &self.table
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Matches this frame's observations against the previous table and
    /// replaces it. Faces that are not re-detected are dropped.
    ///
    /// A previous identity is claimed by at most one detection; a later
    /// detection whose nearest face is already claimed is treated as new.
    pub fn update(&mut self, observations: &[Observation]) -> &TrackerTable {
        let mut claimed = BTreeSet::new();
        let matches: Vec<Option<(u32, Option<Emotion>)>> = observations
            .iter()
            .map(|obs| {
                let prev = self.nearest(&obs.face_box.centroid())?;
                if claimed.insert(prev.identity) {
                    Some((prev.identity, prev.emotion))
                } else {
                    None
                }
            })
            .collect();

        let mut next = TrackerTable::new();
        for (position, (obs, matched)) in observations.iter().zip(matches).enumerate() {
            let (identity, emotion) = match matched {
                Some((identity, previous)) => (identity, obs.emotion.or(previous)),
                None => {
                    let identity = next_free_identity(position as u32, &claimed);
                    claimed.insert(identity);
                    (identity, obs.emotion)
                }
            };
            next.insert(
                identity,
                TrackedFace {
                    identity,
                    centroid: obs.face_box.centroid(),
                    emotion,
                    face_box: obs.face_box,
                },
            );
        }

        self.table = next;
        &self.table
    }

    /// Closest previous face strictly inside the threshold. Exact-distance
    /// ties keep the lowest identity.
    fn nearest(&self, centroid: &Centroid) -> Option<&TrackedFace> {
        let mut best: Option<(&TrackedFace, f64)> = None;
        for prev in self.table.values() {
            let dist = centroid.distance(&prev.centroid);
            if dist < self.threshold && best.map_or(true, |(_, d)| dist < d) {
                best = Some((prev, dist));
            }
        }
        best.map(|(face, _)| face)
    }
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKING_THRESHOLD)
    }
}

fn next_free_identity(mut candidate: u32, claimed: &BTreeSet<u32>) -> u32 {
    while claimed.contains(&candidate) {
        candidate += 1;
    }
    candidate
}
