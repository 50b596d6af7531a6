use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_tracker::{FaceTracker, Observation};
use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::domain::emotion_summary::EmotionSummary;
use crate::pipeline::live_feed::LiveFeed;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Capabilities are owned by the controller and lent to each session's
/// processor; a processor detached after a join timeout may still hold them.
pub type SharedDetector = Arc<Mutex<Box<dyn FaceDetector>>>;
pub type SharedClassifier = Arc<Mutex<Box<dyn EmotionClassifier>>>;
pub type SharedAnnotator = Arc<dyn FrameAnnotator>;

/// What one processed frame produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Per-session count of frames dequeued so far, this one included.
    pub frame_number: usize,
    pub faces: usize,
    pub sampled: bool,
}

/// One session's per-frame work: detect, track, classify on sampled frames,
/// annotate, and publish into the session's feed.
///
/// Owns the session's tracker and frame counter, so a fresh processor is
/// built for every session.
pub struct FrameProcessor {
    detector: SharedDetector,
    classifier: SharedClassifier,
    annotator: SharedAnnotator,
    tracker: FaceTracker,
    config: PipelineConfig,
    frames: usize,
}

impl FrameProcessor {
    pub fn new(
        detector: SharedDetector,
        classifier: SharedClassifier,
        annotator: SharedAnnotator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            classifier,
            annotator,
            tracker: FaceTracker::new(config.tracking_threshold),
            config,
            frames: 0,
        }
    }

    pub fn frames_processed(&self) -> usize {
        self.frames
    }

    pub fn process(
        &mut self,
        frame: Frame,
        feed: &LiveFeed,
        logger: &mut dyn PipelineLogger,
    ) -> FrameOutcome {
        self.frames += 1;
        let sampled = self.frames % self.config.skip_interval.max(1) == 0;

        let t0 = Instant::now();
        let detected = self.detect(&frame);
        logger.timing("detect", elapsed_ms(t0));

        let (dw, dh) = self.config.display_size;
        let sx = dw as f64 / frame.width().max(1) as f64;
        let sy = dh as f64 / frame.height().max(1) as f64;
        let boxes: Vec<FaceBox> = detected.iter().map(|b| b.scaled(sx, sy)).collect();
        let display = frame.resized(dw, dh);

        let observations: Vec<Observation> = if sampled {
            let t0 = Instant::now();
            let mut classifier = lock(&self.classifier);
            let obs = boxes
                .iter()
                .map(|face_box| Observation {
                    face_box: *face_box,
                    emotion: Some(classify_region(&mut **classifier, &display, face_box)),
                })
                .collect();
            logger.timing("classify", elapsed_ms(t0));
            obs
        } else {
            boxes
                .iter()
                .map(|face_box| Observation {
                    face_box: *face_box,
                    emotion: None,
                })
                .collect()
        };

        let tracks = self.tracker.update(&observations).clone();

        let t0 = Instant::now();
        let annotated = self.annotator.annotate(display, &tracks);
        logger.timing("annotate", elapsed_ms(t0));

        if sampled {
            let observed: Vec<Emotion> = observations.iter().filter_map(|o| o.emotion).collect();
            feed.publish_summary(EmotionSummary::from_observations(boxes.len(), &observed));
        }
        feed.publish_tracks(tracks);
        feed.publish_frame(annotated);

        logger.metric("faces", boxes.len() as f64);
        logger.progress(self.frames);

        FrameOutcome {
            frame_number: self.frames,
            faces: boxes.len(),
            sampled,
        }
    }

    fn detect(&self, frame: &Frame) -> Vec<FaceBox> {
        let gray = frame.to_grayscale();
        match lock(&self.detector).detect(&gray) {
            Ok(boxes) => boxes.into_iter().filter(|b| !b.is_empty()).collect(),
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {e}", frame.index());
                Vec::new()
            }
        }
    }
}

fn classify_region(
    classifier: &mut dyn EmotionClassifier,
    display: &Frame,
    face_box: &FaceBox,
) -> Emotion {
    match display.crop(face_box) {
        Some(region) => classifier.classify(&region),
        None => {
            log::debug!("Face box {face_box:?} lies outside the frame, defaulting to neutral");
            Emotion::Neutral
        }
    }
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
