use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::detection::domain::face_tracker::TrackerTable;
use crate::emotion::domain::emotion_summary::EmotionSummary;
use crate::shared::frame::Frame;

/// A single value replaced wholesale by one writer and read as immutable
/// snapshots by any number of readers. Last writer wins.
pub struct Published<T> {
    slot: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: RwLock::new(Arc::new(value)),
        }
    }

    pub fn publish(&self, value: T) {
        let next = Arc::new(value);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn load(&self) -> Arc<T> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Everything one session's processor publishes, plus the session's
/// running flag.
///
/// Each session gets a fresh feed, so a worker that outlives its session
/// can only ever write into state nobody reads any more.
#[derive(Default)]
pub struct LiveFeed {
    running: AtomicBool,
    frame: Published<Option<Frame>>,
    summary: Published<EmotionSummary>,
    tracks: Published<TrackerTable>,
}

impl LiveFeed {
    /// A feed whose session is already running.
    pub fn running() -> Arc<Self> {
        let feed = Self::default();
        feed.running.store(true, Ordering::SeqCst);
        Arc::new(feed)
    }

    /// A feed for the idle controller: never running, never written.
    pub fn idle() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn publish_frame(&self, frame: Frame) {
        self.frame.publish(Some(frame));
    }

    pub fn publish_summary(&self, summary: EmotionSummary) {
        self.summary.publish(summary);
    }

    pub fn publish_tracks(&self, tracks: TrackerTable) {
        self.tracks.publish(tracks);
    }

    pub fn latest_frame(&self) -> Arc<Option<Frame>> {
        self.frame.load()
    }

    pub fn summary(&self) -> Arc<EmotionSummary> {
        self.summary.load()
    }

    pub fn tracks(&self) -> Arc<TrackerTable> {
        self.tracks.load()
    }
}
