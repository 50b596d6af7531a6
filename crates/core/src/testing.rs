//! Scripted fakes for the external capabilities, shared by unit tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::detection::domain::face_detector::FaceDetector;
use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};

pub fn blank_frame(width: u32, height: u32, index: usize) -> Frame {
    Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 3, index)
}

/// Counters a test keeps after the fake has been boxed and handed away.
#[derive(Default)]
pub struct Probe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Probe {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Frame source that yields blank frames, optionally failing on open or on
/// a scripted set of reads.
pub struct ScriptedSource {
    size: (u32, u32),
    fail_open: bool,
    /// `false` entries fail; once exhausted, `tail_ok` decides.
    script: VecDeque<bool>,
    tail_ok: bool,
    /// 1-based read number that blocks, and for how long.
    stall: Option<(usize, Duration)>,
    open: bool,
    next_index: usize,
    probe: Arc<Probe>,
}

impl ScriptedSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            fail_open: false,
            script: VecDeque::new(),
            tail_ok: true,
            stall: None,
            open: false,
            next_index: 0,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_script(mut self, script: &[bool], tail_ok: bool) -> Self {
        self.script = script.iter().copied().collect();
        self.tail_ok = tail_ok;
        self
    }

    pub fn stalling_on(mut self, read: usize, pause: Duration) -> Self {
        self.stall = Some((read, pause));
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), FrameSourceError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(FrameSourceError::Open {
                source_name: "scripted".into(),
                reason: "device busy".into(),
            });
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        if !self.open {
            return Err(FrameSourceError::NotOpen);
        }
        let n = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, pause)) = self.stall {
            if n == at {
                thread::sleep(pause);
            }
        }
        let ok = self.script.pop_front().unwrap_or(self.tail_ok);
        if !ok {
            return Err(FrameSourceError::Read("scripted failure".into()));
        }
        let frame = blank_frame(self.size.0, self.size.1, self.next_index);
        self.next_index += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.open {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Detector returning the same boxes for every frame, or an error.
pub struct FixedDetector {
    boxes: Vec<FaceBox>,
    fail: bool,
    probe: Arc<Probe>,
}

impl FixedDetector {
    pub fn new(boxes: Vec<FaceBox>) -> Self {
        Self {
            boxes,
            fail: false,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            boxes: Vec::new(),
            fail: true,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl FaceDetector for FixedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        assert!(frame.is_grayscale(), "detector must receive a luma frame");
        if self.fail {
            return Err("model exploded".into());
        }
        Ok(self.boxes.clone())
    }
}

/// Detector whose boxes are swapped from the test while a session runs.
pub struct SharedBoxesDetector {
    pub boxes: Arc<Mutex<Vec<FaceBox>>>,
}

impl FaceDetector for SharedBoxesDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        Ok(self.boxes.lock().unwrap().clone())
    }
}

/// Classifier cycling through a fixed list of labels, one per call.
pub struct CyclingClassifier {
    labels: Vec<Emotion>,
    probe: Arc<Probe>,
}

impl CyclingClassifier {
    pub fn new(labels: Vec<Emotion>) -> Self {
        Self {
            labels,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl EmotionClassifier for CyclingClassifier {
    fn classify(&mut self, _face: &Frame) -> Emotion {
        let n = self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.labels[n % self.labels.len()]
    }
}
