use std::collections::BTreeMap;
use std::time::Instant;

/// Sink for per-frame pipeline events, so the processing loop does not
/// care whether anyone is listening.
pub trait PipelineLogger: Send {
    /// Total frames processed so far in this session.
    fn progress(&mut self, frames: usize);

    /// Time spent in one stage (`detect`, `classify`, `annotate`) for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Point-in-time reading such as `faces` or `channel_depth`.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Called once when the processor exits.
    fn summary(&self) {}
}

pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count, sum and peak of one stage or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStat {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl RunningStat {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 { value } else { self.max.max(value) };
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Reports stage timings and metrics through `log`, one window at a time.
///
/// Live sessions have no frame total, so every `every_frames` processed
/// frames the current window is logged and cleared. Memory stays constant
/// however long the session runs.
pub struct LogPipelineLogger {
    every_frames: usize,
    stages: BTreeMap<String, RunningStat>,
    metrics: BTreeMap<String, RunningStat>,
    frames: usize,
    window_frames: usize,
    window_start: Instant,
}

impl LogPipelineLogger {
    pub fn new(every_frames: usize) -> Self {
        Self {
            every_frames: every_frames.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            frames: 0,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<RunningStat> {
        self.stages.get(name).copied()
    }

    pub fn metric_stat(&self, name: &str) -> Option<RunningStat> {
        self.metrics.get(name).copied()
    }

    /// The current window as text, or `None` before anything was recorded.
    pub fn window_report(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let secs = self.window_start.elapsed().as_secs_f64();
        let mut out = format!(
            "Frames {}..{} ({secs:.1}s):",
            self.frames - self.window_frames,
            self.frames
        );
        for (name, stat) in &self.stages {
            out.push_str(&format!(
                "\n  {name:10} avg {:6.1}ms  max {:6.1}ms  n={}",
                stat.mean(),
                stat.max,
                stat.count
            ));
        }
        for (name, stat) in &self.metrics {
            out.push_str(&format!("\n  {name:10} avg {:.1}  max {:.0}", stat.mean(), stat.max));
        }
        if self.window_frames > 0 && secs > 0.0 {
            out.push_str(&format!("\n  {:.1} fps", self.window_frames as f64 / secs));
        }
        Some(out)
    }

    fn start_window(&mut self) {
        self.stages.clear();
        self.metrics.clear();
        self.window_frames = 0;
        self.window_start = Instant::now();
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, frames: usize) {
        self.window_frames += frames.saturating_sub(self.frames);
        self.frames = frames;
        if self.window_frames >= self.every_frames {
            if let Some(report) = self.window_report() {
                log::info!("{report}");
            }
            self.start_window();
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages.entry(stage.to_string()).or_default().record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        match self.window_report() {
            Some(report) => log::info!("Session ended after {} frames. {report}", self.frames),
            None => log::info!("Session ended after {} frames", self.frames),
        }
    }
}
