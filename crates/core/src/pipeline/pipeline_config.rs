use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::face_tracker::DEFAULT_TRACKING_THRESHOLD;
use crate::pipeline::frame_channel::FRAME_CHANNEL_CAPACITY;

/// Classify emotions on every Nth processed frame.
pub const DEFAULT_SKIP_INTERVAL: usize = 5;

pub const DEFAULT_CAPTURE_SIZE: (u32, u32) = (320, 240);
pub const DEFAULT_DISPLAY_SIZE: (u32, u32) = (640, 480);

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("skip interval must be >= 1")]
    SkipInterval,
    #[error("tracking threshold must be positive, got {0}")]
    TrackingThreshold(f64),
    #[error("{name} resolution must be non-zero, got {width}x{height}")]
    Resolution {
        name: &'static str,
        width: u32,
        height: u32,
    },
    #[error("frame channel capacity must be >= 1")]
    ChannelCapacity,
    #[error("capture interval {interval:?} must be shorter than the join timeout {timeout:?}")]
    CaptureInterval { interval: Duration, timeout: Duration },
}

/// Tunables for one live session's capture and processing workers.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Resolution frames are downsampled to before detection.
    pub capture_size: (u32, u32),
    /// Resolution frames are annotated and streamed at.
    pub display_size: (u32, u32),
    pub skip_interval: usize,
    pub tracking_threshold: f64,
    pub channel_capacity: usize,
    /// Pause between camera reads.
    pub capture_interval: Duration,
    /// Pause when the processor finds the channel empty.
    pub idle_poll_interval: Duration,
    /// Bound on waiting for each worker at stop.
    pub join_timeout: Duration,
    /// Pause between chunks handed to stream readers.
    pub stream_interval: Duration,
    /// Emit a rolling timing summary every N processed frames.
    pub log_every_frames: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_size: DEFAULT_CAPTURE_SIZE,
            display_size: DEFAULT_DISPLAY_SIZE,
            skip_interval: DEFAULT_SKIP_INTERVAL,
            tracking_threshold: DEFAULT_TRACKING_THRESHOLD,
            channel_capacity: FRAME_CHANNEL_CAPACITY,
            capture_interval: Duration::from_millis(10),
            idle_poll_interval: Duration::from_millis(10),
            join_timeout: Duration::from_secs(2),
            stream_interval: Duration::from_millis(10),
            log_every_frames: 300,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.skip_interval < 1 {
            return Err(ConfigError::SkipInterval);
        }
        if !(self.tracking_threshold > 0.0) {
            return Err(ConfigError::TrackingThreshold(self.tracking_threshold));
        }
        for (name, (width, height)) in [("capture", self.capture_size), ("display", self.display_size)] {
            if width == 0 || height == 0 {
                return Err(ConfigError::Resolution {
                    name,
                    width,
                    height,
                });
            }
        }
        if self.channel_capacity < 1 {
            return Err(ConfigError::ChannelCapacity);
        }
        // The capturer only notices a stop between reads.
        if self.capture_interval >= self.join_timeout {
            return Err(ConfigError::CaptureInterval {
                interval: self.capture_interval,
                timeout: self.join_timeout,
            });
        }
        Ok(())
    }

    /// Display-over-capture scale factors `(sx, sy)`.
    pub fn upscale_factors(&self) -> (f64, f64) {
        (
            self.display_size.0 as f64 / self.capture_size.0 as f64,
            self.display_size.1 as f64 / self.capture_size.1 as f64,
        )
    }
}
