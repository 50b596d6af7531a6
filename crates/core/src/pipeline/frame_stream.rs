use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::pipeline::live_feed::LiveFeed;
use crate::video::domain::image_encoder::ImageEncoder;

pub const MULTIPART_BOUNDARY: &str = "frame";

/// Wraps one encoded image as a `multipart/x-mixed-replace` part.
pub fn multipart_chunk(content_type: &str, image: &[u8]) -> Vec<u8> {
    let header = format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: {content_type}\r\n\r\n");
    let mut chunk = Vec::with_capacity(header.len() + image.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(image);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

/// Endless sequence of multipart chunks carrying the latest annotated
/// frame of one session.
///
/// Yields each published frame once, polling every `interval` for a newer
/// one, and ends as soon as the session it was created for stops. A stream
/// created while no session is running is empty.
pub struct FrameStream {
    feed: Arc<LiveFeed>,
    encoder: Arc<dyn ImageEncoder>,
    interval: Duration,
    last_index: Option<usize>,
}

impl FrameStream {
    pub fn new(feed: Arc<LiveFeed>, encoder: Arc<dyn ImageEncoder>, interval: Duration) -> Self {
        Self {
            feed,
            encoder,
            interval,
            last_index: None,
        }
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if !self.feed.is_running() {
                return None;
            }
            let latest = self.feed.latest_frame();
            match latest.as_ref() {
                Some(frame) if self.last_index != Some(frame.index()) => {
                    self.last_index = Some(frame.index());
                    match self.encoder.encode(frame) {
                        Ok(image) => {
                            return Some(multipart_chunk(self.encoder.content_type(), &image))
                        }
                        Err(e) => log::warn!("Dropping frame {} from stream: {e}", frame.index()),
                    }
                }
                _ => {}
            }
            thread::sleep(self.interval);
        }
    }
}
