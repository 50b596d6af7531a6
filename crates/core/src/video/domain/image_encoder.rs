use crate::shared::frame::Frame;

/// Compresses a frame into a self-contained image file for streaming.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// MIME type of the encoded bytes.
    fn content_type(&self) -> &'static str;
}
