use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};

/// Where and how to open a camera-like input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FfmpegSourceSpec {
    /// Device path (`/dev/video0`), device name, stream URL or file path.
    pub input: String,
    /// Capture device demuxer, e.g. `v4l2`, `avfoundation`, `dshow`.
    /// `None` lets ffmpeg probe the input.
    pub format: Option<String>,
    /// Demuxer options such as `video_size=640x480` or `framerate=30`.
    pub options: Vec<(String, String)>,
    /// Reopen file inputs at end of stream so they behave like a camera.
    pub looping: bool,
}

/// `FrameSource` over libavdevice/libavformat via ffmpeg-next.
///
/// Decoded frames are converted to RGB24. A file input reports
/// `EndOfStream` when exhausted unless `looping` is set.
pub struct FfmpegFrameSource {
    spec: FfmpegSourceSpec,
    decoding: Option<Decoding>,
    frame_index: usize,
}

// Safety: the ffmpeg contexts are only touched by whichever thread holds
// the source, and never concurrently.
unsafe impl Send for FfmpegFrameSource {}

struct Decoding {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    eof: bool,
}

impl FfmpegFrameSource {
    pub fn new(spec: FfmpegSourceSpec) -> Self {
        Self {
            spec,
            decoding: None,
            frame_index: 0,
        }
    }

    fn open_error(&self, reason: impl ToString) -> FrameSourceError {
        FrameSourceError::Open {
            source_name: self.spec.input.clone(),
            reason: reason.to_string(),
        }
    }

    fn open_input(&self) -> Result<Input, FrameSourceError> {
        let mut options = ffmpeg_next::Dictionary::new();
        for (key, value) in &self.spec.options {
            options.set(key, value);
        }

        match &self.spec.format {
            None => ffmpeg_next::format::input_with_dictionary(&self.spec.input, options)
                .map_err(|e| self.open_error(e)),
            Some(name) => {
                let format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == name.as_str())
                    .ok_or_else(|| self.open_error(format!("unknown capture format {name}")))?;
                let ctx = ffmpeg_next::format::open_with(
                    &self.spec.input,
                    &ffmpeg_next::format::format::Format::Input(format),
                    options,
                )
                .map_err(|e| self.open_error(e))?;
                match ctx {
                    ffmpeg_next::format::context::Context::Input(input) => Ok(input),
                    ffmpeg_next::format::context::Context::Output(_) => {
                        Err(self.open_error("not an input"))
                    }
                }
            }
        }
    }

    fn start_decoding(&self) -> Result<Decoding, FrameSourceError> {
        let input = self.open_input()?;
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| self.open_error("no video stream"))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.open_error(e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| self.open_error(e))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| self.open_error(e))?;

        Ok(Decoding {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            eof: false,
        })
    }
}

impl Decoding {
    /// Next decoded RGB frame, or `None` once the input is drained.
    fn next_pixels(&mut self) -> Result<Option<Vec<u8>>, FrameSourceError> {
        loop {
            let mut decoded = Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb)
                    .map_err(|e| FrameSourceError::Read(e.to_string()))?;
                return Ok(Some(extract_rgb_pixels(&rgb, self.width, self.height)));
            }
            if self.eof {
                return Ok(None);
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("Skipping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = self.decoder.send_eof();
                    self.eof = true;
                }
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<(), FrameSourceError> {
        if self.decoding.is_some() {
            return Ok(());
        }
        ffmpeg_next::init().map_err(|e| self.open_error(e))?;
        ffmpeg_next::device::register_all();

        let decoding = self.start_decoding()?;
        log::info!(
            "Opened {} ({}x{})",
            self.spec.input,
            decoding.width,
            decoding.height
        );
        self.decoding = Some(decoding);
        self.frame_index = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        let decoding = self.decoding.as_mut().ok_or(FrameSourceError::NotOpen)?;
        let (width, height) = (decoding.width, decoding.height);

        let pixels = match decoding.next_pixels()? {
            Some(pixels) => pixels,
            None if self.spec.looping => {
                log::debug!("Rewinding {}", self.spec.input);
                let mut restarted = self.start_decoding()?;
                let pixels = restarted.next_pixels()?.ok_or(FrameSourceError::EndOfStream)?;
                self.decoding = Some(restarted);
                pixels
            }
            None => return Err(FrameSourceError::EndOfStream),
        };

        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.decoding.take().is_some() {
            log::info!("Closed {}", self.spec.input);
        }
    }

    fn is_open(&self) -> bool {
        self.decoding.is_some()
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(rgb_frame: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32) {
        ffmpeg_next::init().unwrap();
        let fps = 30;

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg_next::encoder::Video,
                         octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb = Video::new(ffmpeg_next::format::Pixel::RGB24, width, height);
            let value = ((i * 40) % 256) as u8;
            rgb.data_mut(0).fill(value);
            let mut yuv = Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            drain(&mut encoder, &mut octx);
        }
        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn file_source(path: &Path, looping: bool) -> FfmpegFrameSource {
        FfmpegFrameSource::new(FfmpegSourceSpec {
            input: path.to_string_lossy().into_owned(),
            looping,
            ..FfmpegSourceSpec::default()
        })
    }

    #[test]
    fn test_reads_every_frame_then_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 5, 160, 120);

        let mut source = file_source(&path, false);
        source.open().unwrap();
        assert!(source.is_open());

        let mut frames = Vec::new();
        loop {
            match source.read() {
                Ok(frame) => frames.push(frame),
                Err(FrameSourceError::EndOfStream) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(frames.len(), 5);
        assert_eq!((frames[0].width(), frames[0].height()), (160, 120));
        assert_eq!(frames[0].channels(), 3);
        assert_eq!(frames[4].index(), 4);
    }

    #[test]
    fn test_looping_source_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 3, 64, 48);

        let mut source = file_source(&path, true);
        source.open().unwrap();
        for _ in 0..7 {
            assert!(source.read().is_ok());
        }
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = file_source(Path::new("/nonexistent/clip.mp4"), false);
        assert!(matches!(source.read(), Err(FrameSourceError::NotOpen)));
    }

    #[test]
    fn test_open_nonexistent_reports_source() {
        let mut source = file_source(Path::new("/nonexistent/clip.mp4"), false);
        match source.open() {
            Err(FrameSourceError::Open { source_name, .. }) => {
                assert_eq!(source_name, "/nonexistent/clip.mp4")
            }
            other => panic!("expected open error, got {other:?}"),
        }
        assert!(!source.is_open());
    }

    #[test]
    fn test_unknown_capture_format_fails_to_open() {
        let mut source = FfmpegFrameSource::new(FfmpegSourceSpec {
            input: "0".into(),
            format: Some("no-such-device-format".into()),
            ..FfmpegSourceSpec::default()
        });
        assert!(matches!(source.open(), Err(FrameSourceError::Open { .. })));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 2, 64, 48);

        let mut source = file_source(&path, false);
        source.open().unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(matches!(source.read(), Err(FrameSourceError::NotOpen)));
    }
}
