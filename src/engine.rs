//! Decode/encode engine boundary.
//!
//! The actual video work is delegated to an external engine behind the traits
//! in this module. [`crate::FfmpegEngine`] is the production implementation;
//! tests substitute stub engines to observe exactly what the readers and
//! writers emit.
//!
//! All calls are synchronous and blocking. A source or sink is owned by a
//! single [`FrameReader`](crate::FrameReader) or
//! [`FrameWriter`](crate::FrameWriter) and never shared.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{error::FrameshiftError, frame::RawFrame, metadata::MediaInfo};

/// A pull-based stream of decoded frames.
///
/// Implementations are `Send` so a handle can be moved between threads, but
/// they are used from one thread at a time.
pub trait FrameSource: Send {
    /// Metadata snapshot captured when the source was opened.
    fn info(&self) -> &MediaInfo;

    /// Decode and return the next frame.
    ///
    /// `Ok(None)` is the normal end-of-stream signal, not an error.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameshiftError>;

    /// Advance past one frame without materializing its pixels.
    ///
    /// Returns `false` when the stream is already exhausted. The default
    /// implementation decodes and discards; engines override this when they
    /// can avoid the pixel conversion.
    fn skip_frame(&mut self) -> Result<bool, FrameshiftError> {
        Ok(self.next_frame()?.is_some())
    }
}

/// A push-based sink of encoded frames.
pub trait FrameSink: Send {
    /// Encode and append one frame.
    ///
    /// The sink fixes its output dimensions from the first appended frame
    /// (unless they were fixed at open time) and may reject frames of any
    /// other size; callers that cannot guarantee conformance go through
    /// [`FrameWriter::write`](crate::FrameWriter::write), which resizes.
    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError>;

    /// Finalize the output (flush delayed frames, write trailers).
    fn finish(&mut self) -> Result<(), FrameshiftError>;
}

/// Opens media sources for decoding.
pub trait DecodeEngine {
    /// Open `path` for sequential frame extraction.
    fn open_source(
        &self,
        path: &Path,
        options: &SourceOptions,
    ) -> Result<Box<dyn FrameSource>, FrameshiftError>;
}

/// Opens media sinks for encoding.
pub trait EncodeEngine {
    /// Open `path` for sequential frame emission at `fps` frames per second.
    fn open_sink(
        &self,
        path: &Path,
        fps: f64,
        options: &SinkOptions,
    ) -> Result<Box<dyn FrameSink>, FrameshiftError>;
}

/// Options recognized when opening a source.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Decode frames at this size instead of the source's own. The metadata
    /// snapshot still reports the source size.
    pub size: Option<(u32, u32)>,
    /// Engine-specific passthrough options (demuxer flags and the like).
    pub extra: BTreeMap<String, String>,
}

impl SourceOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode frames at `width x height`.
    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Add an engine-specific passthrough option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

/// Options recognized when opening a sink.
///
/// Controls the output codec and quality, plus the fixed output size. When
/// `size` is `None` the writer adopts the size of the first frame written.
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    /// Fixed output size. `None` adopts the first written frame's size.
    pub size: Option<(u32, u32)>,
    /// Codec to encode with.
    pub codec: VideoCodec,
    /// Constant Rate Factor (0-51, lower is better), for codecs that take one.
    pub crf: Option<u32>,
    /// Bitrate in bits per second.
    pub bitrate: Option<usize>,
    /// Engine-specific passthrough options (encoder private options).
    pub extra: BTreeMap<String, String>,
}

impl SinkOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the output size to `width x height`.
    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Add an engine-specific passthrough option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_options_builder() {
        let options = SourceOptions::new().size(640, 360).option("threads", "2");
        assert_eq!(options.size, Some((640, 360)));
        assert_eq!(options.extra.get("threads").map(String::as_str), Some("2"));
    }

    #[test]
    fn sink_options_builder() {
        let options = SinkOptions::new()
            .size(1280, 720)
            .codec(VideoCodec::Mpeg4)
            .crf(18)
            .bitrate(4_000_000);
        assert_eq!(options.size, Some((1280, 720)));
        assert_eq!(options.codec, VideoCodec::Mpeg4);
        assert_eq!(options.crf, Some(18));
        assert_eq!(options.bitrate, Some(4_000_000));
    }
}
