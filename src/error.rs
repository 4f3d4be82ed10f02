//! Error types for the `frameshift` crate.
//!
//! This module defines [`FrameshiftError`], the unified error type returned by
//! all fallible operations in the crate. End of stream is deliberately *not* an
//! error: readers signal it as `Ok(None)` / iterator termination, so every
//! variant here describes a real failure.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `frameshift` operations.
///
/// Every public method that can fail returns `Result<T, FrameshiftError>`.
/// Engine-level failures are propagated to the immediate caller unmodified;
/// nothing is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameshiftError {
    /// The media source could not be opened for decoding.
    #[error("Failed to open media source at {path}: {reason}")]
    SourceOpen {
        /// Path that was passed to [`crate::FrameReader::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The media sink could not be opened for encoding.
    #[error("Failed to open media sink at {path}: {reason}")]
    SinkOpen {
        /// Path that was passed to [`crate::FrameWriter::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// A frame could not be decoded.
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// A frame could not be encoded or appended to the sink.
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// The frame archive collaborator reported a failure.
    #[error("Archive error: {0}")]
    Archive(String),

    /// The handle was already closed, either explicitly or by
    /// [`HandleRegistry::close_all`](crate::HandleRegistry::close_all).
    #[error("Handle is closed")]
    HandleClosed,

    /// A raw pixel buffer does not match its declared dimensions.
    #[error("Frame buffer has {actual} bytes, expected {expected}")]
    FrameBuffer {
        /// Byte count implied by width, height, and color mode.
        expected: usize,
        /// Byte count actually supplied.
        actual: usize,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during pixel conversion.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for FrameshiftError {
    fn from(error: FfmpegError) -> Self {
        FrameshiftError::Ffmpeg(error.to_string())
    }
}
