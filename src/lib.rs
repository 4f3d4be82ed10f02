//! # frameshift
//!
//! Move video frames between movie files, raw in-memory pixel buffers, and
//! frame archives.
//!
//! `frameshift` is a thin adapter over FFmpeg (via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate): it reads
//! frames from a media source into tightly-packed pixel buffers or
//! [`image::DynamicImage`] values, feeds pixel buffers to an encoder to
//! produce a video file, and transcodes in bulk between movie files and an
//! ordered, sliceable frame archive. Decoding, encoding, and pixel
//! manipulation are delegated; the crate's job is representation conversion
//! and handle lifecycle.
//!
//! ## Quick Start
//!
//! ### Read frames
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frameshift::{FrameReader, HandleRegistry, SourceOptions};
//!
//! let registry = Arc::new(HandleRegistry::new());
//! let mut reader = FrameReader::open("input.mp4", SourceOptions::new(), &registry)?;
//!
//! reader.skip(3)?;
//! for image in reader.images(Some(5), false) {
//!     let image = image?;
//!     println!("{}x{}", image.width(), image.height());
//! }
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```
//!
//! ### Write frames
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frameshift::{ColorMode, FrameWriter, HandleRegistry, RawFrame, SinkOptions};
//!
//! let registry = Arc::new(HandleRegistry::new());
//! let mut writer = FrameWriter::open("output.mp4", 24.0, SinkOptions::new(), &registry)?;
//!
//! let frame = RawFrame::new(vec![0; 320 * 240 * 3], 320, 240, ColorMode::Rgb)?;
//! writer.write(frame.clone())?.write(frame)?;
//! writer.close()?;
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```
//!
//! ### Transcode through an archive
//!
//! ```no_run
//! use frameshift::{DecodeOptions, EncodeOptions, MemoryStore, Transcoder};
//!
//! let transcoder = Transcoder::new();
//! let store = MemoryStore::new();
//!
//! transcoder.decode_to_archive("input.mp4", &store, "frames.arch", DecodeOptions::new())?;
//! transcoder.encode_from_archive(&store, "frames.arch", "output.mp4", EncodeOptions::new())?;
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```
//!
//! ## Design
//!
//! - **Two frame representations** — [`Frame`] is a closed variant over a raw
//!   byte buffer ([`RawFrame`]) and an `image` crate handle; call sites match
//!   instead of probing.
//! - **Engine boundary** — [`DecodeEngine`]/[`EncodeEngine`] traits with
//!   [`FfmpegEngine`] as the production implementation; tests substitute
//!   stubs.
//! - **Handle registry** — every open reader/writer is tracked in an explicit
//!   [`HandleRegistry`] so anything left open can be swept at shutdown.
//! - **End of stream is not an error** — readers return `Ok(None)` and
//!   iterators simply end; [`FrameReader::skip`] reports how far it got.
//! - **Single-threaded by design** — all I/O is synchronous and blocking; a
//!   hung engine call hangs the caller.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system; see the
//! `ffmpeg-next` documentation for platform specifics.

pub mod archive;
mod convert;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod metadata;
pub mod reader;
pub mod registry;
pub mod transcode;
pub mod writer;

pub use archive::{ArchiveMode, ArchiveStore, FrameArchive, MemoryArchive, MemoryStore};
pub use engine::{
    DecodeEngine, EncodeEngine, FrameSink, FrameSource, SinkOptions, SourceOptions, VideoCodec,
};
pub use error::FrameshiftError;
pub use ffmpeg::{engine_log_level, set_engine_log_level, EngineLogLevel, FfmpegEngine};
pub use frame::{ColorMode, Frame, RawFrame};
pub use metadata::{FrameCount, MediaInfo, DEFAULT_FPS};
pub use reader::{FrameReader, Frames, Images};
pub use registry::{HandleId, HandleKind, HandleRegistry};
pub use transcode::{DecodeOptions, DecodeSummary, EncodeOptions, EncodeSummary, Transcoder};
pub use writer::FrameWriter;
