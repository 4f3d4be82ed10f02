//! Transcoding between movie files and frame archives.
//!
//! [`Transcoder`] composes a decode engine, an encode engine, and a
//! [`HandleRegistry`] into the two bulk procedures:
//! [`decode_to_archive`](Transcoder::decode_to_archive) (movie file →
//! archive) and [`encode_from_archive`](Transcoder::encode_from_archive)
//! (archive → movie file).
//!
//! # Example
//!
//! ```no_run
//! use frameshift::{DecodeOptions, EncodeOptions, MemoryStore, Transcoder};
//!
//! let transcoder = Transcoder::new();
//! let store = MemoryStore::new();
//!
//! // Keep every other frame of the first 100.
//! let summary = transcoder.decode_to_archive(
//!     "input.mp4",
//!     &store,
//!     "frames.arch",
//!     DecodeOptions::new().interval(2).count(50),
//! )?;
//! println!("archived {} frames", summary.frames_written);
//!
//! transcoder.encode_from_archive(&store, "frames.arch", "output.mp4", EncodeOptions::new())?;
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```

use std::{collections::BTreeMap, path::Path, sync::Arc};

use crate::{
    archive::{ArchiveMode, ArchiveStore},
    engine::{DecodeEngine, EncodeEngine, SinkOptions, SourceOptions},
    error::FrameshiftError,
    ffmpeg::FfmpegEngine,
    frame::Frame,
    metadata::{FrameCount, DEFAULT_FPS},
    reader::FrameReader,
    registry::HandleRegistry,
    writer::FrameWriter,
};

/// Options for [`Transcoder::decode_to_archive`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Decode frames at this size instead of the source's own.
    pub size: Option<(u32, u32)>,
    /// Frames to skip before archiving starts.
    pub start: u64,
    /// Maximum frames to archive; `None` archives to exhaustion.
    pub count: Option<u64>,
    /// Keep one frame out of every `interval` (1 keeps all). The frame rate
    /// recorded in the archive is divided accordingly.
    pub interval: u64,
    /// How to open the destination archive.
    pub mode: ArchiveMode,
    /// Store archived frames as RGBA instead of RGB.
    pub alpha: bool,
    /// Engine-specific passthrough options for the source.
    pub engine_options: BTreeMap<String, String>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            size: None,
            start: 0,
            count: None,
            interval: 1,
            mode: ArchiveMode::Create,
            alpha: false,
            engine_options: BTreeMap::new(),
        }
    }
}

impl DecodeOptions {
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

    /// Skip `start` frames before archiving.
    #[must_use]
    pub fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Archive at most `count` frames.
    #[must_use]
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Keep one frame out of every `interval`. Clamped to at least 1.
    #[must_use]
    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Replace an existing archive instead of failing on one.
    #[must_use]
    pub fn replace(mut self) -> Self {
        self.mode = ArchiveMode::Truncate;
        self
    }

    /// Store archived frames as RGBA.
    #[must_use]
    pub fn alpha(mut self, alpha: bool) -> Self {
        self.alpha = alpha;
        self
    }

    /// Add an engine-specific passthrough option for the source.
    #[must_use]
    pub fn engine_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.engine_options.insert(key.into(), value.into());
        self
    }
}

/// Options for [`Transcoder::encode_from_archive`].
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Output frame rate. Falls back to the archive metadata, then to
    /// [`DEFAULT_FPS`].
    pub fps: Option<f64>,
    /// First archive frame to encode.
    pub start: u64,
    /// Maximum frames to encode; `None` encodes to the end of the slice.
    pub count: Option<u64>,
    /// Sink options, including an explicit output size; archive frames of a
    /// different size are resized to it.
    pub sink: SinkOptions,
}

impl EncodeOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output frame rate.
    #[must_use]
    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Encode at `width x height`, resizing archive frames when needed.
    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.sink.size = Some((width, height));
        self
    }

    /// Start from this archive frame.
    #[must_use]
    pub fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Encode at most `count` frames.
    #[must_use]
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the sink options (codec, quality, passthrough options).
    #[must_use]
    pub fn sink(mut self, sink: SinkOptions) -> Self {
        self.sink = sink;
        self
    }
}

/// Result of a [`decode_to_archive`](Transcoder::decode_to_archive) run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct DecodeSummary {
    /// Frames actually appended to the archive.
    pub frames_written: u64,
    /// Frame rate recorded in the archive metadata (already divided by the
    /// interval).
    pub fps: Option<f64>,
}

/// Result of an [`encode_from_archive`](Transcoder::encode_from_archive) run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct EncodeSummary {
    /// Frames written to the media sink.
    pub frames_written: u64,
    /// Effective output frame rate.
    pub fps: f64,
}

/// Composes engines and a handle registry into bulk transcoding procedures.
pub struct Transcoder {
    decode_engine: Box<dyn DecodeEngine>,
    encode_engine: Box<dyn EncodeEngine>,
    registry: Arc<HandleRegistry>,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder {
    /// Create a transcoder backed by the FFmpeg engine and a fresh registry.
    pub fn new() -> Self {
        Self::with_engines(
            Box::new(FfmpegEngine::new()),
            Box::new(FfmpegEngine::new()),
            Arc::new(HandleRegistry::new()),
        )
    }

    /// Create a transcoder with caller-supplied engines and registry.
    pub fn with_engines(
        decode_engine: Box<dyn DecodeEngine>,
        encode_engine: Box<dyn EncodeEngine>,
        registry: Arc<HandleRegistry>,
    ) -> Self {
        Self {
            decode_engine,
            encode_engine,
            registry,
        }
    }

    /// The registry tracking this transcoder's open handles.
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Open a reader on `path` with this transcoder's decode engine.
    pub fn open_reader(
        &self,
        path: impl AsRef<Path>,
        options: SourceOptions,
    ) -> Result<FrameReader, FrameshiftError> {
        FrameReader::open_with(self.decode_engine.as_ref(), path, options, &self.registry)
    }

    /// Open a writer on `path` with this transcoder's encode engine.
    pub fn open_writer(
        &self,
        path: impl AsRef<Path>,
        fps: f64,
        options: SinkOptions,
    ) -> Result<FrameWriter, FrameshiftError> {
        FrameWriter::open_with(
            self.encode_engine.as_ref(),
            path,
            fps,
            options,
            &self.registry,
        )
    }

    /// Decode frames from a movie file into a frame archive.
    ///
    /// Skips `options.start` frames, then repeatedly advances past
    /// `interval - 1` frames and archives one, until `options.count` frames
    /// are archived or the source is exhausted. The archive metadata records
    /// the source snapshot with the frame rate divided by the interval and
    /// the frame count set to what was actually written.
    ///
    /// When the frame loop fails partway, the metadata is still finalized
    /// with the partial count before the error is returned, so the archive
    /// remains self-describing; callers detect incompleteness by comparing
    /// the recorded count against what they requested.
    pub fn decode_to_archive(
        &self,
        source: impl AsRef<Path>,
        store: &dyn ArchiveStore,
        destination: impl AsRef<Path>,
        options: DecodeOptions,
    ) -> Result<DecodeSummary, FrameshiftError> {
        let destination = destination.as_ref();
        let mut archive = store.open(destination, options.mode)?;

        let source_options = SourceOptions {
            size: options.size,
            extra: options.engine_options.clone(),
        };
        let mut reader = self.open_reader(source.as_ref(), source_options)?;

        let interval = options.interval.max(1);
        let mut info = reader.info().clone();
        if interval > 1 {
            if let Some(fps) = info.fps {
                info.fps = Some(fps / interval as f64);
            }
        }
        if let Some((width, height)) = options.size {
            info.width = width;
            info.height = height;
        }

        let mut written = 0u64;
        let loop_result: Result<(), FrameshiftError> = (|| {
            reader.skip(options.start)?;
            while options.count != Some(written) {
                if interval > 1 && reader.skip(interval - 1)? < interval - 1 {
                    break;
                }
                let Some(frame) = reader.next_frame()? else {
                    break;
                };
                let raw = frame.into_raw();
                let raw = if options.alpha {
                    raw.into_rgba()
                } else {
                    raw.into_rgb()
                };
                archive.append(&raw)?;
                written += 1;
            }
            Ok(())
        })();

        // Finalize metadata with the actual count even after a failed loop.
        info.frame_count = FrameCount::Exact(written);
        let mut finalize_result = archive.set_metadata(&info);
        if finalize_result.is_ok() {
            finalize_result = archive.close();
        }
        if finalize_result.is_ok() {
            finalize_result = reader.close();
        }

        if let Err(error) = loop_result {
            if let Err(finalize_error) = finalize_result {
                log::warn!("archive finalization also failed: {finalize_error}");
            }
            return Err(error);
        }
        finalize_result?;

        log::info!(
            "archived {written} frames to {} (interval {interval}, fps {:?})",
            destination.display(),
            info.fps,
        );
        Ok(DecodeSummary {
            frames_written: written,
            fps: info.fps,
        })
    }

    /// Encode frames from a frame archive into a movie file.
    ///
    /// The output frame rate is the explicit option, else the archive
    /// metadata's, else [`DEFAULT_FPS`]. The slice rule matches
    /// [`FrameWriter::concat_archive`]: `[start, start + count)`, or
    /// `[start..]` when `count` is unset. Frames matching the explicit output
    /// size (or when no size is set) take the unchecked fast path; mismatches
    /// are resized through the writer.
    pub fn encode_from_archive(
        &self,
        store: &dyn ArchiveStore,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        options: EncodeOptions,
    ) -> Result<EncodeSummary, FrameshiftError> {
        let destination = destination.as_ref();
        let mut archive = store.open(source.as_ref(), ArchiveMode::Read)?;

        let metadata = archive.metadata()?;
        let fps = options.fps.unwrap_or_else(|| {
            metadata
                .as_ref()
                .and_then(|info| info.fps)
                .filter(|fps| *fps > 0.0)
                .unwrap_or(DEFAULT_FPS)
        });

        let mut writer = self.open_writer(destination, fps, options.sink.clone())?;
        let explicit_size = options.sink.size;

        let mut written = 0u64;
        for frame in archive.slice(options.start, options.count)? {
            let raw = frame?;
            match explicit_size {
                Some(size) if raw.size() != size => {
                    writer.write(Frame::Raw(raw))?;
                }
                _ => {
                    writer.write_raw(&raw)?;
                }
            }
            written += 1;
        }

        archive.close()?;
        writer.close()?;

        log::info!(
            "encoded {written} frames from archive to {} at {fps} fps",
            destination.display(),
        );
        Ok(EncodeSummary {
            frames_written: written,
            fps,
        })
    }
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
