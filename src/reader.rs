//! Sequential frame extraction.
//!
//! [`FrameReader`] opens a media source through a decode engine and pulls
//! frames one at a time. The declared frame size is fixed at open time (from
//! an explicit override or the source metadata) and does not change across
//! reads; consuming frames never mutates the metadata snapshot.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frameshift::{FrameReader, HandleRegistry, SourceOptions};
//!
//! let registry = Arc::new(HandleRegistry::new());
//! let mut reader = FrameReader::open("input.mp4", SourceOptions::new(), &registry)?;
//!
//! reader.skip(30)?;
//! while let Some(frame) = reader.next_frame()? {
//!     println!("{}x{}", frame.width(), frame.height());
//! }
//! reader.close()?;
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use image::DynamicImage;

use crate::{
    engine::{DecodeEngine, FrameSource, SourceOptions},
    error::FrameshiftError,
    ffmpeg::FfmpegEngine,
    frame::Frame,
    metadata::MediaInfo,
    registry::{ForceClose, HandleId, HandleKind, HandleRegistry},
};

pub(crate) struct ReaderCore {
    source: Mutex<Option<Box<dyn FrameSource>>>,
}

impl ForceClose for ReaderCore {
    fn force_close(&self) -> Result<(), FrameshiftError> {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Sequential, lazy frame extraction from a media source.
///
/// Construction registers the reader in its [`HandleRegistry`]; `close` (or
/// `Drop`, on any exit path) releases the engine handle and unregisters.
pub struct FrameReader {
    core: Arc<ReaderCore>,
    registry: Arc<HandleRegistry>,
    id: HandleId,
    info: MediaInfo,
    width: u32,
    height: u32,
    closed: bool,
}

impl FrameReader {
    /// Open a media source with the FFmpeg engine.
    ///
    /// # Errors
    ///
    /// [`FrameshiftError::SourceOpen`] when the source cannot be opened,
    /// [`FrameshiftError::NoVideoStream`] when it has no video.
    pub fn open(
        path: impl AsRef<Path>,
        options: SourceOptions,
        registry: &Arc<HandleRegistry>,
    ) -> Result<Self, FrameshiftError> {
        Self::open_with(&FfmpegEngine::new(), path, options, registry)
    }

    /// Open a media source with a caller-supplied decode engine.
    pub fn open_with(
        engine: &dyn DecodeEngine,
        path: impl AsRef<Path>,
        options: SourceOptions,
        registry: &Arc<HandleRegistry>,
    ) -> Result<Self, FrameshiftError> {
        let path = path.as_ref();
        let source = engine.open_source(path, &options)?;
        let info = source.info().clone();
        let (width, height) = options.size.unwrap_or_else(|| info.size());

        let core = Arc::new(ReaderCore {
            source: Mutex::new(Some(source)),
        });
        let weak = Arc::downgrade(&(Arc::clone(&core) as Arc<dyn ForceClose>));
        let id = registry.register(HandleKind::Reader, path, weak);

        Ok(Self {
            core,
            registry: Arc::clone(registry),
            id,
            info,
            width,
            height,
            closed: false,
        })
    }

    /// Metadata snapshot captured at open time.
    ///
    /// Unaffected by consuming frames.
    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Effective frame size: the explicit override, else the source size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pull the next decoded frame.
    ///
    /// `Ok(None)` is the normal end-of-stream signal, not an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameshiftError> {
        let mut guard = self
            .core
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let source = guard.as_mut().ok_or(FrameshiftError::HandleClosed)?;
        Ok(source.next_frame()?.map(Frame::Raw))
    }

    /// Lazily iterate all remaining frames.
    ///
    /// The iterator is finite and non-restartable: it ends when the source is
    /// exhausted, and frames it consumed are gone.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            reader: self,
            done: false,
        }
    }

    /// Lazily iterate at most `limit` remaining frames as images.
    ///
    /// `limit` of `None` reads to exhaustion. Frames are converted to RGBA
    /// images when `alpha` is set and RGB otherwise.
    pub fn images(&mut self, limit: Option<u64>, alpha: bool) -> Images<'_> {
        Images {
            reader: self,
            remaining: limit,
            alpha,
            done: false,
        }
    }

    /// Discard up to `n` frames without materializing them.
    ///
    /// Returns the number actually skipped, which is less than `n` when the
    /// source runs out first — an underrun is not an error.
    ///
    /// # Errors
    ///
    /// Engine failures (anything other than running out of frames) propagate.
    pub fn skip(&mut self, n: u64) -> Result<u64, FrameshiftError> {
        let mut guard = self
            .core
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let source = guard.as_mut().ok_or(FrameshiftError::HandleClosed)?;

        let mut skipped = 0;
        while skipped < n {
            if !source.skip_frame()? {
                log::debug!("skip underrun: requested {n}, source ended after {skipped}");
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Best-effort frame count from the metadata snapshot.
    ///
    /// See [`MediaInfo::estimated_frame_count`]; `None` means the count
    /// cannot be derived. Never fails.
    pub fn estimated_frame_count(&self) -> Option<u64> {
        self.info.estimated_frame_count()
    }

    /// Release the engine handle and unregister from the registry.
    ///
    /// Safe to call more than once; `Drop` performs the same cleanup when the
    /// reader goes out of scope without an explicit close.
    pub fn close(&mut self) -> Result<(), FrameshiftError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.registry.unregister(self.id);
        self.core
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if !self.closed {
            self.registry.unregister(self.id);
            self.core
                .source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("size", &self.size())
            .field("info", &self.info)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Lazy iterator over all remaining frames of a [`FrameReader`].
pub struct Frames<'a> {
    reader: &'a mut FrameReader,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameshiftError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// Lazy, bounded iterator converting frames to [`DynamicImage`].
pub struct Images<'a> {
    reader: &'a mut FrameReader,
    remaining: Option<u64>,
    alpha: bool,
    done: bool,
}

impl Iterator for Images<'_> {
    type Item = Result<DynamicImage, FrameshiftError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        let frame = match self.reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(error) => {
                self.done = true;
                return Some(Err(error));
            }
        };
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        let image = match frame.into_image() {
            Ok(image) => image,
            Err(error) => {
                self.done = true;
                return Some(Err(error));
            }
        };
        let image = match (self.alpha, image) {
            (true, DynamicImage::ImageRgba8(image)) => DynamicImage::ImageRgba8(image),
            (true, other) => DynamicImage::ImageRgba8(other.to_rgba8()),
            (false, DynamicImage::ImageRgb8(image)) => DynamicImage::ImageRgb8(image),
            (false, other) => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Some(Ok(image))
    }
}
