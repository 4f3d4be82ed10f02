//! Sequential frame emission.
//!
//! [`FrameWriter`] opens a media sink through an encode engine and appends
//! frames one at a time. The target size is fixed by the first frame written
//! (or an explicit size in [`SinkOptions`]); every later frame is conformed to
//! it before emission. [`write_raw`](FrameWriter::write_raw) bypasses that
//! policy entirely for callers that guarantee conformance upstream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frameshift::{FrameReader, FrameWriter, HandleRegistry, SinkOptions, SourceOptions};
//!
//! let registry = Arc::new(HandleRegistry::new());
//! let mut reader = FrameReader::open("input.mp4", SourceOptions::new(), &registry)?;
//! let mut writer = FrameWriter::open("trimmed.mp4", 30.0, SinkOptions::new(), &registry)?;
//!
//! // Drop the first 30 frames, keep the next 120.
//! writer.concat_reader(&mut reader, 30, Some(120))?;
//! writer.close()?;
//! # Ok::<(), frameshift::FrameshiftError>(())
//! ```

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    archive::FrameArchive,
    engine::{EncodeEngine, FrameSink, SinkOptions},
    error::FrameshiftError,
    ffmpeg::FfmpegEngine,
    frame::{Frame, RawFrame},
    reader::FrameReader,
    registry::{ForceClose, HandleId, HandleKind, HandleRegistry},
};

pub(crate) struct WriterCore {
    sink: Mutex<Option<Box<dyn FrameSink>>>,
}

impl ForceClose for WriterCore {
    fn force_close(&self) -> Result<(), FrameshiftError> {
        let taken = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(mut sink) => sink.finish(),
            None => Ok(()),
        }
    }
}

/// Sequential frame emission to a media sink.
///
/// Construction registers the writer in its [`HandleRegistry`]; `close` (or
/// `Drop`, on any exit path) finalizes the sink and unregisters. Written
/// order is emission order.
pub struct FrameWriter {
    core: Arc<WriterCore>,
    registry: Arc<HandleRegistry>,
    id: HandleId,
    size: Option<(u32, u32)>,
    fps: f64,
    closed: bool,
}

impl FrameWriter {
    /// Open a media sink with the FFmpeg engine.
    ///
    /// # Errors
    ///
    /// [`FrameshiftError::SinkOpen`] when the destination cannot be opened or
    /// `fps` is not positive.
    pub fn open(
        path: impl AsRef<Path>,
        fps: f64,
        options: SinkOptions,
        registry: &Arc<HandleRegistry>,
    ) -> Result<Self, FrameshiftError> {
        Self::open_with(&FfmpegEngine::new(), path, fps, options, registry)
    }

    /// Open a media sink with a caller-supplied encode engine.
    pub fn open_with(
        engine: &dyn EncodeEngine,
        path: impl AsRef<Path>,
        fps: f64,
        options: SinkOptions,
        registry: &Arc<HandleRegistry>,
    ) -> Result<Self, FrameshiftError> {
        let path = path.as_ref();
        let size = options.size;
        let sink = engine.open_sink(path, fps, &options)?;

        let core = Arc::new(WriterCore {
            sink: Mutex::new(Some(sink)),
        });
        let weak = Arc::downgrade(&(Arc::clone(&core) as Arc<dyn ForceClose>));
        let id = registry.register(HandleKind::Writer, path, weak);

        Ok(Self {
            core,
            registry: Arc::clone(registry),
            id,
            size,
            fps,
            closed: false,
        })
    }

    /// Target frame size, once fixed (at open time or by the first write).
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Output frame rate.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Write one frame, conforming it to the target size.
    ///
    /// The first frame fixes the target size when none was set at open time;
    /// later frames of a different size are resized before emission. Pixels
    /// are emitted as RGB — alpha is stripped.
    ///
    /// Returns `&mut Self` so writes can be chained.
    pub fn write(&mut self, frame: impl Into<Frame>) -> Result<&mut Self, FrameshiftError> {
        let frame = frame.into();
        let target = match self.size {
            Some(target) => target,
            None => {
                self.size = Some(frame.size());
                frame.size()
            }
        };
        let frame = if frame.size() != target {
            log::debug!(
                "resizing frame {}x{} to target {}x{}",
                frame.width(),
                frame.height(),
                target.0,
                target.1,
            );
            frame.resized(target.0, target.1)?
        } else {
            frame
        };

        let raw = frame.into_raw().into_rgb();
        self.append(&raw)?;
        Ok(self)
    }

    /// Append a raw frame directly, without verifying or enforcing size
    /// conformity.
    ///
    /// The fast path when size-matching is guaranteed upstream: no resize is
    /// ever performed and the target size is not consulted or adopted. The
    /// engine receives whatever the caller supplies.
    pub fn write_raw(&mut self, frame: &RawFrame) -> Result<&mut Self, FrameshiftError> {
        self.append(frame)?;
        Ok(self)
    }

    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError> {
        let mut guard = self
            .core
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sink = guard.as_mut().ok_or(FrameshiftError::HandleClosed)?;
        sink.append(frame)
    }

    /// Concatenate frames from another reader.
    ///
    /// Skips `start` frames from `source`, then writes up to `count` frames
    /// (all remaining when `count` is `None`) through [`write`](Self::write),
    /// so the per-frame resize policy applies.
    pub fn concat_reader(
        &mut self,
        source: &mut FrameReader,
        start: u64,
        count: Option<u64>,
    ) -> Result<&mut Self, FrameshiftError> {
        source.skip(start)?;
        let mut remaining = count;
        while remaining != Some(0) {
            match source.next_frame()? {
                Some(frame) => {
                    self.write(frame)?;
                    if let Some(remaining) = remaining.as_mut() {
                        *remaining -= 1;
                    }
                }
                None => break,
            }
        }
        Ok(self)
    }

    /// Concatenate frames from a frame archive.
    ///
    /// Slices `[start, start + count)` (or `[start..]` when `count` is
    /// `None`) and writes each frame through [`write`](Self::write).
    pub fn concat_archive(
        &mut self,
        archive: &dyn FrameArchive,
        start: u64,
        count: Option<u64>,
    ) -> Result<&mut Self, FrameshiftError> {
        for frame in archive.slice(start, count)? {
            self.write(frame?)?;
        }
        Ok(self)
    }

    /// Finalize the sink and unregister from the registry.
    ///
    /// Safe to call more than once. `Drop` performs the same cleanup, logging
    /// instead of returning finalization errors.
    pub fn close(&mut self) -> Result<(), FrameshiftError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.registry.unregister(self.id);
        let taken = self
            .core
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(mut sink) => sink.finish(),
            None => Ok(()),
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.registry.unregister(self.id);
            let taken = self
                .core
                .sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(mut sink) = taken {
                if let Err(error) = sink.finish() {
                    log::warn!("failed to finalize dropped writer: {error}");
                }
            }
        }
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("target_size", &self.size)
            .field("fps", &self.fps)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
