//! Shared stub engines for integration tests.
//!
//! The stubs implement the engine boundary traits so tests can observe
//! exactly what readers and writers emit without touching FFmpeg:
//!
//! - [`StubDecodeEngine`] produces a fixed number of deterministic frames and
//!   can be told to fail partway through.
//! - [`StubEncodeEngine`] records every appended frame in a [`Recording`]
//!   shared with the test.
//! - [`LoopbackEngine`] implements both traits over an in-memory "file
//!   system", losslessly, for round-trip tests.

#![allow(dead_code)] // each test binary uses a subset

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use frameshift::{
    ColorMode, DecodeEngine, EncodeEngine, FrameCount, FrameSink, FrameSource, FrameshiftError,
    MediaInfo, RawFrame, SinkOptions, SourceOptions,
};

/// Deterministic RGB frame: every byte of frame `index` is `index % 251`.
pub fn test_frame(index: u64, width: u32, height: u32) -> RawFrame {
    let value = (index % 251) as u8;
    let data = vec![value; width as usize * height as usize * 3];
    RawFrame::new(data, width, height, ColorMode::Rgb).expect("valid test frame")
}

/// Stub decode engine producing `frames` deterministic frames per source.
#[derive(Debug, Clone)]
pub struct StubDecodeEngine {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub duration: Option<f64>,
    pub frame_count: FrameCount,
    /// Fail with a decode error once this many frames have been produced
    /// (skips count as produced frames).
    pub fail_after: Option<u64>,
}

impl StubDecodeEngine {
    /// A well-formed source: `frames` frames of 8x6 RGB at 30 fps, declaring
    /// an exact frame count.
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            width: 8,
            height: 6,
            fps: Some(30.0),
            duration: None,
            frame_count: FrameCount::Exact(frames),
            fail_after: None,
        }
    }

    pub fn fail_after(mut self, produced: u64) -> Self {
        self.fail_after = Some(produced);
        self
    }
}

impl DecodeEngine for StubDecodeEngine {
    fn open_source(
        &self,
        _path: &Path,
        options: &SourceOptions,
    ) -> Result<Box<dyn FrameSource>, FrameshiftError> {
        let (width, height) = options.size.unwrap_or((self.width, self.height));
        let mut info = MediaInfo::with_size(self.width, self.height);
        info.fps = self.fps;
        info.duration = self.duration;
        info.frame_count = self.frame_count;
        Ok(Box::new(StubSource {
            info,
            width,
            height,
            total: self.frames,
            produced: 0,
            fail_after: self.fail_after,
        }))
    }
}

struct StubSource {
    info: MediaInfo,
    width: u32,
    height: u32,
    total: u64,
    produced: u64,
    fail_after: Option<u64>,
}

impl StubSource {
    fn advance(&mut self) -> Result<Option<u64>, FrameshiftError> {
        if self.fail_after == Some(self.produced) {
            return Err(FrameshiftError::Decode("injected stub failure".into()));
        }
        if self.produced >= self.total {
            return Ok(None);
        }
        let index = self.produced;
        self.produced += 1;
        Ok(Some(index))
    }
}

impl FrameSource for StubSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameshiftError> {
        Ok(self
            .advance()?
            .map(|index| test_frame(index, self.width, self.height)))
    }

    fn skip_frame(&mut self) -> Result<bool, FrameshiftError> {
        Ok(self.advance()?.is_some())
    }
}

/// Everything a [`StubEncodeEngine`] observed, shared with the test.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    opens: Vec<(PathBuf, f64)>,
    sizes: Vec<(u32, u32)>,
    frames: Vec<RawFrame>,
    finished: usize,
}

impl Recording {
    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `(path, fps)` of every sink opened.
    pub fn opens(&self) -> Vec<(PathBuf, f64)> {
        self.lock().opens.clone()
    }

    /// Sizes of appended frames, in order — what the engine actually saw.
    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.lock().sizes.clone()
    }

    /// Appended frames, in order.
    pub fn frames(&self) -> Vec<RawFrame> {
        self.lock().frames.clone()
    }

    /// Number of times a sink was finalized.
    pub fn finished(&self) -> usize {
        self.lock().finished
    }
}

/// Stub encode engine recording every append into a shared [`Recording`].
#[derive(Debug, Clone, Default)]
pub struct StubEncodeEngine {
    pub recording: Recording,
}

impl StubEncodeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EncodeEngine for StubEncodeEngine {
    fn open_sink(
        &self,
        path: &Path,
        fps: f64,
        _options: &SinkOptions,
    ) -> Result<Box<dyn FrameSink>, FrameshiftError> {
        self.recording.lock().opens.push((path.to_path_buf(), fps));
        Ok(Box::new(RecordingSink {
            recording: self.recording.clone(),
        }))
    }
}

struct RecordingSink {
    recording: Recording,
}

impl FrameSink for RecordingSink {
    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError> {
        let mut inner = self.recording.lock();
        inner.sizes.push(frame.size());
        inner.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FrameshiftError> {
        self.recording.lock().finished += 1;
        Ok(())
    }
}

type LoopbackLibrary = Arc<Mutex<HashMap<PathBuf, (f64, Vec<RawFrame>)>>>;

/// Lossless in-memory engine implementing both halves of the boundary.
///
/// Sinks commit their frames to a shared library on `finish`; sources read
/// them back bit-exactly. Clones share the library.
#[derive(Debug, Clone, Default)]
pub struct LoopbackEngine {
    library: LoopbackLibrary,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EncodeEngine for LoopbackEngine {
    fn open_sink(
        &self,
        path: &Path,
        fps: f64,
        _options: &SinkOptions,
    ) -> Result<Box<dyn FrameSink>, FrameshiftError> {
        Ok(Box::new(LoopbackSink {
            library: Arc::clone(&self.library),
            path: path.to_path_buf(),
            fps,
            frames: Vec::new(),
        }))
    }
}

impl DecodeEngine for LoopbackEngine {
    fn open_source(
        &self,
        path: &Path,
        _options: &SourceOptions,
    ) -> Result<Box<dyn FrameSource>, FrameshiftError> {
        let library = self.library.lock().unwrap_or_else(PoisonError::into_inner);
        let (fps, frames) = library.get(path).cloned().ok_or_else(|| {
            FrameshiftError::SourceOpen {
                path: path.to_path_buf(),
                reason: "no such loopback file".into(),
            }
        })?;

        let (width, height) = frames.first().map(RawFrame::size).unwrap_or((0, 0));
        let mut info = MediaInfo::with_size(width, height);
        info.fps = Some(fps);
        info.frame_count = FrameCount::Exact(frames.len() as u64);

        Ok(Box::new(LoopbackSource {
            info,
            frames,
            position: 0,
        }))
    }
}

struct LoopbackSink {
    library: LoopbackLibrary,
    path: PathBuf,
    fps: f64,
    frames: Vec<RawFrame>,
}

impl FrameSink for LoopbackSink {
    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FrameshiftError> {
        self.library
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.path.clone(), (self.fps, std::mem::take(&mut self.frames)));
        Ok(())
    }
}

struct LoopbackSource {
    info: MediaInfo,
    frames: Vec<RawFrame>,
    position: usize,
}

impl FrameSource for LoopbackSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameshiftError> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }
}
