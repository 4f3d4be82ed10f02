//! Frame-archive boundary.
//!
//! A frame archive is an ordered, randomly-sliceable sequence of raw frames
//! with an attached metadata record, backed by a persistent container. The
//! container format itself belongs to an external collaborator; this crate
//! only depends on the operations in [`FrameArchive`] and opens archives
//! through an [`ArchiveStore`].
//!
//! [`MemoryStore`] is the in-tree reference collaborator: archives live in
//! process memory, handles opened on the same locator observe the same data.
//! It backs the test suite and is useful for staging frames before encoding.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{error::FrameshiftError, frame::RawFrame, metadata::MediaInfo};

/// How to open an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Open an existing archive for reading; fail when it does not exist.
    #[default]
    Read,
    /// Create a new archive; fail when one already exists at the locator.
    Create,
    /// Create a new archive, replacing any existing one.
    Truncate,
}

/// An ordered, sliceable, appendable sequence of raw frames plus metadata.
pub trait FrameArchive: Send {
    /// Number of frames currently stored.
    fn len(&self) -> u64;

    /// `true` when no frames are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The attached metadata record, when one has been set.
    fn metadata(&self) -> Result<Option<MediaInfo>, FrameshiftError>;

    /// Replace the attached metadata record.
    fn set_metadata(&mut self, info: &MediaInfo) -> Result<(), FrameshiftError>;

    /// Append one frame at the end of the sequence.
    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError>;

    /// Lazily iterate frames `[start, start + count)`, or `[start..]` when
    /// `count` is `None`. A `start` past the end yields an empty sequence.
    fn slice(
        &self,
        start: u64,
        count: Option<u64>,
    ) -> Result<Box<dyn Iterator<Item = Result<RawFrame, FrameshiftError>> + '_>, FrameshiftError>;

    /// Release the archive handle, flushing any pending container state.
    fn close(&mut self) -> Result<(), FrameshiftError>;
}

/// Opens [`FrameArchive`] handles at a locator.
pub trait ArchiveStore {
    /// Open the archive at `locator` in the given mode.
    fn open(
        &self,
        locator: &Path,
        mode: ArchiveMode,
    ) -> Result<Box<dyn FrameArchive>, FrameshiftError>;
}

#[derive(Default)]
struct ArchiveData {
    frames: Vec<RawFrame>,
    info: Option<MediaInfo>,
}

/// In-memory archive store.
///
/// Archives are keyed by locator; every handle opened on the same locator
/// shares the same underlying data, so frames written through one handle are
/// visible to another opened later — the same observable behavior as a
/// file-backed container, without the files.
#[derive(Default)]
pub struct MemoryStore {
    archives: Mutex<HashMap<PathBuf, Arc<Mutex<ArchiveData>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locators of the archives currently held by the store.
    pub fn locators(&self) -> Vec<PathBuf> {
        let mut locators: Vec<_> = self
            .archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        locators.sort();
        locators
    }
}

impl ArchiveStore for MemoryStore {
    fn open(
        &self,
        locator: &Path,
        mode: ArchiveMode,
    ) -> Result<Box<dyn FrameArchive>, FrameshiftError> {
        let mut archives = self
            .archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let data = match mode {
            ArchiveMode::Read => archives
                .get(locator)
                .cloned()
                .ok_or_else(|| {
                    FrameshiftError::Archive(format!("no archive at {}", locator.display()))
                })?,
            ArchiveMode::Create => {
                if archives.contains_key(locator) {
                    return Err(FrameshiftError::Archive(format!(
                        "archive already exists at {}",
                        locator.display()
                    )));
                }
                let data = Arc::new(Mutex::new(ArchiveData::default()));
                archives.insert(locator.to_path_buf(), Arc::clone(&data));
                data
            }
            ArchiveMode::Truncate => {
                let data = Arc::new(Mutex::new(ArchiveData::default()));
                archives.insert(locator.to_path_buf(), Arc::clone(&data));
                data
            }
        };

        Ok(Box::new(MemoryArchive { data }))
    }
}

/// Handle to an archive held in a [`MemoryStore`].
pub struct MemoryArchive {
    data: Arc<Mutex<ArchiveData>>,
}

impl FrameArchive for MemoryArchive {
    fn len(&self) -> u64 {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .len() as u64
    }

    fn metadata(&self) -> Result<Option<MediaInfo>, FrameshiftError> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info
            .clone())
    }

    fn set_metadata(&mut self, info: &MediaInfo) -> Result<(), FrameshiftError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info = Some(info.clone());
        Ok(())
    }

    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .push(frame.clone());
        Ok(())
    }

    fn slice(
        &self,
        start: u64,
        count: Option<u64>,
    ) -> Result<Box<dyn Iterator<Item = Result<RawFrame, FrameshiftError>> + '_>, FrameshiftError>
    {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let start = (start as usize).min(data.frames.len());
        let end = match count {
            Some(count) => (start + count as usize).min(data.frames.len()),
            None => data.frames.len(),
        };
        let frames: Vec<RawFrame> = data.frames[start..end].to_vec();
        Ok(Box::new(frames.into_iter().map(Ok)))
    }

    fn close(&mut self) -> Result<(), FrameshiftError> {
        Ok(())
    }
}
