//! Process-wide open-handle tracking.
//!
//! Every [`FrameReader`](crate::FrameReader) and
//! [`FrameWriter`](crate::FrameWriter) registers itself in a
//! [`HandleRegistry`] at construction and unregisters on close. The registry
//! is an explicit object injected into constructors — there is no hidden
//! global — so an application can keep one registry per pipeline and sweep it
//! at shutdown with [`close_all`](HandleRegistry::close_all).
//!
//! Only construction and close mutate the registry; no other component does.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError, Weak,
    },
};

use crate::error::FrameshiftError;

/// Identifier of a registered handle, unique within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

/// Kind of a registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// A [`FrameReader`](crate::FrameReader).
    Reader,
    /// A [`FrameWriter`](crate::FrameWriter).
    Writer,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Reader => f.write_str("reader"),
            HandleKind::Writer => f.write_str("writer"),
        }
    }
}

/// Implemented by the shared core of a reader or writer so the registry can
/// release it without owning it.
pub(crate) trait ForceClose: Send + Sync {
    /// Release the underlying engine handle. Idempotent.
    fn force_close(&self) -> Result<(), FrameshiftError>;
}

struct Entry {
    kind: HandleKind,
    target: PathBuf,
    core: Weak<dyn ForceClose>,
}

/// Registry of currently-open reader and writer handles.
///
/// Internally mutex-guarded, so sharing one registry across threads is safe;
/// the intended use is still one registry owned by one pipeline.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use frameshift::{FrameReader, HandleRegistry, SourceOptions};
///
/// let registry = Arc::new(HandleRegistry::new());
/// let reader = FrameReader::open("input.mp4", SourceOptions::new(), &registry)?;
/// assert_eq!(registry.len(), 1);
///
/// // At shutdown, anything still open is swept.
/// drop(reader);
/// registry.close_all()?;
/// # Ok::<(), frameshift::FrameshiftError>(())
/// ```
#[derive(Default)]
pub struct HandleRegistry {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        kind: HandleKind,
        target: &Path,
        core: Weak<dyn ForceClose>,
    ) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::debug!("registering {kind} handle #{id} for {}", target.display());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Entry {
                    kind,
                    target: target.to_path_buf(),
                    core,
                },
            );
        HandleId(id)
    }

    pub(crate) fn unregister(&self, id: HandleId) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0);
        if let Some(entry) = removed {
            log::debug!(
                "unregistered {} handle #{} for {}",
                entry.kind,
                id.0,
                entry.target.display()
            );
        }
    }

    /// Number of currently-open handles.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` when no handles are open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the currently-open handles.
    pub fn open_handles(&self) -> Vec<(HandleId, HandleKind, PathBuf)> {
        let mut handles: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (HandleId(*id), entry.kind, entry.target.clone()))
            .collect();
        handles.sort_by_key(|(id, _, _)| id.0);
        handles
    }

    /// Close every handle still registered and empty the registry.
    ///
    /// Handles whose owner was already dropped are simply forgotten (their
    /// resources were released by `Drop`). Returns the number of handles that
    /// were actually force-closed.
    ///
    /// # Errors
    ///
    /// Every handle is attempted; the first close failure is returned after
    /// the sweep completes.
    pub fn close_all(&self) -> Result<usize, FrameshiftError> {
        let entries: Vec<(u64, Entry)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let mut closed = 0;
        let mut first_error = None;
        for (id, entry) in entries {
            let Some(core) = entry.core.upgrade() else {
                continue;
            };
            log::warn!(
                "force-closing leaked {} handle #{} for {}",
                entry.kind,
                id,
                entry.target.display()
            );
            match core.force_close() {
                Ok(()) => closed += 1,
                Err(error) => {
                    log::warn!("failed to close handle #{id}: {error}");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(closed),
        }
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("open", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[derive(Default)]
    struct CountingCore {
        closed: AtomicUsize,
    }

    impl ForceClose for CountingCore {
        fn force_close(&self) -> Result<(), FrameshiftError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn register(registry: &HandleRegistry, core: &Arc<CountingCore>) -> HandleId {
        let weak = Arc::downgrade(&(Arc::clone(core) as Arc<dyn ForceClose>));
        registry.register(HandleKind::Reader, Path::new("a.mp4"), weak)
    }

    #[test]
    fn register_and_unregister() {
        let registry = HandleRegistry::new();
        let core = Arc::new(CountingCore::default());

        let id = register(&registry, &core);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.open_handles()[0].1, HandleKind::Reader);

        registry.unregister(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_invokes_force_close() {
        let registry = HandleRegistry::new();
        let core = Arc::new(CountingCore::default());
        register(&registry, &core);
        register(&registry, &core);

        assert_eq!(registry.close_all().unwrap(), 2);
        assert_eq!(core.closed.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_all_skips_dropped_cores() {
        let registry = HandleRegistry::new();
        let core = Arc::new(CountingCore::default());
        register(&registry, &core);
        drop(core);

        assert_eq!(registry.close_all().unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let registry = HandleRegistry::new();
        let core = Arc::new(CountingCore::default());
        let a = register(&registry, &core);
        let b = register(&registry, &core);
        assert_ne!(a, b);
    }
}
