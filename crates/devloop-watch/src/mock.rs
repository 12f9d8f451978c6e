//! Mock watch backend for testing.
//!
//! Provides [`MockBackend`] for exercising the tree watcher without OS watch
//! handles. Clones share state, so a test can keep one clone for inspection
//! while the watcher owns the other.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::backend::WatchBackend;

#[derive(Debug, Default)]
struct MockState {
    watched: BTreeSet<PathBuf>,
    opened: usize,
    closed: usize,
    limit: Option<usize>,
    vanishing: HashMap<PathBuf, usize>,
}

/// In-memory watch backend.
///
/// # Example
///
/// ```ignore
/// use devloop_watch::MockBackend;
///
/// let backend = MockBackend::new().with_limit(10);
/// let observer = backend.clone();
/// // hand `backend` to a TreeWatcher, then inspect `observer.watched()`
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a backend with no handle limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to open more than `limit` simultaneous handles.
    #[must_use]
    pub fn with_limit(self, limit: usize) -> Self {
        self.state.lock().unwrap().limit = Some(limit);
        self
    }

    /// Report `path` as vanished for its next `times` watch attempts.
    #[must_use]
    pub fn with_vanishing(self, path: impl Into<PathBuf>, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .vanishing
            .insert(path.into(), times);
        self
    }

    /// Paths with an open handle, sorted.
    #[must_use]
    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watched.iter().cloned().collect()
    }

    /// Total handles opened over the backend's lifetime.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    /// Total handles closed over the backend's lifetime.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

impl WatchBackend for MockBackend {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.vanishing.get_mut(path)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(notify::Error::path_not_found().add_path(path.to_path_buf()));
        }

        if state.limit.is_some_and(|limit| state.watched.len() >= limit) {
            return Err(notify::Error::new(notify::ErrorKind::MaxFilesWatch));
        }

        state.watched.insert(path.to_path_buf());
        state.opened += 1;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.watched.remove(path) {
            state.closed += 1;
            Ok(())
        } else {
            Err(notify::Error::watch_not_found().add_path(path.to_path_buf()))
        }
    }
}
