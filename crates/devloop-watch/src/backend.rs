//! Watch handle backends.
//!
//! A backend opens and closes one non-recursive watch handle per path. The
//! tree watcher decides which paths get handles; the backend only talks to
//! the OS.

use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;
use crate::event::WatchEvent;
use crate::filter::PathFilter;

/// Registration of per-path watch handles.
pub trait WatchBackend: Send {
    /// Open a handle for `path`.
    fn watch(&mut self, path: &Path) -> notify::Result<()>;

    /// Close the handle for `path`.
    fn unwatch(&mut self, path: &Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::watch(self, path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        Watcher::unwatch(self, path)
    }
}

/// Create the platform watcher, delivering classified events to `sink`.
///
/// `sink` runs on the backend's notification thread and must not block.
pub fn notify_backend<F>(filter: PathFilter, sink: F) -> Result<RecommendedWatcher, WatchError>
where
    F: Fn(WatchEvent) + Send + 'static,
{
    let root = filter.root().to_path_buf();
    notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
        Ok(event) => {
            for watch_event in WatchEvent::classify(&event, &filter) {
                tracing::debug!(
                    path = %watch_event.path.display(),
                    kind = ?watch_event.kind,
                    "Recorded filesystem event"
                );
                sink(watch_event);
            }
        }
        Err(e) => tracing::warn!(error = %e, "Watch backend error"),
    })
    .map_err(|source| WatchError::Backend { path: root, source })
}
