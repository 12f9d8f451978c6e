//! Depth-limited tree watcher.
//!
//! Provides [`TreeWatcher`], which owns one watch handle per directory and
//! per tracked file below a root. The handle set only ever changes through
//! [`TreeWatcher::rebuild`] (close everything, then rescan) and
//! [`TreeWatcher::close_all`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::backend::WatchBackend;
use crate::error::WatchError;
use crate::filter::PathFilter;

/// Delay before rescanning after an entry vanished mid-scan.
const RESCAN_DELAY: Duration = Duration::from_millis(100);

/// Rescans attempted before the last attempt tolerates vanishing entries.
const MAX_RESCAN_ATTEMPTS: usize = 10;

/// Kind of watched path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A directory; its handle reports structural changes of its entries.
    Directory,
    /// A tracked file.
    File,
}

/// A path with an open watch handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchNode {
    /// Path as reached from the root.
    pub path: PathBuf,
    /// Depth below the root (the root is 0).
    pub depth: usize,
    /// Directory or file.
    pub kind: NodeKind,
}

/// Scan parameters, fixed for the watcher's lifetime.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// Directory to scan.
    pub root: PathBuf,
    /// Deepest directory level that gets a handle.
    pub max_depth: usize,
    /// Exclusion and extension filter.
    pub filter: PathFilter,
}

/// Result of a successful rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Directories watched.
    pub directories: usize,
    /// Files watched.
    pub files: usize,
    /// Scans performed, including retries.
    pub attempts: usize,
}

/// Outcome of a failed scan attempt.
enum ScanError {
    /// An entry disappeared between listing and watching it.
    Vanished(PathBuf),
    /// Scanning cannot continue.
    Fatal(WatchError),
}

/// Depth-limited tree watcher.
///
/// # Example
///
/// ```ignore
/// let mut watcher = TreeWatcher::new(backend, options);
/// let summary = watcher.rebuild()?;
/// tracing::info!(files = summary.files, "Watching");
/// ```
pub struct TreeWatcher<B: WatchBackend> {
    backend: B,
    options: WatchOptions,
    nodes: Vec<WatchNode>,
}

impl<B: WatchBackend> TreeWatcher<B> {
    /// Create a watcher with no open handles.
    pub fn new(backend: B, options: WatchOptions) -> Self {
        Self {
            backend,
            options,
            nodes: Vec::new(),
        }
    }

    /// Scan parameters.
    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Currently watched nodes in scan order.
    pub fn nodes(&self) -> &[WatchNode] {
        &self.nodes
    }

    /// Currently watched paths in scan order.
    pub fn watched_paths(&self) -> impl Iterator<Item = &Path> {
        self.nodes.iter().map(|node| node.path.as_path())
    }

    /// Check whether `path` has an open handle.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.nodes.iter().any(|node| node.path == path)
    }

    /// Close every handle, then rescan the tree.
    ///
    /// Entries vanishing mid-scan cause the whole scan to be repeated after a
    /// short delay, since a partially patched set may hold stale handles. The
    /// final attempt skips vanished entries instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, the OS runs out of watch
    /// handles, or an entry cannot be read for any reason other than having
    /// vanished. All handles are closed when an error is returned.
    pub fn rebuild(&mut self) -> Result<RebuildSummary, WatchError> {
        let root = self.options.root.clone();
        if !root.is_dir() {
            self.close_all();
            return Err(WatchError::RootMissing(root));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.close_all();
            let tolerate_vanished = attempt >= MAX_RESCAN_ATTEMPTS;

            match self.scan_dir(&root, 0, tolerate_vanished) {
                Ok(()) => {
                    let summary = self.summary(attempt);
                    tracing::info!(
                        root = %root.display(),
                        directories = summary.directories,
                        files = summary.files,
                        attempts = attempt,
                        "Watchers rebuilt"
                    );
                    return Ok(summary);
                }
                Err(ScanError::Vanished(path)) => {
                    tracing::info!(
                        path = %path.display(),
                        attempt,
                        "Entry vanished during scan, rescanning"
                    );
                    thread::sleep(RESCAN_DELAY);
                }
                Err(ScanError::Fatal(err)) => {
                    self.close_all();
                    return Err(err);
                }
            }
        }
    }

    /// Close every open handle.
    ///
    /// Handles whose path already disappeared are released by the OS; the
    /// backend error for those is only logged.
    pub fn close_all(&mut self) {
        for node in self.nodes.drain(..) {
            if let Err(e) = self.backend.unwatch(&node.path) {
                tracing::debug!(path = %node.path.display(), error = %e, "Handle already released");
            }
        }
    }

    fn summary(&self, attempts: usize) -> RebuildSummary {
        let directories = self
            .nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Directory)
            .count();
        RebuildSummary {
            directories,
            files: self.nodes.len() - directories,
            attempts,
        }
    }

    /// Watch `dir` and recurse depth-first, directories before files.
    fn scan_dir(&mut self, dir: &Path, depth: usize, tolerate: bool) -> Result<(), ScanError> {
        self.open(dir, depth, NodeKind::Directory)?;

        let read_dir = fs::read_dir(dir).map_err(|e| classify_io(e, dir))?;
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| classify_io(e, dir))?;
            let path = entry.path();
            // Follows symlinks so linked asset directories are watched too
            match fs::metadata(&path) {
                Ok(meta) => entries.push((path, meta.is_dir())),
                Err(e) if e.kind() == io::ErrorKind::NotFound && tolerate => {}
                Err(e) => return Err(classify_io(e, &path)),
            }
        }

        // Directories first, then alphabetical, so scans are deterministic
        entries.sort_by(|(a, a_is_dir), (b, b_is_dir)| b_is_dir.cmp(a_is_dir).then_with(|| a.cmp(b)));

        for (path, is_dir) in entries {
            if self.options.filter.is_excluded(&path) {
                continue;
            }

            let result = if is_dir {
                if depth >= self.options.max_depth {
                    continue;
                }
                self.scan_dir(&path, depth + 1, tolerate)
            } else if self.options.filter.is_tracked(&path) {
                self.open(&path, depth + 1, NodeKind::File)
            } else {
                continue;
            };

            match result {
                Err(ScanError::Vanished(gone)) if tolerate => {
                    tracing::warn!(path = %gone.display(), "Skipping entry that keeps vanishing");
                }
                other => other?,
            }
        }

        Ok(())
    }

    fn open(&mut self, path: &Path, depth: usize, kind: NodeKind) -> Result<(), ScanError> {
        match self.backend.watch(path) {
            Ok(()) => {
                self.nodes.push(WatchNode {
                    path: path.to_path_buf(),
                    depth,
                    kind,
                });
                Ok(())
            }
            Err(e) => Err(self.classify_backend(e, path, depth)),
        }
    }

    fn classify_backend(&self, err: notify::Error, path: &Path, depth: usize) -> ScanError {
        match &err.kind {
            notify::ErrorKind::PathNotFound => ScanError::Vanished(path.to_path_buf()),
            notify::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
                ScanError::Vanished(path.to_path_buf())
            }
            notify::ErrorKind::MaxFilesWatch => ScanError::Fatal(WatchError::TooManyWatches {
                at_depth: depth,
                max_depth: self.options.max_depth,
                watched: self.nodes.len(),
            }),
            _ => ScanError::Fatal(WatchError::Backend {
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }
}

impl<B: WatchBackend> Drop for TreeWatcher<B> {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn classify_io(err: io::Error, path: &Path) -> ScanError {
    if err.kind() == io::ErrorKind::NotFound {
        ScanError::Vanished(path.to_path_buf())
    } else {
        ScanError::Fatal(WatchError::Io {
            path: path.to_path_buf(),
            source: err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use pretty_assertions::assert_eq;

    fn create_site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.html"), "<p>a</p>").unwrap();
        fs::write(root.join("notes.txt"), "untracked").unwrap();
        fs::create_dir_all(root.join("css")).unwrap();
        fs::write(root.join("css/site.css"), "body {}").unwrap();
        fs::create_dir_all(root.join("one/two/three")).unwrap();
        fs::write(root.join("one/two/three/deep.html"), "deep").unwrap();
        dir
    }

    fn watcher(
        root: &Path,
        max_depth: usize,
        exclude: &[&str],
        backend: MockBackend,
    ) -> TreeWatcher<MockBackend> {
        let filter = PathFilter::new(
            root.to_path_buf(),
            vec!["html".to_owned(), "css".to_owned()],
            exclude.iter().map(|s| (*s).to_owned()).collect(),
        );
        TreeWatcher::new(
            backend,
            WatchOptions {
                root: root.to_path_buf(),
                max_depth,
                filter,
            },
        )
    }

    fn relative(root: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_rebuild_watches_dirs_and_tracked_files() {
        let site = create_site();
        let backend = MockBackend::new();
        let observer = backend.clone();
        let mut watcher = watcher(site.path(), 3, &[], backend);

        let summary = watcher.rebuild().unwrap();

        assert_eq!(
            relative(site.path(), observer.watched()),
            vec![
                "",
                "a.html",
                "css",
                "css/site.css",
                "one",
                "one/two",
                "one/two/three",
                "one/two/three/deep.html",
            ]
        );
        assert_eq!(summary.directories, 5);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.attempts, 1);
    }

    #[test]
    fn test_rebuild_respects_max_depth() {
        let site = create_site();
        let backend = MockBackend::new();
        let mut watcher = watcher(site.path(), 1, &[], backend);

        watcher.rebuild().unwrap();

        assert!(watcher.is_watching(&site.path().join("one")));
        assert!(!watcher.is_watching(&site.path().join("one/two")));
        assert!(!watcher.is_watching(&site.path().join("one/two/three/deep.html")));
        assert!(watcher.is_watching(&site.path().join("css/site.css")));
    }

    #[test]
    fn test_rebuild_applies_substring_exclusions() {
        let site = create_site();
        fs::create_dir_all(site.path().join("rebuild-assets")).unwrap();
        fs::write(site.path().join("rebuild-assets/x.html"), "x").unwrap();
        let backend = MockBackend::new();
        let mut watcher = watcher(site.path(), 3, &["build", "css"], backend);

        watcher.rebuild().unwrap();

        assert!(!watcher.is_watching(&site.path().join("rebuild-assets")));
        assert!(!watcher.is_watching(&site.path().join("rebuild-assets/x.html")));
        assert!(!watcher.is_watching(&site.path().join("css")));
        assert!(watcher.is_watching(&site.path().join("a.html")));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let site = create_site();
        let backend = MockBackend::new();
        let observer = backend.clone();
        let mut watcher = watcher(site.path(), 3, &[], backend);

        watcher.rebuild().unwrap();
        let first = observer.watched();
        let first_nodes = watcher.nodes().to_vec();
        watcher.rebuild().unwrap();

        assert_eq!(observer.watched(), first);
        assert_eq!(watcher.nodes(), first_nodes.as_slice());
        // Every handle from the first scan was closed before rescanning
        assert_eq!(observer.close_count(), first.len());
    }

    #[test]
    fn test_rebuild_picks_up_new_files() {
        let site = create_site();
        let backend = MockBackend::new();
        let mut watcher = watcher(site.path(), 3, &[], backend);
        watcher.rebuild().unwrap();

        fs::write(site.path().join("b.html"), "b").unwrap();
        fs::remove_file(site.path().join("a.html")).unwrap();
        watcher.rebuild().unwrap();

        assert!(watcher.is_watching(&site.path().join("b.html")));
        assert!(!watcher.is_watching(&site.path().join("a.html")));
    }

    #[test]
    fn test_rebuild_retries_vanished_entry() {
        let site = create_site();
        let backend = MockBackend::new().with_vanishing(site.path().join("a.html"), 2);
        let mut watcher = watcher(site.path(), 3, &[], backend);

        let summary = watcher.rebuild().unwrap();

        assert_eq!(summary.attempts, 3);
        assert!(watcher.is_watching(&site.path().join("a.html")));
    }

    #[test]
    fn test_rebuild_gives_up_on_persistently_vanishing_entry() {
        let site = create_site();
        let backend =
            MockBackend::new().with_vanishing(site.path().join("a.html"), MAX_RESCAN_ATTEMPTS);
        let mut watcher = watcher(site.path(), 3, &[], backend);

        let summary = watcher.rebuild().unwrap();

        assert_eq!(summary.attempts, MAX_RESCAN_ATTEMPTS);
        assert!(!watcher.is_watching(&site.path().join("a.html")));
        assert!(watcher.is_watching(&site.path().join("css/site.css")));
    }

    #[test]
    fn test_rebuild_handle_exhaustion_is_fatal() {
        let site = create_site();
        let backend = MockBackend::new().with_limit(3);
        let observer = backend.clone();
        let mut watcher = watcher(site.path(), 3, &[], backend);

        let err = watcher.rebuild().unwrap_err();

        assert!(matches!(
            err,
            WatchError::TooManyWatches {
                max_depth: 3,
                watched: 3,
                ..
            }
        ));
        assert!(observer.watched().is_empty());
        assert!(watcher.nodes().is_empty());
    }

    #[test]
    fn test_rebuild_missing_root() {
        let site = create_site();
        let root = site.path().join("missing");
        let mut watcher = watcher(&root, 3, &[], MockBackend::new());

        let err = watcher.rebuild().unwrap_err();

        assert!(matches!(err, WatchError::RootMissing(_)));
    }

    #[test]
    fn test_close_all_releases_every_handle() {
        let site = create_site();
        let backend = MockBackend::new();
        let observer = backend.clone();
        let mut watcher = watcher(site.path(), 3, &[], backend);
        watcher.rebuild().unwrap();

        watcher.close_all();

        assert!(observer.watched().is_empty());
        assert!(watcher.nodes().is_empty());
    }

    #[test]
    fn test_drop_releases_handles() {
        let site = create_site();
        let backend = MockBackend::new();
        let observer = backend.clone();
        let mut watcher = watcher(site.path(), 3, &[], backend);
        watcher.rebuild().unwrap();

        drop(watcher);

        assert!(observer.watched().is_empty());
    }

    #[test]
    fn test_node_depths() {
        let site = create_site();
        let mut watcher = watcher(site.path(), 3, &[], MockBackend::new());
        watcher.rebuild().unwrap();

        let depth_of = |rel: &str| {
            let path = site.path().join(rel);
            watcher.nodes().iter().find(|n| n.path == path).map(|n| n.depth)
        };

        assert_eq!(depth_of("a.html"), Some(1));
        assert_eq!(depth_of("one/two"), Some(2));
        assert_eq!(depth_of("one/two/three/deep.html"), Some(4));
    }

    #[test]
    fn test_rebuild_with_notify_backend() {
        let site = create_site();
        let filter = PathFilter::new(
            site.path().to_path_buf(),
            vec!["html".to_owned()],
            Vec::new(),
        );
        let backend = crate::backend::notify_backend(filter.clone(), |_| {}).unwrap();
        let mut watcher = TreeWatcher::new(
            backend,
            WatchOptions {
                root: site.path().to_path_buf(),
                max_depth: 3,
                filter,
            },
        );

        let summary = watcher.rebuild().unwrap();

        assert_eq!(summary.files, 2);
        assert!(watcher.is_watching(&site.path().join("a.html")));
    }
}
