//! Watch error types.

use std::path::PathBuf;

/// Fatal tree watcher error.
///
/// Only conditions that make correct continued watching impossible are
/// reported here. Entries vanishing mid-scan are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watch root does not exist or is not a directory.
    #[error("Watch root {} is not a directory", .0.display())]
    RootMissing(PathBuf),

    /// The OS refused to hand out more watch handles.
    #[error(
        "Too many watched paths: limit reached after {watched} handles while scanning depth \
         {at_depth} (max depth {max_depth}); use a shallower watch depth or stronger exclusions"
    )]
    TooManyWatches {
        /// Depth of the entry that could not be watched.
        at_depth: usize,
        /// Configured maximum depth.
        max_depth: usize,
        /// Handles open when the limit was hit.
        watched: usize,
    },

    /// Listing or inspecting an entry failed.
    #[error("Failed to scan {}: {source}", path.display())]
    Io {
        /// Entry being scanned.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The watch backend rejected a path.
    #[error("Failed to watch {}: {source}", path.display())]
    Backend {
        /// Entry being watched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: notify::Error,
    },
}
