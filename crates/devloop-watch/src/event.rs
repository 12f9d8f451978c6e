//! Watch event types.
//!
//! Raw backend notifications are reduced to two kinds: content modifications
//! of tracked files, and structural changes (create, delete, rename) that
//! invalidate the watch set itself.

use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{CreateKind, ModifyKind, RemoveKind};

use crate::filter::PathFilter;

/// Kind of watch event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content of a tracked file changed in place.
    Modified,
    /// A path was created, removed or renamed.
    Structural,
}

/// A classified change below the watch root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// Absolute path reported by the backend.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl WatchEvent {
    /// Classify a raw notify event.
    ///
    /// Excluded paths are dropped. Content modifications only count for
    /// tracked files. Structural changes count for tracked files and for
    /// directories. When the backend does not say whether a path was a file
    /// or a folder, anything that is not an existing regular file counts: a
    /// removed or renamed-away directory can no longer be inspected.
    #[must_use]
    pub fn classify(event: &notify::Event, filter: &PathFilter) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
                ChangeKind::Structural
            }
            // Attribute changes accompany most writes; the data event follows
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(_) | EventKind::Any => ChangeKind::Modified,
            EventKind::Access(_) | EventKind::Other => return Vec::new(),
        };
        let entry = EntryKind::of(event.kind);

        event
            .paths
            .iter()
            .filter(|path| Self::is_relevant(path, kind, entry, filter))
            .map(|path| Self {
                path: path.clone(),
                kind,
            })
            .collect()
    }

    fn is_relevant(path: &Path, kind: ChangeKind, entry: EntryKind, filter: &PathFilter) -> bool {
        match kind {
            ChangeKind::Modified => filter.is_tracked(path),
            ChangeKind::Structural if filter.is_excluded(path) => false,
            ChangeKind::Structural => match entry {
                EntryKind::Folder => true,
                EntryKind::File => filter.is_tracked(path),
                EntryKind::Unknown => filter.is_tracked(path) || !path.is_file(),
            },
        }
    }
}

/// What the backend says the changed entry was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryKind {
    File,
    Folder,
    Unknown,
}

impl EntryKind {
    fn of(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
                Self::Folder
            }
            EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => Self::File,
            _ => Self::Unknown,
        }
    }
}
