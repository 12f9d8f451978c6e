//! Tree watching for the devloop development server.
//!
//! This crate owns every filesystem watch handle the server holds. A
//! [`TreeWatcher`] scans a root directory depth-first up to a configured
//! depth and opens one handle per directory and per tracked file. The watch
//! set is never patched incrementally: any structural change is answered by
//! closing every handle and rescanning from scratch.
//!
//! # Architecture
//!
//! The crate provides:
//! - [`TreeWatcher`] with `rebuild()` and `close_all()`
//! - [`WatchBackend`] trait abstracting handle registration, implemented for
//!   [`notify::RecommendedWatcher`]
//! - [`PathFilter`] and [`ExclusionSet`] pure predicates shared by the scan
//!   and the event classifier
//! - [`MockBackend`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use devloop_watch::{PathFilter, TreeWatcher, WatchOptions, notify_backend};
//!
//! let filter = PathFilter::new(root.clone(), vec!["html".into()], vec![]);
//! let backend = notify_backend(filter.clone(), |event| println!("{event:?}"))?;
//! let mut watcher = TreeWatcher::new(backend, WatchOptions { root, max_depth: 3, filter });
//! watcher.rebuild()?;
//! ```

mod backend;
mod error;
mod event;
mod filter;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod tree;

pub use backend::{WatchBackend, notify_backend};
pub use error::WatchError;
pub use event::{ChangeKind, WatchEvent};
pub use filter::{ExclusionSet, PathFilter, has_tracked_extension};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockBackend;
pub use tree::{NodeKind, RebuildSummary, TreeWatcher, WatchNode, WatchOptions};
