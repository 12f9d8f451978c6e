//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;

use crate::live_reload::CoordinatorHandle;
use crate::proxy::Proxy;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Canonical root of the served tree.
    pub(crate) root: PathBuf,
    /// Substring identifying the boss address.
    pub(crate) boss_address: String,
    /// Entry point into the live reload coordinator.
    pub(crate) coordinator: CoordinatorHandle,
    /// Upstream origin for paths missing from the root.
    pub(crate) proxy: Option<Proxy>,
}
