//! Server error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use devloop_watch::WatchError;

/// Fatal server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Host and port do not form a socket address.
    #[error("Invalid listen address {address}: {source}")]
    InvalidAddress {
        /// Rejected `host:port` string.
        address: String,
        /// Underlying error.
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listen address is already in use or not permitted.
    #[error("Failed to bind {addr}: {source}. Is another server already running on this port?")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The watch root could not be resolved.
    #[error("Failed to resolve watch root {}: {source}", path.display())]
    Root {
        /// Configured root.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Watching the tree became impossible.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Serving failed.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
