//! Live reload server for devloop.
//!
//! This crate serves a directory tree over HTTP and keeps connected
//! browsers in sync with it:
//! - Static files from the watch root, with the reload client injected into HTML
//! - WebSocket control channel at `/__devloop/ws`
//! - Debounced rebuild and reload when watched files change
//! - Navigation mirroring from the boss browser to remote browsers
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use devloop_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root: PathBuf::from("site"),
//!         build_command: Some("make".to_owned()),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router
//!    ▲                  │
//!    │                  ├─► static files ──(boss visit)──┐
//!    │                  │                                 ▼
//!    └────WebSocket─────┴─► socket task ───────────► Coordinator ◄── notify
//!                                                     │
//!                                                     ├─► TreeWatcher
//!                                                     ├─► build command
//!                                                     └─► broadcast to sessions
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;
mod proxy;
mod state;
mod static_files;

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use devloop_watch::{PathFilter, TreeWatcher, WatchOptions, notify_backend};
use live_reload::{Coordinator, CoordinatorSettings, Event};
use proxy::Proxy;
use state::AppState;

pub use error::ServerError;
pub use live_reload::BuildOutcome;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origin that requests for missing files are forwarded to.
    pub proxy: Option<String>,
    /// Directory to serve and watch.
    pub root: PathBuf,
    /// Deepest directory level that gets a watch handle.
    pub depth: usize,
    /// Tracked file extensions, without dot.
    pub extensions: Vec<String>,
    /// Path substrings excluded from watching.
    pub exclude: Vec<String>,
    /// Substring identifying the boss browser's address.
    pub boss_address: String,
    /// Minimum spacing between reloads.
    pub delay: Duration,
    /// Settle window after the latest change.
    pub jitter: Duration,
    /// Command run before each reload.
    pub build_command: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8888,
            proxy: None,
            root: PathBuf::from("."),
            depth: 5,
            extensions: vec!["html".to_owned(), "css".to_owned(), "js".to_owned()],
            exclude: Vec::new(),
            boss_address: "127.0.0.1".to_owned(),
            delay: Duration::from_millis(3000),
            jitter: Duration::from_millis(50),
            build_command: None,
        }
    }
}

impl ServerConfig {
    fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ServerError::InvalidAddress {
                address: format!("{}:{}", self.host, self.port),
                source,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Run the server.
///
/// Binds the listener, performs the initial scan and serves until Ctrl-C or
/// until the watcher fails fatally.
///
/// # Errors
///
/// Returns an error if the address cannot be bound, the root cannot be
/// watched, or serving fails.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let root = config
        .root
        .canonicalize()
        .map_err(|source| ServerError::Root {
            path: config.root.clone(),
            source,
        })?;

    // Bind first so a port conflict fails before any watch handle is opened
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    let filter = PathFilter::new(root.clone(), config.extensions.clone(), config.exclude.clone());
    let (tx, rx) = live_reload::channel();
    let sink = tx.clone();
    let backend = notify_backend(filter.clone(), move |event| {
        // Receiver gone means shutdown
        let _ = sink.send(Event::from(event));
    })?;
    let watcher = TreeWatcher::new(
        backend,
        WatchOptions {
            root: root.clone(),
            max_depth: config.depth,
            filter,
        },
    );

    let coordinator = Coordinator::new(
        watcher,
        CoordinatorSettings {
            delay: config.delay,
            jitter: config.jitter,
            boss_address: config.boss_address.clone(),
            build_command: config.build_command.clone(),
        },
        tx,
        rx,
    );
    coordinator.initialize().await?;
    let handle = coordinator.handle();
    let mut coordinator_task = tokio::spawn(coordinator.run());

    let proxy = config.proxy.as_deref().map(Proxy::new);
    if let Some(proxy) = &proxy {
        tracing::info!(origin = %proxy.origin(), "Forwarding missing files upstream");
    }

    let state = Arc::new(AppState {
        root,
        boss_address: config.boss_address,
        coordinator: handle.clone(),
        proxy,
    });
    let app = app::create_router(state);

    tracing::info!(address = %addr, "Starting server");
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .into_future();

    let server_stopped = tokio::select! {
        result = server => {
            result?;
            true
        }
        result = &mut coordinator_task => {
            result??;
            false
        }
    };

    if server_stopped {
        handle.shutdown();
        coordinator_task.await??;
    } else {
        tracing::info!("Coordinator stopped, shutting down server");
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from devloop config.
#[must_use]
pub fn server_config_from_config(config: &devloop_config::Config) -> ServerConfig {
    let watch = &config.watch_resolved;
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        proxy: config.server.proxy.clone(),
        root: watch.root.clone(),
        depth: watch.depth,
        extensions: watch.extensions.clone(),
        exclude: watch.exclude.clone(),
        boss_address: config.reload.boss_address.clone(),
        delay: config.reload.delay(),
        jitter: config.reload.jitter(),
        build_command: config.build.command.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_socket_addr_ipv4_and_ipv6() {
        let v4 = ServerConfig {
            host: "127.0.0.1".to_owned(),
            ..ServerConfig::default()
        };
        let v6 = ServerConfig {
            host: "::1".to_owned(),
            port: 9000,
            ..ServerConfig::default()
        };

        assert_eq!(v4.socket_addr().unwrap().to_string(), "127.0.0.1:8888");
        assert_eq!(v6.socket_addr().unwrap().to_string(), "[::1]:9000");
    }

    #[test]
    fn test_socket_addr_rejects_hostname() {
        let config = ServerConfig {
            host: "not an ip".to_owned(),
            ..ServerConfig::default()
        };

        assert!(matches!(
            config.socket_addr(),
            Err(ServerError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_server_config_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("devloop.toml"),
            "[server]\nproxy = \"http://localhost:3000\"\n\n[reload]\ndelay_ms = 500\n\n[build]\ncommand = \"make\"\n",
        )
        .unwrap();
        let config = devloop_config::Config::load(
            Some(&dir.path().join("devloop.toml")),
            None,
        )
        .unwrap();

        let server = server_config_from_config(&config);

        assert_eq!(server.delay, Duration::from_millis(500));
        assert_eq!(server.jitter, Duration::from_millis(50));
        assert_eq!(server.build_command.as_deref(), Some("make"));
        assert_eq!(server.proxy.as_deref(), Some("http://localhost:3000"));
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.root, dir.path().join("."));
    }

    #[tokio::test]
    async fn test_port_conflict_is_bind_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".to_owned(),
            root: dir.path().to_path_buf(),
            port: taken.local_addr().unwrap().port(),
            ..ServerConfig::default()
        };

        let err = run_server(config).await.unwrap_err();

        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_missing_root_is_reported() {
        let config = ServerConfig {
            root: PathBuf::from("/definitely/not/here"),
            ..ServerConfig::default()
        };

        assert!(matches!(
            run_server(config).await,
            Err(ServerError::Root { .. })
        ));
    }
}
