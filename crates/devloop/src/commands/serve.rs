//! `devloop serve` command implementation.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;
use devloop_config::{CliSettings, Config};
use devloop_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover devloop.toml).
    #[arg(short, long, env = "DEVLOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to serve and watch (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Site to fetch missing files from, e.g. `http://localhost:3000` (overrides config).
    #[arg(short = 'x', long, value_name = "ORIGIN")]
    proxy: Option<String>,

    /// Deepest directory level to watch (overrides config).
    #[arg(long)]
    depth: Option<usize>,

    /// Exclude paths containing this substring (repeatable, overrides config).
    #[arg(long)]
    exclude: Option<Vec<String>>,

    /// Tracked file extensions, comma separated (overrides config).
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Address substring identifying the boss browser (overrides config).
    #[arg(long)]
    boss_address: Option<String>,

    /// Minimum milliseconds between reloads (overrides config).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Milliseconds to wait for changes to settle (overrides config).
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Command to run before each reload (overrides config).
    #[arg(long, value_name = "CMD")]
    build: Option<String>,

    /// Skip the build command from config.
    #[arg(long, conflicts_with = "build")]
    no_build: bool,

    /// Enable verbose output (log every rebuild and reload).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config_path = self.config.clone();
        let config = Config::load(config_path.as_deref(), Some(&self.into_settings()))?;

        print_summary(&output, &config);
        tracing::info!(
            root = %config.watch_resolved.root.display(),
            config = ?config.config_path,
            "Starting devloop"
        );

        run_server(server_config_from_config(&config)).await?;
        Ok(())
    }

    fn into_settings(self) -> CliSettings {
        CliSettings {
            host: self.host,
            port: self.port,
            proxy: self.proxy,
            root: self.root,
            depth: self.depth,
            extensions: self.extensions,
            exclude: self.exclude,
            boss_address: self.boss_address,
            delay_ms: self.delay_ms,
            jitter_ms: self.jitter_ms,
            build_command: self.build,
            build_enabled: self.no_build.then_some(false),
        }
    }
}

fn print_summary(output: &Output, config: &Config) {
    let watch = &config.watch_resolved;

    output.serving(&format!(
        "http://{}:{}/",
        browse_host(&config.server.host),
        config.server.port
    ));
    output.field("root", &watch.root.display().to_string());
    output.field("depth", &watch.depth.to_string());
    output.field("extensions", &watch.extensions.join(", "));
    if !watch.exclude.is_empty() {
        output.field("exclude", &watch.exclude.join(", "));
    }
    output.field(
        "reload",
        &format!(
            "every {} ms at most, after {} ms quiet",
            config.reload.delay_ms, config.reload.jitter_ms
        ),
    );
    output.field("boss", &config.reload.boss_address);
    if let Some(proxy) = &config.server.proxy {
        output.field("proxy", proxy);
    }
    output.field(
        "build",
        config.build.command.as_deref().unwrap_or("(none)"),
    );

    if is_loopback(&config.server.host) {
        output.warning("Bound to a loopback address: remote browsers cannot connect.");
    }
}

/// Host to show in the URL; a wildcard bind is reachable via localhost.
fn browse_host(host: &str) -> &str {
    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => "localhost",
        _ => host,
    }
}

fn is_loopback(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
