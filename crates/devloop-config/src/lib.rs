//! Configuration management for devloop.
//!
//! Parses `devloop.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `server.proxy`
//! - `reload.boss_address`
//!
//! The build command is passed to the shell verbatim and is never expanded here.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the origin that missing files are fetched from.
    pub proxy: Option<String>,
    /// Override the served and watched root directory.
    pub root: Option<PathBuf>,
    /// Override the maximum watch depth.
    pub depth: Option<usize>,
    /// Override tracked file extensions.
    pub extensions: Option<Vec<String>>,
    /// Override exclusion substrings.
    pub exclude: Option<Vec<String>>,
    /// Override the boss address pattern.
    pub boss_address: Option<String>,
    /// Override the minimum refresh spacing in milliseconds.
    pub delay_ms: Option<u64>,
    /// Override the settle window in milliseconds.
    pub jitter_ms: Option<u64>,
    /// Override the build command.
    pub build_command: Option<String>,
    /// Enable or disable the build step (`Some(false)` drops any configured command).
    pub build_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "devloop.toml";

/// Deepest watch depth accepted by validation.
const MAX_DEPTH: usize = 64;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Watch configuration (root is a relative string from TOML).
    watch: WatchConfigRaw,
    /// Reload throttling and session classification.
    pub reload: ReloadConfig,
    /// Optional build step.
    pub build: BuildConfig,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Origin (`http://host:port`) that requests for missing files are forwarded to.
    pub proxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // Remote browsers on the network must be able to connect
            host: "0.0.0.0".to_owned(),
            port: 8888,
            proxy: None,
        }
    }
}

/// Raw watch configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    root: Option<String>,
    depth: Option<usize>,
    extensions: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

/// Resolved watch configuration with an absolute root.
#[derive(Debug)]
pub struct WatchConfig {
    /// Directory that is both served and watched.
    pub root: PathBuf,
    /// Maximum directory depth below the root that gets watched.
    pub depth: usize,
    /// Tracked file extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Exclusion substrings matched against root-relative paths.
    pub exclude: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            depth: 5,
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["html", "css", "js"].map(str::to_owned).to_vec()
}

/// Reload throttling configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Minimum spacing between two broadcasts of the same kind.
    pub delay_ms: u64,
    /// Settle window absorbing bursts of events.
    pub jitter_ms: u64,
    /// Address pattern identifying the boss browser.
    pub boss_address: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            jitter_ms: 50,
            boss_address: "127.0.0.1".to_owned(),
        }
    }
}

impl ReloadConfig {
    /// Minimum spacing as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Settle window as a [`Duration`].
    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Build step configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Shell command run before each refresh.
    pub command: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`DEV_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Strip leading dots and surrounding whitespace from extension entries.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_owned())
        .filter(|ext| !ext.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `devloop.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated once more.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(proxy) = &settings.proxy {
            self.server.proxy = Some(proxy.clone());
        }
        if let Some(root) = &settings.root {
            self.watch_resolved.root.clone_from(root);
        }
        if let Some(depth) = settings.depth {
            self.watch_resolved.depth = depth;
        }
        if let Some(extensions) = &settings.extensions {
            self.watch_resolved.extensions = normalize_extensions(extensions);
        }
        if let Some(exclude) = &settings.exclude {
            self.watch_resolved.exclude.clone_from(exclude);
        }
        if let Some(boss_address) = &settings.boss_address {
            self.reload.boss_address.clone_from(boss_address);
        }
        if let Some(delay_ms) = settings.delay_ms {
            self.reload.delay_ms = delay_ms;
        }
        if let Some(jitter_ms) = settings.jitter_ms {
            self.reload.jitter_ms = jitter_ms;
        }
        if let Some(command) = &settings.build_command {
            self.build.command = Some(command.clone());
        }
        if settings.build_enabled == Some(false) {
            self.build.command = None;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            watch: WatchConfigRaw::default(),
            reload: ReloadConfig::default(),
            build: BuildConfig::default(),
            watch_resolved: WatchConfig {
                root: base.to_path_buf(),
                ..WatchConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watch()?;
        self.validate_reload()?;
        self.validate_build()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but browsers
        // need a stable address to reconnect to after a restart
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        if let Some(proxy) = &self.server.proxy {
            require_non_empty(proxy, "server.proxy")?;
            if !(proxy.starts_with("http://") || proxy.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "server.proxy must be an http:// or https:// origin, got {proxy}"
                )));
            }
        }

        Ok(())
    }

    /// Validate watch configuration.
    fn validate_watch(&self) -> Result<(), ConfigError> {
        let depth = self.watch_resolved.depth;
        if depth == 0 {
            return Err(ConfigError::Validation(
                "watch.depth must be greater than 0".to_owned(),
            ));
        }
        if depth > MAX_DEPTH {
            return Err(ConfigError::Validation(format!(
                "watch.depth cannot exceed {MAX_DEPTH}"
            )));
        }

        if self.watch_resolved.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "watch.extensions must name at least one extension".to_owned(),
            ));
        }

        if self.watch_resolved.exclude.iter().any(String::is_empty) {
            // An empty substring matches every path
            return Err(ConfigError::Validation(
                "watch.exclude entries cannot be empty".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate reload configuration.
    fn validate_reload(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.reload.boss_address, "reload.boss_address")
    }

    /// Validate build configuration.
    fn validate_build(&self) -> Result<(), ConfigError> {
        if let Some(command) = &self.build.command {
            require_non_empty(command, "build.command")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(proxy) = &self.server.proxy {
            self.server.proxy = Some(expand::expand_env(proxy, "server.proxy")?);
        }
        self.reload.boss_address =
            expand::expand_env(&self.reload.boss_address, "reload.boss_address")?;
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = WatchConfig::default();

        self.watch_resolved = WatchConfig {
            root: config_dir.join(self.watch.root.as_deref().unwrap_or(".")),
            depth: self.watch.depth.unwrap_or(defaults.depth),
            extensions: self
                .watch
                .extensions
                .as_deref()
                .map_or(defaults.extensions, normalize_extensions),
            exclude: self.watch.exclude.clone().unwrap_or_default(),
        };
    }
}
