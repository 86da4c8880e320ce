//! Configuration for the `dailydone` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/dailydone/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actions::{ActionEndpoints, Endpoint};
use crate::http::DEFAULT_TIMEOUT;
use crate::sync::filter::{DEFAULT_PAGE_SIZE, SortKey};
use crate::sync::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_POLL_INTERVAL, ListSource, SyncConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    sync: SyncFileConfig,
    endpoints: EndpointsFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    base_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
    request_timeout_ms: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    poll_interval_secs: Option<u64>,
    failure_threshold: Option<u32>,
    page_size: Option<usize>,
    timestamp_format: Option<String>,
}

/// `[endpoints]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EndpointsFileConfig {
    available: Option<String>,
    helper: Option<String>,
    poster: Option<String>,
    accept: Option<String>,
    cancel: Option<String>,
    complete: Option<String>,
    rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Backend list paths per dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEndpoints {
    /// Open errands any helper can take.
    pub available: String,
    /// Errands the signed-in helper has accepted.
    pub helper: String,
    /// Errands the signed-in user has posted.
    pub poster: String,
}

impl Default for ListEndpoints {
    fn default() -> Self {
        Self {
            available: "errands/available".to_string(),
            helper: "errands/helper".to_string(),
            poster: "errands/poster".to_string(),
        }
    }
}

/// Which dashboard list to sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ListKind {
    /// Open errands.
    #[default]
    Available,
    /// Errands accepted by the signed-in helper.
    Helper,
    /// Errands posted by the signed-in user.
    Poster,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// Backend base URL.
    pub base_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Signed-in user id, sent with the helper and poster lists.
    pub user_id: Option<String>,
    /// Default per-request timeout.
    pub request_timeout: Duration,

    // -- Sync --
    /// Poll interval and failure threshold.
    pub sync: SyncConfig,
    /// Default page size.
    pub page_size: usize,
    /// Timestamp display format (chrono).
    pub timestamp_format: String,

    // -- Endpoints --
    /// List paths.
    pub lists: ListEndpoints,
    /// Action verbs and paths.
    pub actions: ActionEndpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            user_id: None,
            request_timeout: DEFAULT_TIMEOUT,
            sync: SyncConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            timestamp_format: "%Y-%m-%d %H:%M".to_string(),
            lists: ListEndpoints::default(),
            actions: ActionEndpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path
    /// (`~/.config/dailydone/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Configuration from CLI arguments and environment variables alone.
    ///
    /// Used when the config file cannot be loaded, so flags such as
    /// `--token` still apply.
    #[must_use]
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self::resolve(cli, &ConfigFile::default())
    }

    /// Priority: CLI > file > default. Poll intervals are at least one
    /// second and the failure threshold at least one.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let endpoint = |configured: Option<&str>, default: Endpoint| match configured {
            Some(path) => Endpoint::new(default.method, path),
            None => default,
        };

        Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.api.base_url.clone())
                .unwrap_or(defaults.base_url),
            token: cli
                .token
                .clone()
                .or_else(|| file.api.token.clone())
                .filter(|t| !t.trim().is_empty()),
            user_id: cli.user_id.clone().or_else(|| file.api.user_id.clone()),
            request_timeout: file
                .api
                .request_timeout_ms
                .map_or(defaults.request_timeout, Duration::from_millis),
            sync: SyncConfig {
                poll_interval: cli
                    .poll_interval_secs
                    .or(file.sync.poll_interval_secs)
                    .map_or(DEFAULT_POLL_INTERVAL, |secs| Duration::from_secs(secs.max(1))),
                failure_threshold: file
                    .sync
                    .failure_threshold
                    .unwrap_or(DEFAULT_FAILURE_THRESHOLD)
                    .max(1),
            },
            page_size: file.sync.page_size.unwrap_or(defaults.page_size).max(1),
            timestamp_format: file
                .sync
                .timestamp_format
                .clone()
                .unwrap_or(defaults.timestamp_format),
            lists: ListEndpoints {
                available: file
                    .endpoints
                    .available
                    .clone()
                    .unwrap_or(defaults.lists.available),
                helper: file
                    .endpoints
                    .helper
                    .clone()
                    .unwrap_or(defaults.lists.helper),
                poster: file
                    .endpoints
                    .poster
                    .clone()
                    .unwrap_or(defaults.lists.poster),
            },
            actions: ActionEndpoints {
                accept: endpoint(file.endpoints.accept.as_deref(), defaults.actions.accept),
                cancel: endpoint(file.endpoints.cancel.as_deref(), defaults.actions.cancel),
                complete: endpoint(file.endpoints.complete.as_deref(), defaults.actions.complete),
                rate: endpoint(file.endpoints.rate.as_deref(), defaults.actions.rate),
            },
        }
    }

    /// The backend list to poll for `kind`.
    ///
    /// The helper and poster lists carry the signed-in user id when one is
    /// configured.
    #[must_use]
    pub fn list_source(&self, kind: ListKind) -> ListSource {
        let path = match kind {
            ListKind::Available => &self.lists.available,
            ListKind::Helper => &self.lists.helper,
            ListKind::Poster => &self.lists.poster,
        };
        let source = ListSource::new(path.as_str());
        match (&self.user_id, kind) {
            (Some(user_id), ListKind::Helper | ListKind::Poster) => {
                source.with_query(crate::actions::USER_ID_PARAM, user_id.as_str())
            }
            _ => source,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "DailyDone errand lists and actions from the terminal")]
pub struct CliArgs {
    /// Backend base URL.
    #[arg(long, env = "DAILYDONE_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token.
    #[arg(long, env = "DAILYDONE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Signed-in user id (used by the helper and poster lists).
    #[arg(long, env = "DAILYDONE_USER_ID")]
    pub user_id: Option<String>,

    /// Seconds between polls in watch mode.
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Path to config file (default: `~/.config/dailydone/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DAILYDONE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/dailydone.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show a page of errands.
    List(ListArgs),
    /// Accept an errand.
    Accept {
        /// Errand id.
        id: String,
    },
    /// Cancel an errand.
    Cancel {
        /// Errand id.
        id: String,
    },
    /// Mark an errand completed.
    Complete {
        /// Errand id.
        id: String,
        /// Poster user id; looked up from the poster list when omitted.
        #[arg(long)]
        poster: Option<String>,
    },
    /// Rate a user from 0 to 5.
    Rate {
        /// The user being rated.
        user_id: String,
        /// Rating value.
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
}

/// Arguments of `list`.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Which list to show.
    #[arg(long, value_enum, default_value_t = ListKind::Available)]
    pub source: ListKind,

    /// Only errands with this status (aliases such as `open` or `done` work).
    #[arg(long)]
    pub status: Option<String>,

    /// Category filter (fuzzy, `all` disables it).
    #[arg(long)]
    pub category: Option<String>,

    /// Free-text search.
    #[arg(long)]
    pub search: Option<String>,

    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Errands per page (default from config).
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Sort order: newest, oldest, price-desc, price-asc, received.
    #[arg(long, default_value = "newest")]
    pub sort: SortKey,

    /// Keep polling and reprint the page after every refresh.
    #[arg(long)]
    pub watch: bool,

    /// Print the page as JSON.
    #[arg(long)]
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = explicit_path {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("dailydone").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
