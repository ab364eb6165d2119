// crates/sticky-assign-config/src/config.rs
// ============================================================================
// Module: Sticky Assign Configuration
// Description: Configuration loading and validation for Sticky Assign.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: sticky-assign-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is resolved in this order:
//!
//! 1. The explicit path passed by the caller (`--config`).
//! 2. The path in `STICKY_ASSIGN_CONFIG`.
//! 3. `sticky-assign.toml` in the working directory, when present.
//! 4. Built-in defaults.
//!
//! Deployment environment variables are applied on top of the file:
//! `PORT` rebinds the server to `0.0.0.0:<PORT>`, and
//! `ASSIGNMENTS_DATABASE_URL` (falling back to `DATABASE_URL`) replaces the
//! store path. Validation runs last.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use sticky_assign_store_sqlite::SqliteStoreConfig;
use sticky_assign_store_sqlite::SqliteStoreMode;
use sticky_assign_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "sticky-assign.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "STICKY_ASSIGN_CONFIG";
/// Environment variable carrying the listen port.
pub const PORT_ENV_VAR: &str = "PORT";
/// Preferred environment variable carrying the database location.
pub const ASSIGNMENTS_DATABASE_URL_ENV_VAR: &str = "ASSIGNMENTS_DATABASE_URL";
/// Fallback environment variable carrying the database location.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Hard upper bound for `server.max_body_bytes`.
pub const MAX_BODY_BYTES_LIMIT: usize = 1024 * 1024;
/// Hard upper bound for `store.read_pool_size`.
pub const MAX_READ_POOL_SIZE: usize = 64;
/// Scheme prefix accepted on database URLs.
const FILE_URL_PREFIX: &str = "file:";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Sticky Assign service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StickyAssignConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Assignment store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// File the configuration was read from, if any (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl StickyAssignConfig {
    /// Loads configuration using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration resolving environment variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, &lookup)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration file without applying overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Applies deployment environment variables on top of file values.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but malformed.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(port) = non_empty(PORT_ENV_VAR) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV_VAR} must be a port number")))?;
            self.server.bind = format!("0.0.0.0:{port}");
        }
        let database_url = non_empty(ASSIGNMENTS_DATABASE_URL_ENV_VAR)
            .or_else(|| non_empty(DATABASE_URL_ENV_VAR));
        if let Some(url) = database_url {
            self.store.path = database_path_from_url(&url)?;
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum identifier length in bytes, after trimming.
    #[serde(default = "default_max_identifier_bytes")]
    pub max_identifier_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            max_identifier_bytes: default_max_identifier_bytes(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_identifier_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_identifier_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `SQLite` assignment store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "sticky_assign_store_sqlite::store::default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Writer queue capacity.
    #[serde(default = "sticky_assign_store_sqlite::store::default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
    /// Number of read connections.
    #[serde(default = "sticky_assign_store_sqlite::store::default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let defaults = SqliteStoreConfig::for_path(default_store_path());
        Self::from(defaults)
    }
}

impl From<SqliteStoreConfig> for StoreConfig {
    fn from(config: SqliteStoreConfig) -> Self {
        Self {
            path: config.path,
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: config.journal_mode,
            sync_mode: config.sync_mode,
            writer_queue_capacity: config.writer_queue_capacity,
            read_pool_size: config.read_pool_size,
        }
    }
}

impl StoreConfig {
    /// Builds the `SQLite` store configuration.
    #[must_use]
    pub fn to_sqlite_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            writer_queue_capacity: self.writer_queue_capacity,
            read_pool_size: self.read_pool_size,
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.writer_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "store.writer_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "store.read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Returns the default bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Returns the default request body limit.
const fn default_max_body_bytes() -> usize {
    16 * 1024
}

/// Returns the default request deadline in milliseconds.
const fn default_request_timeout_ms() -> u64 {
    5_000
}

/// Returns the default identifier length limit.
const fn default_max_identifier_bytes() -> usize {
    128
}

/// Returns the default database path.
fn default_store_path() -> PathBuf {
    PathBuf::from("assignments.sqlite")
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller, the environment, or the default.
///
/// Returns `None` when nothing was requested and the default file is absent.
fn resolve_path(
    path: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR).filter(|value| !value.trim().is_empty()) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default_path.is_file().then_some(default_path))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Converts a database URL such as `file:./dev.db?mode=rwc` into a path.
///
/// # Errors
///
/// Returns [`ConfigError`] when the URL names no path.
pub fn database_path_from_url(url: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = url.trim();
    let without_scheme = trimmed.strip_prefix(FILE_URL_PREFIX).unwrap_or(trimmed);
    let without_query = without_scheme.split_once('?').map_or(without_scheme, |(path, _)| path);
    if without_query.is_empty() {
        return Err(ConfigError::Invalid("database url must name a file path".to_string()));
    }
    Ok(PathBuf::from(without_query))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
