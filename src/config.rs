//! Configuration loading.
//!
//! Loads from `./draftsmith.toml` (or `$DRAFTSMITH_CONFIG_PATH`). A missing
//! file is fine; defaults cover everything except the API key, which lives in
//! credentials, not here.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Remote draft service settings (`[service]`).
    pub service: ServiceConfig,
    /// Filesystem paths for persistent state (`[paths]`).
    pub paths: PathsConfig,
    /// Logging settings (`[log]`).
    pub log: LogConfig,
}

impl DraftConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting base URL is not a valid URL.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: DraftConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(DraftConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Checks `$DRAFTSMITH_CONFIG_PATH` first, then `./draftsmith.toml`.
    fn config_path() -> PathBuf {
        Self::config_path_with(|key| std::env::var(key).ok())
    }

    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("DRAFTSMITH_CONFIG_PATH")
            .map_or_else(|| PathBuf::from("draftsmith.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("DRAFTSMITH_BASE_URL") {
            self.service.base_url = v;
        }
        if let Some(v) = env("DRAFTSMITH_SNAPSHOT_DB") {
            self.paths.snapshot_db = Some(v);
        }
        if let Some(v) = env("DRAFTSMITH_LOGS_DIR") {
            self.paths.logs_dir = Some(v);
        }
        if let Some(v) = env("DRAFTSMITH_LOG_LEVEL") {
            self.log.level = v;
        }
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.service.base_url).with_context(|| {
            format!("invalid service base URL: {}", self.service.base_url)
        })?;
        Ok(())
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: DraftConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

// ── Service config ──────────────────────────────────────────────

/// Remote draft service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the draft service; the chat path is appended to it.
    pub base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

// ── Paths config ────────────────────────────────────────────────

/// Filesystem paths for persistent state. Unset paths land under
/// `~/.draftsmith/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Snapshot SQLite database path.
    pub snapshot_db: Option<String>,
    /// Directory for rolling log files.
    pub logs_dir: Option<String>,
}

impl PathsConfig {
    /// Resolved snapshot database path.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn snapshot_db_path(&self) -> Result<PathBuf> {
        match &self.snapshot_db {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(data_dir()?.join("snapshots.db")),
        }
    }

    /// Resolved log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn logs_dir_path(&self) -> Result<PathBuf> {
        match &self.logs_dir {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(data_dir()?.join("logs")),
        }
    }
}

/// Resolve the default data directory (`~/.draftsmith/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(base.home_dir().join(".draftsmith"))
}

// ── Log config ──────────────────────────────────────────────────

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Tracing log level filter.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
