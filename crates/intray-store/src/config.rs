// ABOUTME: Storage configuration loaded from a pluggable key/value source.
// ABOUTME: EnvConfig reads INTRAY_* environment variables; MapConfig backs tests and embedding callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dual::{DEFAULT_SAMPLE_SIZE, DualWriterOptions, ReadBackend};
use crate::effects::HookFailureMode;
use crate::error::StorageError;
use crate::factory::Backend;
use crate::lock::LockOptions;
use crate::sqlite::DEFAULT_BUSY_TIMEOUT;

pub const TSV_FILE_NAME: &str = "notifications.tsv";
pub const SQLITE_FILE_NAME: &str = "notifications.db";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown storage backend '{0}', must be one of: tsv, sqlite, dual")]
    UnknownBackend(String),

    #[error("unknown dual read backend '{0}', must be one of: tsv, sqlite")]
    UnknownReadBackend(String),

    #[error("unknown hook failure mode '{0}', must be one of: abort, warn, ignore")]
    UnknownFailureMode(String),

    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidInteger { key: String, value: String },
}

impl From<ConfigError> for StorageError {
    fn from(err: ConfigError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

/// Source of raw configuration values keyed by lowercase names such as
/// `storage_backend`.
pub trait ConfigSource {
    fn lookup(&self, key: &str) -> Option<String>;

    fn get(&self, key: &str, default: &str) -> String {
        self.lookup(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.lookup(key) {
            Some(v) => matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
            None => default,
        }
    }

    fn get_int(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidInteger {
                key: key.to_string(),
                value: v,
            }),
            None => Ok(default),
        }
    }
}

/// Reads `INTRAY_<KEY>` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(format!("INTRAY_{}", key.to_ascii_uppercase())).ok()
    }
}

/// In-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

impl ConfigSource for MapConfig {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
    pub backend: Backend,
    pub dual: DualWriterOptions,
    pub hooks_failure_mode: HookFailureMode,
    pub lock: LockOptions,
    pub sqlite_busy_timeout: Duration,
}

fn default_state_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".local")
        .join("state")
        .join("intray")
}

impl StorageConfig {
    /// Load configuration with defaults for every missing key.
    ///
    /// Keys:
    /// - state_dir: data directory (default: ~/.local/state/intray)
    /// - storage_backend: tsv, sqlite or dual (default: tsv)
    /// - dual_read_backend: tsv or sqlite (default: sqlite)
    /// - dual_verify_only: write the flat file only (default: false)
    /// - dual_sample_size: records diffed per audit (default: 25)
    /// - dual_verify_every_n_writes: audit interval, 0 disables (default: 0)
    /// - hooks_failure_mode: abort, warn or ignore (default: abort)
    /// - lock_timeout_ms / lock_retry_ms: flat-file lock (default: 10000 / 100)
    /// - sqlite_busy_timeout_ms: SQLite busy timeout (default: 5000)
    pub fn load(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let state_dir = source
            .lookup("state_dir")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let backend: Backend = source.get("storage_backend", "tsv").parse()?;

        let read_raw = source.get("dual_read_backend", "sqlite");
        let read_backend: ReadBackend = read_raw
            .parse()
            .map_err(ConfigError::UnknownReadBackend)?;

        let failure_raw = source.get("hooks_failure_mode", "abort");
        let hooks_failure_mode: HookFailureMode = failure_raw
            .parse()
            .map_err(ConfigError::UnknownFailureMode)?;

        let sample_size = source.get_int("dual_sample_size", DEFAULT_SAMPLE_SIZE as u64)?;
        let defaults = LockOptions::default();
        let lock = LockOptions {
            timeout: Duration::from_millis(
                source.get_int("lock_timeout_ms", defaults.timeout.as_millis() as u64)?,
            ),
            retry: Duration::from_millis(
                source.get_int("lock_retry_ms", defaults.retry.as_millis() as u64)?,
            ),
        };

        Ok(Self {
            state_dir,
            backend,
            dual: DualWriterOptions {
                read_backend,
                verify_only: source.get_bool("dual_verify_only", false),
                sample_size: usize::try_from(sample_size).unwrap_or(usize::MAX),
                verify_every_n_writes: source.get_int("dual_verify_every_n_writes", 0)?,
            },
            hooks_failure_mode,
            lock,
            sqlite_busy_timeout: Duration::from_millis(source.get_int(
                "sqlite_busy_timeout_ms",
                DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            )?),
        })
    }

    /// Defaults rooted at an explicit state directory.
    pub fn in_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            backend: Backend::Tsv,
            dual: DualWriterOptions::default(),
            hooks_failure_mode: HookFailureMode::default(),
            lock: LockOptions::default(),
            sqlite_busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn tsv_path(&self) -> PathBuf {
        self.state_dir.join(TSV_FILE_NAME)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.state_dir.join(SQLITE_FILE_NAME)
    }
}
