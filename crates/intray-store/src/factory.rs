// ABOUTME: Selects and opens the configured storage backend.
// ABOUTME: Runs the one-time flat-file to SQLite migration when a cold SQLite backend is first selected.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{ConfigError, StorageConfig};
use crate::dual::DualWriter;
use crate::effects::Effects;
use crate::error::StorageError;
use crate::migration::{MigrationError, MigrationOptions, MigrationStats, migrate_tsv_to_sqlite};
use crate::sqlite::SqliteStore;
use crate::store::NotificationStore;
use crate::tsv::{TsvStore, seq_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Tsv,
    Sqlite,
    Dual,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tsv => "tsv",
            Self::Sqlite => "sqlite",
            Self::Dual => "dual",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    /// Case-insensitive; an empty name selects the flat file.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tsv" => Ok(Self::Tsv),
            "sqlite" => Ok(Self::Sqlite),
            "dual" => Ok(Self::Dual),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

fn has_content(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(io::Error::other(format!(
            "expected file but found directory: {}",
            path.display()
        ))),
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Migrate the flat file into SQLite if the database does not exist yet and
/// the flat file has data or has issued ids. The flat file is never
/// rewritten here; a failed import cleans up after itself and leaves it as
/// the live store.
pub fn migrate_if_needed(
    tsv_path: &Path,
    sqlite_path: &Path,
) -> Result<Option<MigrationStats>, MigrationError> {
    if sqlite_path.exists() {
        return Ok(None);
    }
    if !has_content(tsv_path)? && !has_content(&seq_path(tsv_path))? {
        return Ok(None);
    }

    tracing::info!(tsv = %tsv_path.display(), "detected flat-file notifications, migrating to sqlite");
    migrate_tsv_to_sqlite(&MigrationOptions::new(tsv_path, sqlite_path)).map(Some)
}

fn open_tsv(config: &StorageConfig, effects: Effects) -> Result<TsvStore, StorageError> {
    TsvStore::open(&config.tsv_path(), config.lock, effects)
}

fn open_sqlite_or_fallback(
    config: &StorageConfig,
    effects: Effects,
) -> Result<Box<dyn NotificationStore>, StorageError> {
    let tsv_path = config.tsv_path();
    let sqlite_path = config.sqlite_path();

    if let Err(e) = migrate_if_needed(&tsv_path, &sqlite_path) {
        tracing::warn!(error = %e, "sqlite migration failed, using flat file storage");
        return Ok(Box::new(open_tsv(config, effects)?));
    }

    match SqliteStore::open(&sqlite_path, config.sqlite_busy_timeout, effects.clone()) {
        Ok(store) => Ok(Box::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, "could not open sqlite store, using flat file storage");
            Ok(Box::new(open_tsv(config, effects)?))
        }
    }
}

/// Build a dual writer. Only the flat-file side carries `effects`, so
/// hooks and status publishing happen once per operation.
pub fn open_dual_writer(config: &StorageConfig, effects: Effects) -> Result<DualWriter, StorageError> {
    let tsv = Arc::new(open_tsv(config, effects)?);
    let sqlite = Arc::new(SqliteStore::open(
        &config.sqlite_path(),
        config.sqlite_busy_timeout,
        Effects::none(),
    )?);
    Ok(DualWriter::new(tsv, sqlite, config.dual.clone()))
}

/// Open the backend selected by `config.backend`.
pub fn open_backend(
    config: &StorageConfig,
    effects: Effects,
) -> Result<Box<dyn NotificationStore>, StorageError> {
    tracing::info!(backend = %config.backend, state_dir = %config.state_dir.display(), "opening storage");
    match config.backend {
        Backend::Tsv => Ok(Box::new(open_tsv(config, effects)?)),
        Backend::Sqlite => open_sqlite_or_fallback(config, effects),
        Backend::Dual => Ok(Box::new(open_dual_writer(config, effects)?)),
    }
}
