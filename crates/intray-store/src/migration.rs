// ABOUTME: One-shot import of the flat-file log into a SQLite database, plus rollback.
// ABOUTME: Backs up the flat file first, skips malformed lines with warnings and upserts in one transaction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::effects::Effects;
use crate::error::StorageError;
use crate::sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteStore};
use crate::tsv::{read_seq_file, scan_log, seq_path};

pub const BACKUP_SUFFIX: &str = ".sqlite-migration.bak";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{0} path cannot be empty")]
    MissingPath(&'static str),

    #[error("backup already exists at {}", .0.display())]
    BackupExists(PathBuf),

    #[error("importing {rows} rows failed: {source}")]
    ImportFailed {
        rows: usize,
        #[source]
        source: StorageError,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<MigrationError> for StorageError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Io(e) => StorageError::Io(e),
            other => StorageError::Migration(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub tsv_path: PathBuf,
    pub sqlite_path: PathBuf,
    /// Defaults to the flat file path plus [`BACKUP_SUFFIX`].
    pub backup_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl MigrationOptions {
    pub fn new(tsv_path: &Path, sqlite_path: &Path) -> Self {
        Self {
            tsv_path: tsv_path.to_path_buf(),
            sqlite_path: sqlite_path.to_path_buf(),
            backup_path: None,
            dry_run: false,
        }
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| default_backup_path(&self.tsv_path))
    }
}

pub fn default_backup_path(tsv_path: &Path) -> PathBuf {
    let mut name = tsv_path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Summary of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MigrationStats {
    /// Non-blank lines scanned.
    pub total_rows: usize,
    /// Distinct ids imported (or that would be, on a dry run).
    pub migrated_rows: usize,
    pub skipped_rows: usize,
    /// Valid lines superseded by a later line for the same id.
    pub duplicate_rows: usize,
    /// Id high-water mark carried over, covering deleted and malformed rows.
    pub high_water_id: u64,
    pub backup_created: bool,
    pub backup_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

fn require_path(path: &Path, name: &'static str) -> Result<(), MigrationError> {
    if path.as_os_str().is_empty() {
        return Err(MigrationError::MissingPath(name));
    }
    Ok(())
}

/// Remove a SQLite database together with its WAL sidecars.
pub(crate) fn remove_database(sqlite_path: &Path) -> io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = sqlite_path.as_os_str().to_owned();
        name.push(suffix);
        match fs::remove_file(PathBuf::from(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Import the latest valid row per id from the flat file into SQLite.
///
/// 1. Scan the flat file, skipping malformed lines with a warning.
/// 2. On a dry run, stop and report counts.
/// 3. Refuse if a backup already exists, otherwise copy the flat file there.
/// 4. Upsert every resolved row and the id high-water mark in a single
///    transaction.
///
/// A failed import removes the backup and any database this run created,
/// leaving the flat file untouched. Import is an upsert by id, so running it
/// twice yields the same rows.
pub fn migrate_tsv_to_sqlite(options: &MigrationOptions) -> Result<MigrationStats, MigrationError> {
    require_path(&options.tsv_path, "tsv")?;
    require_path(&options.sqlite_path, "sqlite")?;

    let scan = scan_log(&fs::read_to_string(&options.tsv_path)?);
    let high_water_id = scan.max_id.max(read_seq_file(&seq_path(&options.tsv_path))?);
    let mut stats = MigrationStats {
        total_rows: scan.total,
        high_water_id,
        skipped_rows: scan.skipped.len(),
        duplicate_rows: scan.duplicates,
        warnings: scan
            .skipped
            .iter()
            .map(|(line, reason)| format!("line {}: {}", line, reason))
            .collect(),
        ..MigrationStats::default()
    };
    for warning in &stats.warnings {
        tracing::warn!(file = %options.tsv_path.display(), "{}", warning);
    }
    let rows: Vec<_> = scan.rows.into_values().collect();

    if options.dry_run {
        stats.migrated_rows = rows.len();
        return Ok(stats);
    }

    let backup_path = options.backup_path();
    if backup_path.exists() {
        return Err(MigrationError::BackupExists(backup_path));
    }
    if let Some(parent) = backup_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&options.tsv_path, &backup_path)?;
    stats.backup_created = true;
    stats.backup_path = Some(backup_path.clone());

    let db_existed = options.sqlite_path.exists();
    let imported = SqliteStore::open(&options.sqlite_path, DEFAULT_BUSY_TIMEOUT, Effects::none())
        .and_then(|store| store.import_with_high_water(&rows, high_water_id));

    match imported {
        Ok(count) => {
            stats.migrated_rows = count;
            tracing::info!(
                migrated = stats.migrated_rows,
                skipped = stats.skipped_rows,
                duplicates = stats.duplicate_rows,
                high_water = stats.high_water_id,
                backup = %backup_path.display(),
                "migrated flat file to sqlite"
            );
            Ok(stats)
        }
        Err(e) => {
            tracing::warn!(error = %e, rows = rows.len(), "sqlite import failed");
            if !db_existed && let Err(cleanup) = remove_database(&options.sqlite_path) {
                tracing::error!(error = %cleanup, "failed to remove partial sqlite database");
            }
            if let Err(cleanup) = fs::remove_file(&backup_path) {
                tracing::error!(error = %cleanup, backup = %backup_path.display(), "failed to remove migration backup");
            }
            Err(MigrationError::ImportFailed {
                rows: rows.len(),
                source: e,
            })
        }
    }
}

/// Restore the flat file from its pre-migration backup and delete the
/// SQLite database. The backup itself is left in place.
pub fn rollback_migration(
    tsv_path: &Path,
    sqlite_path: &Path,
    backup_path: Option<&Path>,
) -> Result<(), MigrationError> {
    require_path(tsv_path, "tsv")?;
    require_path(sqlite_path, "sqlite")?;
    let backup_path = backup_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(tsv_path));

    let data = fs::read(&backup_path)?;
    if let Some(parent) = tsv_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(tsv_path, data)?;
    remove_database(sqlite_path)?;

    tracing::info!(
        tsv = %tsv_path.display(),
        backup = %backup_path.display(),
        "rolled back sqlite migration"
    );
    Ok(())
}
