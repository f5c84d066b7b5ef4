// ABOUTME: Error taxonomy shared by every storage backend.
// ABOUTME: StorageError::kind() flattens errors into ErrorKind so backends can be compared for parity.

use std::path::PathBuf;

use intray_core::ValidationError;
use thiserror::Error;

/// Errors surfaced by any `NotificationStore` implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid notification id '{0}'")]
    InvalidId(String),

    #[error("notification {0} not found")]
    NotFound(u64),

    #[error("notification {0} is already dismissed")]
    AlreadyDismissed(u64),

    #[error("validation error: {0}")]
    Validation(ValidationError),

    #[error("timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{point} hook aborted the operation: {reason}")]
    HookAborted { point: String, reason: String },

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidId(raw) => StorageError::InvalidId(raw),
            other => StorageError::Validation(other),
        }
    }
}

/// Flat classification of a `StorageError`, independent of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidId,
    NotFound,
    AlreadyDismissed,
    Validation,
    LockTimeout,
    Io,
    HookAborted,
    Migration,
    ConsistencyViolation,
    Configuration,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InvalidId(_) => ErrorKind::InvalidId,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::AlreadyDismissed(_) => ErrorKind::AlreadyDismissed,
            StorageError::Validation(_) => ErrorKind::Validation,
            StorageError::LockTimeout { .. } => ErrorKind::LockTimeout,
            StorageError::Io(_) | StorageError::Sqlite(_) => ErrorKind::Io,
            StorageError::HookAborted { .. } => ErrorKind::HookAborted,
            StorageError::Migration(_) => ErrorKind::Migration,
            StorageError::ConsistencyViolation(_) => ErrorKind::ConsistencyViolation,
            StorageError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// True for failures of the storage medium itself rather than of the
    /// request. The dual writer fails reads over on these.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Io | ErrorKind::LockTimeout | ErrorKind::Migration
        )
    }
}
