// ABOUTME: Persistence layer for intray: flat-file and SQLite notification stores.
// ABOUTME: Provides the storage trait, migration between backends, the dual writer and the backend factory.

pub mod config;
pub mod dual;
pub mod effects;
pub mod error;
pub mod factory;
pub mod lock;
pub mod migration;
pub mod sqlite;
pub mod store;
pub mod tsv;

pub use config::{ConfigError, ConfigSource, EnvConfig, MapConfig, StorageConfig};
pub use dual::{ConsistencyReport, DualWriter, DualWriterOptions, Health, ReadBackend, WriteMetrics};
pub use effects::{Effects, HookEnv, HookFailureMode, HookPoint, HookRunner, StatusPublisher};
pub use error::{ErrorKind, StorageError};
pub use factory::{Backend, open_backend, open_dual_writer};
pub use lock::{DirLock, LockOptions};
pub use migration::{
    MigrationError, MigrationOptions, MigrationStats, migrate_tsv_to_sqlite, rollback_migration,
};
pub use sqlite::SqliteStore;
pub use store::{CleanupOutcome, CleanupRequest, NotificationStore};
pub use tsv::TsvStore;
