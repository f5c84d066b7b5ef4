// ABOUTME: Dual writer that keeps the flat-file and SQLite stores in sync during a backend rollout.
// ABOUTME: Flat file is written first; SQLite failures degrade the writer instead of failing callers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use intray_core::codec::{FIELD_NAMES, encode_fields};
use intray_core::timestamp::utc_now;
use intray_core::{ListFilter, NewNotification, Notification};
use serde::Serialize;

use crate::error::StorageError;
use crate::store::{CleanupOutcome, CleanupRequest, NotificationStore};

pub const DEFAULT_SAMPLE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadBackend {
    Tsv,
    Sqlite,
}

impl ReadBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tsv => "tsv",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for ReadBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Health of the SQLite write path. `Degraded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualWriterOptions {
    pub read_backend: ReadBackend,
    /// Write only the flat file; SQLite is kept for audits.
    pub verify_only: bool,
    pub sample_size: usize,
    /// Run a consistency audit every N writes. Zero disables it.
    pub verify_every_n_writes: u64,
}

impl Default for DualWriterOptions {
    fn default() -> Self {
        Self {
            read_backend: ReadBackend::Sqlite,
            verify_only: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
            verify_every_n_writes: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteMetrics {
    pub write_operations: u64,
    pub tsv_write_failures: u64,
    pub sqlite_write_failures: u64,
    pub total_write_latency: Duration,
    pub max_write_latency: Duration,
}

impl WriteMetrics {
    pub fn average_write_latency(&self) -> Duration {
        if self.write_operations == 0 {
            return Duration::ZERO;
        }
        let ops = u32::try_from(self.write_operations).unwrap_or(u32::MAX);
        self.total_write_latency / ops
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: &'static str,
    pub tsv_value: String,
    pub sqlite_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordDiff {
    pub id: u64,
    pub field_diffs: Vec<FieldDiff>,
}

/// Result of comparing the two backends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConsistencyReport {
    pub tsv_count: usize,
    pub sqlite_count: usize,
    pub tsv_active_count: usize,
    pub sqlite_active_count: usize,
    pub sampled_records: usize,
    pub missing_in_tsv: Vec<u64>,
    pub missing_in_sqlite: Vec<u64>,
    pub record_diffs: Vec<RecordDiff>,
    pub consistent: bool,
}

impl ConsistencyReport {
    /// Turn a divergent report into `ConsistencyViolation`.
    pub fn ensure_consistent(&self) -> Result<(), StorageError> {
        if self.consistent {
            return Ok(());
        }
        Err(StorageError::ConsistencyViolation(format!(
            "tsv has {} rows ({} active), sqlite has {} ({} active); {} missing in sqlite, {} missing in tsv, {} differing records",
            self.tsv_count,
            self.tsv_active_count,
            self.sqlite_count,
            self.sqlite_active_count,
            self.missing_in_sqlite.len(),
            self.missing_in_tsv.len(),
            self.record_diffs.len(),
        )))
    }
}

fn diff_records(tsv: &Notification, sqlite: &Notification) -> Vec<FieldDiff> {
    let left = encode_fields(tsv);
    let right = encode_fields(sqlite);
    FIELD_NAMES
        .iter()
        .zip(left.into_iter().zip(right))
        .filter(|(_, (l, r))| l != r)
        .map(|(field, (tsv_value, sqlite_value))| FieldDiff {
            field: *field,
            tsv_value,
            sqlite_value,
        })
        .collect()
}

/// Compare two snapshots. The sample is the first `sample_size` ids present
/// on both sides, in ascending order.
pub fn compare(tsv_rows: Vec<Notification>, sqlite_rows: Vec<Notification>, sample_size: usize) -> ConsistencyReport {
    let tsv: BTreeMap<u64, Notification> = tsv_rows.into_iter().map(|n| (n.id, n)).collect();
    let sqlite: BTreeMap<u64, Notification> = sqlite_rows.into_iter().map(|n| (n.id, n)).collect();

    let missing_in_sqlite: Vec<u64> = tsv.keys().filter(|id| !sqlite.contains_key(id)).copied().collect();
    let missing_in_tsv: Vec<u64> = sqlite.keys().filter(|id| !tsv.contains_key(id)).copied().collect();

    let sample: Vec<u64> = tsv
        .keys()
        .filter(|id| sqlite.contains_key(id))
        .take(sample_size)
        .copied()
        .collect();
    let record_diffs: Vec<RecordDiff> = sample
        .iter()
        .filter_map(|id| {
            let field_diffs = diff_records(&tsv[id], &sqlite[id]);
            (!field_diffs.is_empty()).then_some(RecordDiff { id: *id, field_diffs })
        })
        .collect();

    let tsv_active_count = tsv.values().filter(|n| n.is_active()).count();
    let sqlite_active_count = sqlite.values().filter(|n| n.is_active()).count();
    let consistent = tsv.len() == sqlite.len()
        && tsv_active_count == sqlite_active_count
        && missing_in_sqlite.is_empty()
        && missing_in_tsv.is_empty()
        && record_diffs.is_empty();

    ConsistencyReport {
        tsv_count: tsv.len(),
        sqlite_count: sqlite.len(),
        tsv_active_count,
        sqlite_active_count,
        sampled_records: sample.len(),
        missing_in_tsv,
        missing_in_sqlite,
        record_diffs,
        consistent,
    }
}

#[derive(Debug)]
struct RouteState {
    read_backend: ReadBackend,
    health: Health,
}

/// Writes both backends and reads from one of them.
///
/// Every write goes to the flat file first. If that fails the error is
/// returned as is. Otherwise the same write is replayed against SQLite with
/// any wall-clock values pinned, so both stores hold identical rows. A
/// SQLite failure moves the writer to `Degraded`: from then on writes and
/// reads use the flat file only.
pub struct DualWriter {
    tsv: Arc<dyn NotificationStore>,
    sqlite: Arc<dyn NotificationStore>,
    options: DualWriterOptions,
    route: Mutex<RouteState>,
    metrics: Mutex<WriteMetrics>,
}

impl fmt::Debug for DualWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualWriter")
            .field("options", &self.options)
            .field("health", &self.health())
            .finish()
    }
}

impl DualWriter {
    /// Build a writer over the two stores. If SQLite is empty while the
    /// flat file has rows, the flat file's rows are imported first; a failed
    /// import leaves the writer degraded.
    pub fn new(
        tsv: Arc<dyn NotificationStore>,
        sqlite: Arc<dyn NotificationStore>,
        options: DualWriterOptions,
    ) -> Self {
        let writer = Self {
            tsv,
            sqlite,
            route: Mutex::new(RouteState {
                read_backend: options.read_backend,
                health: Health::Healthy,
            }),
            options,
            metrics: Mutex::new(WriteMetrics::default()),
        };
        if let Err(e) = writer.migrate_if_needed() {
            writer.degrade(&e);
        }
        writer
    }

    fn migrate_if_needed(&self) -> Result<(), StorageError> {
        if !self.sqlite.is_empty()? {
            return Ok(());
        }
        let rows = self.tsv.list(&ListFilter::all())?;
        if !rows.is_empty() {
            let imported = self.sqlite.import(&rows)?;
            tracing::info!(imported, "imported flat file rows into empty sqlite store");
        }
        // Ids the flat file already handed out, including deleted ones
        let high_water = self.tsv.high_water()?;
        if high_water > 0 {
            self.sqlite.reserve_ids(high_water)?;
        }
        Ok(())
    }

    fn route(&self) -> MutexGuard<'_, RouteState> {
        self.route.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn metrics_mut(&self) -> MutexGuard<'_, WriteMetrics> {
        self.metrics.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn health(&self) -> Health {
        self.route().health
    }

    /// The backend reads are currently served from.
    pub fn read_backend(&self) -> ReadBackend {
        self.route().read_backend
    }

    pub fn metrics(&self) -> WriteMetrics {
        self.metrics_mut().clone()
    }

    pub fn options(&self) -> &DualWriterOptions {
        &self.options
    }

    fn degrade(&self, err: &StorageError) {
        let mut route = self.route();
        if route.health == Health::Healthy {
            tracing::warn!(error = %err, "sqlite write failed, continuing with flat file only");
        }
        route.health = Health::Degraded;
        route.read_backend = ReadBackend::Tsv;
    }

    fn read<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: Fn(&dyn NotificationStore) -> Result<T, StorageError>,
    {
        let backend = self.read_backend();
        let (primary, secondary) = match backend {
            ReadBackend::Sqlite => (self.sqlite.as_ref(), self.tsv.as_ref()),
            ReadBackend::Tsv => (self.tsv.as_ref(), self.sqlite.as_ref()),
        };
        match op(primary) {
            Err(e) if e.is_infrastructure() => {
                tracing::warn!(backend = %backend, error = %e, "read failed, falling back");
                op(secondary)
            }
            other => other,
        }
    }

    fn write<T, W, M>(&self, write_tsv: W, mirror: M) -> Result<T, StorageError>
    where
        W: FnOnce(&dyn NotificationStore) -> Result<T, StorageError>,
        M: FnOnce(&dyn NotificationStore, &T) -> Result<(), StorageError>,
    {
        let started = Instant::now();
        let value = match write_tsv(self.tsv.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                self.metrics_mut().tsv_write_failures += 1;
                return Err(e);
            }
        };

        if !self.options.verify_only
            && self.health() == Health::Healthy
            && let Err(e) = mirror(self.sqlite.as_ref(), &value)
        {
            self.metrics_mut().sqlite_write_failures += 1;
            self.degrade(&e);
        }

        let operations = {
            let mut metrics = self.metrics_mut();
            let elapsed = started.elapsed();
            metrics.write_operations += 1;
            metrics.total_write_latency += elapsed;
            metrics.max_write_latency = metrics.max_write_latency.max(elapsed);
            metrics.write_operations
        };
        let every = self.options.verify_every_n_writes;
        if every > 0 && operations % every == 0 {
            self.audit();
        }
        Ok(value)
    }

    fn audit(&self) {
        match self.verify_consistency(self.options.sample_size) {
            Ok(report) if report.consistent => {
                tracing::debug!(rows = report.tsv_count, "periodic consistency audit passed");
            }
            Ok(report) => {
                tracing::warn!(
                    missing_in_sqlite = report.missing_in_sqlite.len(),
                    missing_in_tsv = report.missing_in_tsv.len(),
                    differing = report.record_diffs.len(),
                    "periodic consistency audit found divergence"
                );
            }
            Err(e) => tracing::warn!(error = %e, "periodic consistency audit failed"),
        }
    }

    /// Compare both backends in full, with field-level diffs for up to
    /// `sample_size` shared ids.
    pub fn verify_consistency(&self, sample_size: usize) -> Result<ConsistencyReport, StorageError> {
        let tsv_rows = self.tsv.list(&ListFilter::all())?;
        let sqlite_rows = self.sqlite.list(&ListFilter::all())?;
        Ok(compare(tsv_rows, sqlite_rows, sample_size))
    }
}

impl NotificationStore for DualWriter {
    fn add(&self, input: NewNotification) -> Result<u64, StorageError> {
        let now = utc_now();
        let input = if input.timestamp.is_empty() {
            input.with_timestamp(now.clone())
        } else {
            input
        };
        let mirrored = input.clone();
        self.write(
            |tsv| tsv.add(input),
            |sqlite, id| {
                let row = mirrored.into_notification(*id, &now)?;
                sqlite.import(&[row]).map(|_| ())
            },
        )
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Notification>, StorageError> {
        self.read(|store| store.list(filter))
    }

    fn get(&self, id: u64) -> Result<Notification, StorageError> {
        self.read(|store| store.get(id))
    }

    fn dismiss(&self, id: u64) -> Result<(), StorageError> {
        self.write(|tsv| tsv.dismiss(id), |sqlite, _| sqlite.dismiss(id))
    }

    fn dismiss_all(&self) -> Result<usize, StorageError> {
        self.write(
            |tsv| tsv.dismiss_all(),
            |sqlite, _| sqlite.dismiss_all().map(|_| ()),
        )
    }

    fn dismiss_matching(
        &self,
        session: &str,
        window: &str,
        pane: &str,
    ) -> Result<usize, StorageError> {
        self.write(
            |tsv| tsv.dismiss_matching(session, window, pane),
            |sqlite, _| sqlite.dismiss_matching(session, window, pane).map(|_| ()),
        )
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<(), StorageError> {
        self.write(
            |tsv| tsv.mark_read_at(id, read_timestamp),
            |sqlite, _| sqlite.mark_read_at(id, read_timestamp),
        )
    }

    fn mark_unread(&self, id: u64) -> Result<(), StorageError> {
        self.write(|tsv| tsv.mark_unread(id), |sqlite, _| sqlite.mark_unread(id))
    }

    fn cleanup(&self, request: &CleanupRequest) -> Result<CleanupOutcome, StorageError> {
        let pinned = request.resolved()?;
        self.write(
            |tsv| tsv.cleanup(&pinned),
            |sqlite, _| sqlite.cleanup(&pinned).map(|_| ()),
        )
    }

    fn active_count(&self) -> Result<usize, StorageError> {
        self.read(|store| store.active_count())
    }

    fn is_empty(&self) -> Result<bool, StorageError> {
        self.read(|store| store.is_empty())
    }

    /// The flat file assigns every id, so its mark is authoritative.
    fn high_water(&self) -> Result<u64, StorageError> {
        self.tsv.high_water()
    }

    fn reserve_ids(&self, id: u64) -> Result<(), StorageError> {
        self.write(|tsv| tsv.reserve_ids(id), |sqlite, _| sqlite.reserve_ids(id))
    }

    fn import(&self, rows: &[Notification]) -> Result<usize, StorageError> {
        self.write(|tsv| tsv.import(rows), |sqlite, _| sqlite.import(rows).map(|_| ()))
    }
}
