// ABOUTME: SQLite-backed notification store with one row per id and real UPDATE/DELETE.
// ABOUTME: Shares validation, hooks and the record codec with the flat-file store so output is identical.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use intray_core::timestamp::utc_now;
use intray_core::validate::{validate_new_notification, validate_timestamp};
use intray_core::{ListFilter, NewNotification, Notification, NotificationState, StateFilter};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};

use crate::effects::{Effects, HookEnv, HookPoint, new_notification_env, notification_env};
use crate::error::StorageError;
use crate::store::{CleanupOutcome, CleanupRequest, NotificationStore, check_id};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const HIGH_WATER_KEY: &str = "last_notification_id";

const COLUMNS: &str =
    "id, timestamp, state, session, window, pane, message, pane_created, level, read_timestamp";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY,
        timestamp TEXT NOT NULL,
        state TEXT NOT NULL CHECK (state IN ('active', 'dismissed')),
        session TEXT NOT NULL DEFAULT '',
        window TEXT NOT NULL DEFAULT '',
        pane TEXT NOT NULL DEFAULT '',
        message TEXT NOT NULL,
        pane_created TEXT NOT NULL DEFAULT '',
        level TEXT NOT NULL CHECK (level IN ('info', 'warning', 'error', 'critical')),
        read_timestamp TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notifications_state ON notifications(state);
    CREATE INDEX IF NOT EXISTS idx_notifications_level ON notifications(level);
    CREATE INDEX IF NOT EXISTS idx_notifications_session ON notifications(session);
    CREATE INDEX IF NOT EXISTS idx_notifications_timestamp ON notifications(timestamp);

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );";

fn read_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let state: String = row.get(2)?;
    let level: String = row.get(8)?;
    Ok(Notification {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        state: state
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        session: row.get(3)?,
        window: row.get(4)?,
        pane: row.get(5)?,
        message: row.get(6)?,
        pane_created: row.get(7)?,
        level: level
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
        read_timestamp: row.get(9)?,
    })
}

fn upsert_row(conn: &Connection, n: &Notification, updated_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, timestamp, state, session, window, pane, message, pane_created, level, read_timestamp, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            timestamp = excluded.timestamp,
            state = excluded.state,
            session = excluded.session,
            window = excluded.window,
            pane = excluded.pane,
            message = excluded.message,
            pane_created = excluded.pane_created,
            level = excluded.level,
            read_timestamp = excluded.read_timestamp,
            updated_at = excluded.updated_at",
        params![
            n.id,
            n.timestamp,
            n.state.as_str(),
            n.session,
            n.window,
            n.pane,
            n.message,
            n.pane_created,
            n.level.as_str(),
            n.read_timestamp,
            updated_at,
        ],
    )?;
    Ok(())
}

fn high_water(conn: &Connection) -> rusqlite::Result<u64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![HIGH_WATER_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn max_id(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT COALESCE(MAX(id), 0) FROM notifications", [], |row| {
        row.get(0)
    })
}

/// Raise the stored high-water mark to `id`; never lowers it.
fn bump_high_water(conn: &Connection, id: u64) -> rusqlite::Result<()> {
    if id == 0 {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value
         WHERE CAST(meta.value AS INTEGER) < CAST(excluded.value AS INTEGER)",
        params![HIGH_WATER_KEY, id.to_string()],
    )?;
    Ok(())
}

/// Notification store backed by a single SQLite database file.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    effects: Effects,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open or create the database at `path` and ensure the schema exists.
    pub fn open(path: &Path, busy_timeout: Duration, effects: Effects) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            effects,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied outside a
        // transaction, so a poisoned connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Upsert `rows` and raise the id high-water mark to at least
    /// `high_water`, in one transaction. Either everything lands or nothing.
    pub fn import_with_high_water(
        &self,
        rows: &[Notification],
        high_water: u64,
    ) -> Result<usize, StorageError> {
        for row in rows {
            check_id(row.id)?;
        }
        let top = rows.iter().map(|n| n.id).max().unwrap_or(0).max(high_water);
        let now = utc_now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for row in rows {
            upsert_row(&tx, row, &now)?;
        }
        bump_high_water(&tx, top)?;
        tx.commit()?;
        Ok(rows.len())
    }

    fn find(&self, id: u64) -> Result<Option<Notification>, StorageError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", COLUMNS),
                params![id],
                read_row,
            )
            .optional()?;
        Ok(row)
    }

    fn count_active(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE state = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn publish(&self) {
        self.effects.publish_active_count(|| self.count_active());
    }

    fn set_read_timestamp(&self, id: u64, read_timestamp: &str) -> Result<(), StorageError> {
        check_id(id)?;
        let changed = self.conn().execute(
            "UPDATE notifications SET read_timestamp = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, read_timestamp, utc_now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}

fn where_clause(filter: &ListFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    let mut push = |condition: &str, value: String| {
        values.push(value);
        conditions.push(format!("{} ?{}", condition, values.len()));
    };

    if let StateFilter::Only(state) = filter.state {
        push("state =", state.as_str().to_string());
    }
    if let Some(level) = filter.level {
        push("level =", level.as_str().to_string());
    }
    if let Some(session) = &filter.session {
        push("session =", session.clone());
    }
    if let Some(window) = &filter.window {
        push("window =", window.clone());
    }
    if let Some(pane) = &filter.pane {
        push("pane =", pane.clone());
    }
    if let Some(cutoff) = &filter.older_than {
        push("timestamp <", cutoff.clone());
    }
    if let Some(cutoff) = &filter.newer_than {
        push("timestamp >", cutoff.clone());
    }
    match filter.read {
        intray_core::ReadFilter::Any => {}
        intray_core::ReadFilter::Read => conditions.push("read_timestamp != ''".to_string()),
        intray_core::ReadFilter::Unread => conditions.push("read_timestamp = ''".to_string()),
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

impl NotificationStore for SqliteStore {
    fn add(&self, input: NewNotification) -> Result<u64, StorageError> {
        validate_new_notification(&input)?;
        let now = utc_now();
        let timestamp = if input.timestamp.is_empty() {
            now.clone()
        } else {
            input.timestamp.clone()
        };
        self.effects
            .run_pre(HookPoint::PreAdd, &new_notification_env(&input, &timestamp))?;

        let stored = {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = max_id(&tx)?.max(high_water(&tx)?) + 1;
            let n = input.into_notification(id, &now)?;
            upsert_row(&tx, &n, &now)?;
            bump_high_water(&tx, id)?;
            tx.commit()?;
            n
        };
        tracing::debug!(id = stored.id, level = %stored.level, "added notification");

        self.effects
            .run_post(HookPoint::PostAdd, &notification_env(&stored));
        self.publish();
        Ok(stored.id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Notification>, StorageError> {
        let (clause, values) = where_clause(filter);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications{} ORDER BY id ASC",
            COLUMNS, clause
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), read_row)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    fn get(&self, id: u64) -> Result<Notification, StorageError> {
        check_id(id)?;
        self.find(id)?.ok_or(StorageError::NotFound(id))
    }

    fn dismiss(&self, id: u64) -> Result<(), StorageError> {
        let current = self.get(id)?;
        if !current.is_active() {
            return Err(StorageError::AlreadyDismissed(id));
        }
        self.effects
            .run_pre(HookPoint::PreDismiss, &notification_env(&current))?;

        let changed = self.conn().execute(
            "UPDATE notifications SET state = 'dismissed', updated_at = ?2
             WHERE id = ?1 AND state = 'active'",
            params![id, utc_now()],
        )?;
        if changed == 0 {
            // Lost a race with another writer
            return match self.find(id)? {
                Some(_) => Err(StorageError::AlreadyDismissed(id)),
                None => Err(StorageError::NotFound(id)),
            };
        }
        tracing::debug!(id, "dismissed notification");

        let dismissed = Notification {
            state: NotificationState::Dismissed,
            ..current
        };
        self.effects
            .run_post(HookPoint::PostDismiss, &notification_env(&dismissed));
        self.publish();
        Ok(())
    }

    fn dismiss_all(&self) -> Result<usize, StorageError> {
        self.dismiss_matching("", "", "")
    }

    fn dismiss_matching(
        &self,
        session: &str,
        window: &str,
        pane: &str,
    ) -> Result<usize, StorageError> {
        let mut env = HookEnv::new();
        env.insert("SESSION", session.to_string());
        env.insert("WINDOW", window.to_string());
        env.insert("PANE", pane.to_string());
        self.effects.run_pre(HookPoint::PreClear, &env)?;

        let count = {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let count = tx.execute(
                "UPDATE notifications SET state = 'dismissed', updated_at = ?4
                 WHERE state = 'active'
                   AND (?1 = '' OR session = ?1)
                   AND (?2 = '' OR window = ?2)
                   AND (?3 = '' OR pane = ?3)",
                params![session, window, pane, utc_now()],
            )?;
            tx.commit()?;
            count
        };
        tracing::debug!(count, session, window, pane, "dismissed notifications");

        env.insert("DISMISSED_COUNT", count.to_string());
        self.effects.run_post(HookPoint::PostClear, &env);
        self.publish();
        Ok(count)
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<(), StorageError> {
        validate_timestamp("read_timestamp", read_timestamp)?;
        self.set_read_timestamp(id, read_timestamp)
    }

    fn mark_unread(&self, id: u64) -> Result<(), StorageError> {
        self.set_read_timestamp(id, "")
    }

    fn cleanup(&self, request: &CleanupRequest) -> Result<CleanupOutcome, StorageError> {
        let cutoff = request.resolve_cutoff()?;
        let mut env = HookEnv::new();
        env.insert("CLEANUP_DAYS", request.days_threshold.to_string());
        env.insert("CUTOFF_TIMESTAMP", cutoff.clone().unwrap_or_default());
        env.insert("DRY_RUN", request.dry_run.to_string());
        self.effects.run_pre(HookPoint::PreCleanup, &env)?;

        let outcome = {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let matched: i64 = tx.query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE state = 'dismissed' AND (?1 IS NULL OR timestamp < ?1)",
                params![cutoff],
                |row| row.get(0),
            )?;
            let mut deleted = 0;
            if !request.dry_run {
                let top = max_id(&tx)?;
                bump_high_water(&tx, top)?;
                deleted = tx.execute(
                    "DELETE FROM notifications
                     WHERE state = 'dismissed' AND (?1 IS NULL OR timestamp < ?1)",
                    params![cutoff],
                )?;
            }
            tx.commit()?;
            CleanupOutcome {
                cutoff: cutoff.clone(),
                matched: usize::try_from(matched).unwrap_or(0),
                deleted,
            }
        };
        tracing::debug!(
            matched = outcome.matched,
            deleted = outcome.deleted,
            dry_run = request.dry_run,
            "cleanup finished"
        );

        env.insert("DELETED_COUNT", outcome.deleted.to_string());
        self.effects.run_post(HookPoint::PostCleanup, &env);
        if !request.dry_run {
            self.publish();
        }
        Ok(outcome)
    }

    fn active_count(&self) -> Result<usize, StorageError> {
        self.count_active()
    }

    fn is_empty(&self) -> Result<bool, StorageError> {
        let any: Option<i64> = self
            .conn()
            .query_row("SELECT 1 FROM notifications LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(any.is_none())
    }

    fn high_water(&self) -> Result<u64, StorageError> {
        let conn = self.conn();
        Ok(max_id(&conn)?.max(high_water(&conn)?))
    }

    fn reserve_ids(&self, id: u64) -> Result<(), StorageError> {
        bump_high_water(&self.conn(), id)?;
        Ok(())
    }

    fn import(&self, rows: &[Notification]) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.import_with_high_water(rows, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lock::LockOptions;
    use crate::tsv::TsvStore;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(
            &dir.path().join("notifications.db"),
            DEFAULT_BUSY_TIMEOUT,
            Effects::none(),
        )
        .unwrap()
    }

    #[test]
    fn open_creates_schema_and_is_reopenable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("notifications.db");
        {
            let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT, Effects::none()).unwrap();
            assert!(store.is_empty().unwrap());
            store.add(NewNotification::new("persist", "info")).unwrap();
        }
        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT, Effects::none()).unwrap();
        assert!(!store.is_empty().unwrap());
        assert_eq!(store.get(1).unwrap().message, "persist");
    }

    #[test]
    fn get_line_matches_codec_output() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store
            .add(NewNotification::new("hello\tworld", "warning").with_timestamp("2026-01-01T00:00:00Z"))
            .unwrap();

        assert_eq!(
            store.get_line(&id.to_string()).unwrap(),
            "1\t2026-01-01T00:00:00Z\tactive\t\t\t\thello\\tworld\t\twarning\t"
        );
    }

    #[test]
    fn dismiss_errors_match_flat_file() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.add(NewNotification::new("x", "info")).unwrap();

        store.dismiss(id).unwrap();
        assert_eq!(store.dismiss(id).unwrap_err().kind(), ErrorKind::AlreadyDismissed);
        assert_eq!(store.dismiss(77).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.dismiss(0).unwrap_err().kind(), ErrorKind::InvalidId);
        assert_eq!(store.mark_unread(77).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn ids_survive_cleanup_of_highest_row() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.add(NewNotification::new("a", "info")).unwrap();
        let top = store.add(NewNotification::new("b", "info")).unwrap();
        store.dismiss(top).unwrap();
        assert_eq!(store.cleanup_old_notifications(0, false).unwrap().deleted, 1);

        assert_eq!(store.add(NewNotification::new("c", "info")).unwrap(), top + 1);
    }

    #[test]
    fn reserved_ids_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.reserve_ids(3).unwrap();
        assert_eq!(store.high_water().unwrap(), 3);
        assert!(store.is_empty().unwrap());

        let row = NewNotification::new("kept", "info")
            .into_notification(1, "2026-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(store.import_with_high_water(&[row], 7).unwrap(), 1);
        assert_eq!(store.high_water().unwrap(), 7);
        assert_eq!(store.add(NewNotification::new("next", "info")).unwrap(), 8);
    }

    #[test]
    fn concurrent_adds_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(&dir));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..10)
                        .map(|i| {
                            store
                                .add(NewNotification::new(format!("{}-{}", t, i), "info"))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn filters_translate_to_sql() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .add(
                NewNotification::new("old", "error")
                    .with_timestamp("2026-01-01T00:00:00Z")
                    .with_location("work", "@1", "%1"),
            )
            .unwrap();
        let newer = store
            .add(
                NewNotification::new("new", "info")
                    .with_timestamp("2026-01-05T00:00:00Z")
                    .with_location("home", "@1", "%2"),
            )
            .unwrap();
        store.mark_read_at(newer, "2026-01-06T00:00:00Z").unwrap();

        let ids = |f: ListFilter| -> Vec<u64> {
            store.list(&f).unwrap().iter().map(|n| n.id).collect()
        };
        assert_eq!(ids(ListFilter::all()), vec![1, 2]);
        assert_eq!(
            ids(ListFilter::parse("", "error", "", "", "", "", "", "").unwrap()),
            vec![1]
        );
        assert_eq!(
            ids(ListFilter::parse("", "", "", "@1", "%2", "", "", "").unwrap()),
            vec![2]
        );
        assert_eq!(
            ids(ListFilter::parse("", "", "", "", "", "2026-01-05T00:00:00Z", "", "").unwrap()),
            vec![1]
        );
        assert_eq!(
            ids(ListFilter::parse("", "", "", "", "", "", "2026-01-01T00:00:00Z", "").unwrap()),
            vec![2]
        );
        assert_eq!(
            ids(ListFilter::parse("active", "", "", "", "", "", "", "unread").unwrap()),
            vec![1]
        );
    }

    #[test]
    fn cleanup_boundary_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let edge = store
            .add(NewNotification::new("edge", "info").with_timestamp("2026-01-10T00:00:00Z"))
            .unwrap();
        let older = store
            .add(NewNotification::new("older", "info").with_timestamp("2026-01-09T23:59:59Z"))
            .unwrap();
        store.dismiss(edge).unwrap();
        store.dismiss(older).unwrap();

        let request = CleanupRequest {
            cutoff: Some("2026-01-10T00:00:00Z".to_string()),
            dry_run: true,
            ..CleanupRequest::default()
        };
        let dry = store.cleanup(&request).unwrap();
        assert_eq!((dry.matched, dry.deleted), (1, 0));

        let live = store
            .cleanup(&CleanupRequest {
                dry_run: false,
                ..request
            })
            .unwrap();
        assert_eq!(live.deleted, 1);
        assert!(store.get(edge).is_ok());
        assert_eq!(store.get(older).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn import_is_atomic_upsert() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let rows: Vec<Notification> = (1..=3)
            .map(|id| {
                NewNotification::new(format!("row {}", id), "critical")
                    .into_notification(id, "2026-01-01T00:00:00Z")
                    .unwrap()
            })
            .collect();

        assert_eq!(store.import(&rows).unwrap(), 3);
        assert_eq!(store.import(&rows[..1]).unwrap(), 1);
        assert_eq!(store.list(&ListFilter::all()).unwrap(), rows);
        assert_eq!(store.add(NewNotification::new("next", "info")).unwrap(), 4);
    }

    #[test]
    fn separators_in_location_are_rejected_by_both_backends() {
        let dir = TempDir::new().unwrap();
        let tsv = TsvStore::open(
            &dir.path().join("notifications.tsv"),
            LockOptions::default(),
            Effects::none(),
        )
        .unwrap();
        let sqlite = open(&dir);
        let stores: [&dyn NotificationStore; 2] = [&tsv, &sqlite];

        for store in stores {
            let err = store
                .add(NewNotification::new("m", "info").with_location("work\tspace", "@1", "%1"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            let err = store
                .add(NewNotification::new("m", "info").with_pane_created("1\n2"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);

            assert!(store.list(&ListFilter::all()).unwrap().is_empty());
            assert_eq!(store.add(NewNotification::new("m", "info")).unwrap(), 1);
        }
        assert_eq!(
            tsv.list_tsv(&ListFilter::all()).unwrap().len(),
            sqlite.list_tsv(&ListFilter::all()).unwrap().len()
        );
    }

    #[test]
    fn backends_agree_on_the_same_operations() {
        let dir = TempDir::new().unwrap();
        let tsv = TsvStore::open(
            &dir.path().join("notifications.tsv"),
            LockOptions::default(),
            Effects::none(),
        )
        .unwrap();
        let sqlite = open(&dir);
        let stores: [&dyn NotificationStore; 2] = [&tsv, &sqlite];

        let messages = [
            "plain",
            "tab\there",
            "multi\nline",
            "back\\slash \\n literal",
            "ünïcødé ✓",
        ];
        for store in stores {
            for (i, message) in messages.iter().enumerate() {
                store
                    .add(
                        NewNotification::new(*message, "info")
                            .with_timestamp(format!("2026-01-0{}T00:00:00Z", i + 1))
                            .with_location("s", "@1", format!("%{}", i))
                            .with_pane_created("101"),
                    )
                    .unwrap();
            }
            store.dismiss(2).unwrap();
            store.mark_read_at(3, "2026-02-01T00:00:00Z").unwrap();
            store.dismiss_matching("", "", "%4").unwrap();
            store
                .cleanup(&CleanupRequest {
                    cutoff: Some("2026-01-03T00:00:00Z".to_string()),
                    ..CleanupRequest::default()
                })
                .unwrap();
        }

        let from_tsv = tsv.list_tsv(&ListFilter::all()).unwrap();
        let from_sqlite = sqlite.list_tsv(&ListFilter::all()).unwrap();
        assert_eq!(from_tsv, from_sqlite);
        assert_eq!(from_tsv.lines().count(), 4);
        assert_eq!(tsv.active_count().unwrap(), sqlite.active_count().unwrap());

        // Same validation failures on both sides
        for store in stores {
            assert_eq!(
                store.add(NewNotification::new("", "info")).unwrap_err().kind(),
                ErrorKind::Validation
            );
            assert_eq!(
                store
                    .add(NewNotification::new("m", "info").with_location("", "", " "))
                    .unwrap_err()
                    .kind(),
                ErrorKind::Validation
            );
            assert_eq!(store.get_line("zero").unwrap_err().kind(), ErrorKind::InvalidId);
        }
    }
}
