// ABOUTME: Append-only tab-separated notification log guarded by a directory lock.
// ABOUTME: Current state per id is the last line bearing it; cleanup compacts the file atomically.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use intray_core::codec::{decode_line, encode_line, peek_id};
use intray_core::timestamp::utc_now;
use intray_core::validate::{validate_new_notification, validate_timestamp};
use intray_core::{DecodeError, ListFilter, NewNotification, Notification};

use crate::effects::{Effects, HookEnv, HookPoint, new_notification_env, notification_env};
use crate::error::StorageError;
use crate::lock::{DirLock, LockOptions};
use crate::store::{CleanupOutcome, CleanupRequest, NotificationStore, check_id};

/// Result of scanning a log file: the latest row per id plus bookkeeping
/// about the physical lines.
#[derive(Debug, Default)]
pub(crate) struct LogScan {
    pub rows: BTreeMap<u64, Notification>,
    /// Highest id seen on any line, including lines that failed to decode.
    pub max_id: u64,
    /// Non-blank lines scanned.
    pub total: usize,
    /// Valid lines superseded by a later line with the same id.
    pub duplicates: usize,
    /// 1-based line number and reason for each malformed line.
    pub skipped: Vec<(usize, DecodeError)>,
}

pub(crate) fn scan_log(content: &str) -> LogScan {
    let mut scan = LogScan::default();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        scan.total += 1;
        if let Some(id) = peek_id(line) {
            scan.max_id = scan.max_id.max(id);
        }
        match decode_line(line) {
            Ok(n) => {
                if scan.rows.insert(n.id, n).is_some() {
                    scan.duplicates += 1;
                }
            }
            Err(e) => scan.skipped.push((index + 1, e)),
        }
    }
    scan
}

/// Id high-water sidecar kept next to the log at `log_path`.
pub(crate) fn seq_path(log_path: &Path) -> PathBuf {
    log_path.with_extension("seq")
}

/// Read a high-water sidecar. Missing or unreadable means zero.
pub(crate) fn read_seq_file(path: &Path) -> Result<u64, StorageError> {
    match fs::read_to_string(path) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(id) => Ok(id),
            Err(_) => {
                tracing::warn!(file = %path.display(), "ignoring unreadable id high-water mark");
                Ok(0)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with `contents` via temp file, fsync and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents.as_bytes())?;
    tmp_file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    // Best-effort: the rename already succeeded, this only makes it durable.
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Flat-file notification store.
///
/// Every mutation appends one line per affected notification; nothing is
/// edited in place except by cleanup, which rewrites the whole file. Reads
/// collapse the file to the last line per id, so the cost of every read is
/// linear in the file length.
#[derive(Debug)]
pub struct TsvStore {
    path: PathBuf,
    lock_path: PathBuf,
    seq_path: PathBuf,
    lock_options: LockOptions,
    effects: Effects,
}

impl TsvStore {
    /// Open (or create) the log at `path`. The lock directory and id
    /// sidecar live next to it as `<stem>.lock` and `<stem>.seq`.
    pub fn open(path: &Path, lock_options: LockOptions, effects: Effects) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            lock_path: path.with_extension("lock"),
            seq_path: seq_path(path),
            lock_options,
            effects,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<DirLock, StorageError> {
        DirLock::acquire(&self.lock_path, self.lock_options)
    }

    fn read_content(&self) -> Result<String, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Scan the log. Caller must hold the lock.
    fn scan(&self) -> Result<LogScan, StorageError> {
        let scan = scan_log(&self.read_content()?);
        for (line, reason) in &scan.skipped {
            tracing::debug!(file = %self.path.display(), line, %reason, "skipping malformed line");
        }
        Ok(scan)
    }

    fn locked_scan(&self) -> Result<LogScan, StorageError> {
        let _guard = self.lock()?;
        self.scan()
    }

    /// Append rows in a single write. Caller must hold the lock.
    fn append(&self, rows: &[Notification]) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&encode_line(row));
            buf.push('\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_seq(&self) -> Result<u64, StorageError> {
        read_seq_file(&self.seq_path)
    }

    /// Raise the persisted high-water mark. Caller must hold the lock.
    fn bump_seq(&self, id: u64) -> Result<(), StorageError> {
        if id > self.read_seq()? {
            write_atomic(&self.seq_path, &format!("{}\n", id))?;
        }
        Ok(())
    }

    fn current(&self, id: u64) -> Result<Notification, StorageError> {
        self.locked_scan()?
            .rows
            .remove(&id)
            .ok_or(StorageError::NotFound(id))
    }

    fn count_active(&self) -> Result<usize, StorageError> {
        Ok(self
            .locked_scan()?
            .rows
            .values()
            .filter(|n| n.is_active())
            .count())
    }

    fn publish(&self) {
        self.effects.publish_active_count(|| self.count_active());
    }

    /// Dismiss every active row selected by `select` in one critical section.
    fn dismiss_where<F>(&self, select: F) -> Result<usize, StorageError>
    where
        F: Fn(&Notification) -> bool,
    {
        let _guard = self.lock()?;
        let scan = self.scan()?;
        let dismissed: Vec<Notification> = scan
            .rows
            .values()
            .filter(|n| n.is_active() && select(n))
            .map(Notification::dismissed)
            .collect();
        self.append(&dismissed)?;
        Ok(dismissed.len())
    }

    fn set_read_timestamp(&self, id: u64, read_timestamp: &str) -> Result<(), StorageError> {
        check_id(id)?;
        let _guard = self.lock()?;
        let scan = self.scan()?;
        let row = scan.rows.get(&id).ok_or(StorageError::NotFound(id))?;
        self.append(&[row.with_read_timestamp(read_timestamp)])
    }
}

fn clear_env(session: &str, window: &str, pane: &str) -> HookEnv {
    let mut env = HookEnv::new();
    env.insert("SESSION", session.to_string());
    env.insert("WINDOW", window.to_string());
    env.insert("PANE", pane.to_string());
    env
}

fn cleanup_env(request: &CleanupRequest, cutoff: Option<&str>) -> HookEnv {
    let mut env = HookEnv::new();
    env.insert("CLEANUP_DAYS", request.days_threshold.to_string());
    env.insert("CUTOFF_TIMESTAMP", cutoff.unwrap_or_default().to_string());
    env.insert("DRY_RUN", request.dry_run.to_string());
    env
}

impl NotificationStore for TsvStore {
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
            let _guard = self.lock()?;
            let scan = self.scan()?;
            let id = scan.max_id.max(self.read_seq()?) + 1;
            let n = input.into_notification(id, &now)?;
            self.append(std::slice::from_ref(&n))?;
            self.bump_seq(id)?;
            n
        };
        tracing::debug!(id = stored.id, level = %stored.level, "added notification");

        self.effects
            .run_post(HookPoint::PostAdd, &notification_env(&stored));
        self.publish();
        Ok(stored.id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Notification>, StorageError> {
        Ok(self
            .locked_scan()?
            .rows
            .into_values()
            .filter(|n| filter.matches(n))
            .collect())
    }

    fn get(&self, id: u64) -> Result<Notification, StorageError> {
        check_id(id)?;
        self.current(id)
    }

    fn dismiss(&self, id: u64) -> Result<(), StorageError> {
        check_id(id)?;
        let current = self.current(id)?;
        if !current.is_active() {
            return Err(StorageError::AlreadyDismissed(id));
        }
        self.effects
            .run_pre(HookPoint::PreDismiss, &notification_env(&current))?;

        let dismissed = {
            let _guard = self.lock()?;
            let scan = self.scan()?;
            let row = scan.rows.get(&id).ok_or(StorageError::NotFound(id))?;
            if !row.is_active() {
                return Err(StorageError::AlreadyDismissed(id));
            }
            let dismissed = row.dismissed();
            self.append(std::slice::from_ref(&dismissed))?;
            dismissed
        };
        tracing::debug!(id, "dismissed notification");

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
        let mut env = clear_env(session, window, pane);
        self.effects.run_pre(HookPoint::PreClear, &env)?;

        let count = self.dismiss_where(|n| n.is_at(session, window, pane))?;
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
        let mut env = cleanup_env(request, cutoff.as_deref());
        self.effects.run_pre(HookPoint::PreCleanup, &env)?;

        let outcome = {
            let _guard = self.lock()?;
            let scan = self.scan()?;
            let removable: BTreeSet<u64> = scan
                .rows
                .values()
                .filter(|n| CleanupRequest::removes(cutoff.as_deref(), n))
                .map(|n| n.id)
                .collect();

            let mut deleted = 0;
            if !request.dry_run {
                // Preserve the high-water mark before the rows carrying it go away.
                self.bump_seq(scan.max_id)?;
                let mut contents = String::new();
                for row in scan.rows.values().filter(|n| !removable.contains(&n.id)) {
                    contents.push_str(&encode_line(row));
                    contents.push('\n');
                }
                write_atomic(&self.path, &contents)?;
                deleted = removable.len();
            }
            CleanupOutcome {
                cutoff: cutoff.clone(),
                matched: removable.len(),
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
        Ok(self.locked_scan()?.rows.is_empty())
    }

    fn high_water(&self) -> Result<u64, StorageError> {
        let _guard = self.lock()?;
        Ok(self.scan()?.max_id.max(self.read_seq()?))
    }

    fn reserve_ids(&self, id: u64) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        self.bump_seq(id)
    }

    fn import(&self, rows: &[Notification]) -> Result<usize, StorageError> {
        let Some(max_id) = rows.iter().map(|n| n.id).max() else {
            return Ok(0);
        };
        for row in rows {
            check_id(row.id)?;
        }
        let _guard = self.lock()?;
        self.append(rows)?;
        self.bump_seq(max_id)?;
        Ok(rows.len())
    }
}
